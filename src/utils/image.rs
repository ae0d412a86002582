use anyhow::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opencv::core::{add_weighted, flip, mean, Mat, MatTraitConst, Point, Rect, Size, Vector, BORDER_DEFAULT};
use opencv::imgcodecs::{imdecode, imencode, IMREAD_COLOR};
use opencv::imgproc::{cvt_color, filter_2d, resize, COLOR_BGR2RGB, COLOR_RGB2BGR, COLOR_RGB2GRAY, INTER_LINEAR};

/// convert_image_to_mat decodes an encoded image (PNG, JPEG, ...) into an RGB matrix.
///
/// # Arguments
/// * `im_bytes` - encoded image bytes
///
/// # Returns
/// * `Result<Mat, Error>`
pub fn convert_image_to_mat(im_bytes: &[u8]) -> Result<Mat, Error> {
    if im_bytes.is_empty() {
        return Err(Error::msg("image payload is empty"))
    }

    let buffer = Vector::<u8>::from_slice(im_bytes);
    let img_as_arr_bgr = imdecode(&buffer, IMREAD_COLOR)?;

    // imdecode signals unsupported or corrupt data with an empty matrix
    if img_as_arr_bgr.rows() == 0 || img_as_arr_bgr.cols() == 0 {
        return Err(Error::msg("image data could not be decoded"))
    }

    let mut img_as_arr_rgb = Mat::default();
    cvt_color(&img_as_arr_bgr, &mut img_as_arr_rgb, COLOR_BGR2RGB, 0)?;

    Ok(img_as_arr_rgb)
}

pub fn resize_image(img: &Mat, size: (i32, i32)) -> Result<Mat, Error> {
    let mut img_resized = Mat::default();
    resize(
        img,
        &mut img_resized,
        Size::new(size.0, size.1),
        0.0,
        0.0,
        INTER_LINEAR,
    )?;
    Ok(img_resized)
}

/// encode_png encodes an RGB matrix as PNG.
pub fn encode_png(img: &Mat) -> Result<Vec<u8>, Error> {
    let mut img_bgr = Mat::default();
    cvt_color(img, &mut img_bgr, COLOR_RGB2BGR, 0)?;

    let mut buffer = Vector::<u8>::new();
    if !imencode(".png", &img_bgr, &mut buffer, &Vector::<i32>::new())? {
        return Err(Error::msg("image could not be encoded as png"))
    }
    Ok(buffer.to_vec())
}

pub fn encode_base64_png(img: &Mat) -> Result<String, Error> {
    let png = encode_png(img)?;
    Ok(STANDARD.encode(png))
}

/// enhance_contrast blends the image with its mean grey level.
///
/// A factor of 1.0 returns the original image, larger factors increase the contrast.
pub fn enhance_contrast(img: &Mat, factor: f64) -> Result<Mat, Error> {
    let mut gray = Mat::default();
    cvt_color(img, &mut gray, COLOR_RGB2GRAY, 0)?;
    let grey_level = (mean(&gray, &Mat::default())?[0] + 0.5).floor();

    let mut enhanced = Mat::default();
    img.convert_to(&mut enhanced, -1, factor, (1.0 - factor) * grey_level)?;
    Ok(enhanced)
}

/// enhance_sharpness blends the image away from a smoothed copy of itself.
pub fn enhance_sharpness(img: &Mat, factor: f64) -> Result<Mat, Error> {
    let w = 1.0f32 / 13.0;
    let kernel = Mat::from_slice_2d(&[
        [w, w, w],
        [w, 5.0 * w, w],
        [w, w, w],
    ])?;

    let mut smoothed = Mat::default();
    filter_2d(img, &mut smoothed, -1, &kernel, Point::new(-1, -1), 0.0, BORDER_DEFAULT)?;

    let mut enhanced = Mat::default();
    add_weighted(img, factor, &smoothed, 1.0 - factor, 0.0, &mut enhanced, -1)?;
    Ok(enhanced)
}

/// adjust_brightness scales every channel by `factor`, saturating at 255.
pub fn adjust_brightness(img: &Mat, factor: f64) -> Result<Mat, Error> {
    let mut adjusted = Mat::default();
    img.convert_to(&mut adjusted, -1, factor, 0.0)?;
    Ok(adjusted)
}

pub fn flip_horizontal(img: &Mat) -> Result<Mat, Error> {
    let mut flipped = Mat::default();
    flip(img, &mut flipped, 1)?;
    Ok(flipped)
}

pub fn flip_vertical(img: &Mat) -> Result<Mat, Error> {
    let mut flipped = Mat::default();
    flip(img, &mut flipped, 0)?;
    Ok(flipped)
}

/// crop_image copies the region `rect` out of `img`.
pub fn crop_image(img: &Mat, rect: Rect) -> Result<Mat, Error> {
    let roi = Mat::roi(img, rect)?;
    let mut cropped = Mat::default();
    roi.copy_to(&mut cropped)?;
    Ok(cropped)
}
