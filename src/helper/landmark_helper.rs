use log::warn;
use opencv::core::Rect;
use crate::utils::coordinate::{FaceLandmarks, Landmark, PixelCoordinate};

/// Names for the face mesh indices drawn on the overlay.
///
/// "Left" and "Right" are relative to the input image, not from the PoV of the depicted person.
/// The iris centres only exist in the refined (478 point) mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkIdx {
    UpperLipCenter = 0,
    NoseTip = 4,
    LowerLipCenter = 17,
    LeftEyeOuterCorner = 33,
    LeftEyebrowInner = 55,
    LeftEyebrowOuter = 70,
    LeftEyeInnerCorner = 133,
    MouthLeft = 185,
    RightEyeOuterCorner = 263,
    RightEyebrowInner = 285,
    RightEyebrowOuter = 300,
    MouthRight = 306,
    RightEyeInnerCorner = 362,
    LeftIrisCenter = 468,
    RightIrisCenter = 473,
}

impl From<LandmarkIdx> for usize {
    #[inline]
    fn from(idx: LandmarkIdx) -> usize {
        idx as usize
    }
}

/// Landmarks marked on every annotated image.
pub const SELECTED_LANDMARKS: [LandmarkIdx; 15] = [
    LandmarkIdx::LeftEyebrowOuter,
    LandmarkIdx::LeftEyebrowInner,
    LandmarkIdx::RightEyebrowInner,
    LandmarkIdx::RightEyebrowOuter,
    LandmarkIdx::LeftEyeOuterCorner,
    LandmarkIdx::LeftIrisCenter,
    LandmarkIdx::LeftEyeInnerCorner,
    LandmarkIdx::RightEyeInnerCorner,
    LandmarkIdx::RightIrisCenter,
    LandmarkIdx::RightEyeOuterCorner,
    LandmarkIdx::NoseTip,
    LandmarkIdx::MouthLeft,
    LandmarkIdx::UpperLipCenter,
    LandmarkIdx::MouthRight,
    LandmarkIdx::LowerLipCenter,
];

/// Number of points in the refined face mesh.
pub const REFINED_MESH_LANDMARKS: usize = 478;

/// select_landmarks picks the landmarks at `indices` from one face.
///
/// Indices the mesh does not provide are skipped.
///
/// # Arguments
/// * `face` - &FaceLandmarks
/// * `indices` - &[LandmarkIdx]
///
/// # Returns
/// * `Vec<Landmark>`
pub fn select_landmarks(face: &FaceLandmarks, indices: &[LandmarkIdx]) -> Vec<Landmark> {
    let mut selected = Vec::with_capacity(indices.len());
    for &idx in indices {
        match face.get(idx.into()) {
            Some(lm) => selected.push(*lm),
            None => warn!("landmark {:?} ({}) missing from a {} point mesh", idx, idx as usize, face.len()),
        }
    }
    selected
}

/// selected_pixel_coordinates maps the selected landmarks of every face onto pixel positions.
///
/// # Arguments
/// * `faces` - detected faces
/// * `width` - image width in pixels
/// * `height` - image height in pixels
///
/// # Returns
/// * `Vec<PixelCoordinate>`
pub fn selected_pixel_coordinates(faces: &[FaceLandmarks], width: i32, height: i32) -> Vec<PixelCoordinate> {
    faces
        .iter()
        .flat_map(|face| select_landmarks(face, &SELECTED_LANDMARKS))
        .map(|lm| lm.to_pixel(width, height))
        .collect()
}

/// face_region returns the bounding box of all landmarks of a face, grown by `offset`
/// pixels on every side and clipped to the image.
///
/// Returns `None` for an empty face or a box that falls entirely outside the image.
pub fn face_region(face: &FaceLandmarks, width: i32, height: i32, offset: i32) -> Option<Rect> {
    let mut points = face.landmarks.iter().map(|lm| lm.to_pixel(width, height));
    let first = points.next()?;
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
    for PixelCoordinate { x, y } in points {
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }

    let x0 = x_min.saturating_sub(offset).max(0);
    let y0 = y_min.saturating_sub(offset).max(0);
    let x1 = x_max.saturating_add(offset).min(width);
    let y1 = y_max.saturating_add(offset).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}
