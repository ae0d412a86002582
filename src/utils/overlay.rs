use anyhow::Error;
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc::{line, LINE_8};
use serde::{Deserialize, Serialize};
use crate::utils::coordinate::PixelCoordinate;

/// Marker sizes used by the overlay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPreset {
    /// half-size 4, stroke 2
    #[default]
    Small,
    /// half-size 5, stroke 2
    Medium,
    /// half-size 10, stroke 5
    Large,
}

/// Appearance of the X marker drawn at every landmark.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkerStyle {
    /// Distance from the centre to each arm's end, along both axes.
    pub size: i32,
    pub thickness: i32,
    /// RGB
    pub color: [u8; 3],
}

impl MarkerStyle {
    pub const RED: [u8; 3] = [255, 0, 0];

    fn scalar(&self) -> Scalar {
        Scalar::new(self.color[0] as f64, self.color[1] as f64, self.color[2] as f64, 0.0)
    }
}

impl From<MarkerPreset> for MarkerStyle {
    fn from(preset: MarkerPreset) -> Self {
        let (size, thickness) = match preset {
            MarkerPreset::Small => (4, 2),
            MarkerPreset::Medium => (5, 2),
            MarkerPreset::Large => (10, 5),
        };
        MarkerStyle {
            size,
            thickness,
            color: MarkerStyle::RED,
        }
    }
}

impl Default for MarkerStyle {
    fn default() -> Self {
        MarkerPreset::default().into()
    }
}

/// draw_markers draws an X centred on every point onto a copy of `img`.
///
/// Points outside the image are clipped by OpenCV, the input matrix is left untouched.
///
/// # Arguments
/// * `img` - RGB matrix
/// * `points` - marker centres in pixels
/// * `style` - marker appearance
///
/// # Returns
/// * `Result<Mat, Error>`
pub fn draw_markers(img: &Mat, points: &[PixelCoordinate], style: &MarkerStyle) -> Result<Mat, Error> {
    let mut annotated = img.try_clone()?;
    let color = style.scalar();
    let s = style.size;

    for &PixelCoordinate { x, y } in points {
        let (left, right) = (x.saturating_sub(s), x.saturating_add(s));
        let (top, bottom) = (y.saturating_sub(s), y.saturating_add(s));
        line(&mut annotated, Point::new(left, top), Point::new(right, bottom), color, style.thickness, LINE_8, 0)?;
        line(&mut annotated, Point::new(left, bottom), Point::new(right, top), color, style.thickness, LINE_8, 0)?;
    }
    Ok(annotated)
}
