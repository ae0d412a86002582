use serde::{Deserialize, Serialize};

/// A normalized landmark position, `x` and `y` are fractions of the image width and height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub index: usize,
    pub x: f32,
    pub y: f32,
}

/// All landmarks predicted for one face, ordered by mesh index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceLandmarks {
    pub landmarks: Vec<Landmark>,
    pub confidence: f32,
}

impl FaceLandmarks {
    pub fn from_normalized(points: Vec<Coordinate2D>, confidence: f32) -> Self {
        let landmarks = points
            .into_iter()
            .enumerate()
            .map(|(index, p)| Landmark { index, x: p.x, y: p.y })
            .collect();
        FaceLandmarks { landmarks, confidence }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index).filter(|lm| lm.index == index)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate2D {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PixelCoordinate {
    pub x: i32,
    pub y: i32,
}

impl Landmark {
    /// to_pixel scales the normalized position by the image size, truncating toward zero.
    pub fn to_pixel(&self, width: i32, height: i32) -> PixelCoordinate {
        PixelCoordinate {
            x: (self.x * width as f32) as i32,
            y: (self.y * height as f32) as i32,
        }
    }
}
