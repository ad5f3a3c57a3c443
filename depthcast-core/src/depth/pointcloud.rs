use crate::error::StreamError;

/// A set of 3D positions with optional per-point colors.
///
/// Coordinates are metres in the camera frame: x right, y up, z forward.
/// Point order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
    colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Create a cloud without colors.
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self {
            points,
            colors: None,
        }
    }

    /// Create a colored cloud; `colors` must have one entry per point.
    pub fn with_colors(points: Vec<[f32; 3]>, colors: Vec<[u8; 3]>) -> Result<Self, StreamError> {
        if points.len() != colors.len() {
            return Err(StreamError::InvalidPayload(format!(
                "{} points but {} colors",
                points.len(),
                colors.len()
            )));
        }
        Ok(Self {
            points,
            colors: Some(colors),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_length_checked() {
        assert!(PointCloud::with_colors(vec![[0.0; 3]; 2], vec![[0; 3]; 1]).is_err());
    }
}
