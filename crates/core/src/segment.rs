//! Ingestable media segments
//!
//! A [`SegmentContainer`] is the unit a feature module processes: a shot or a
//! time window of a media object. Decoding media into segments happens
//! upstream; this type only carries what feature modules read.

use serde::{Deserialize, Serialize};

/// Row-major RGB raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RgbImage {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// `width * height` pixels, row-major
    pub pixels: Vec<[u8; 3]>,
}

impl RgbImage {
    /// Create an image filled with one color
    pub fn filled(width: usize, height: usize, color: [u8; 3]) -> Self {
        RgbImage {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    /// Pixel at (x, y), `None` when out of bounds or the buffer is short
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Whether the pixel buffer matches the declared dimensions
    pub fn is_consistent(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == self.width * self.height
    }
}

/// One segment of a media object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentContainer {
    /// Segment id
    pub id: String,
    /// Id of the media object this segment belongs to
    #[serde(default)]
    pub object_id: String,
    /// Free text attached to the segment (captions, transcript, query text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Average frame of the segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_image: Option<RgbImage>,
}

impl SegmentContainer {
    /// Create an empty segment
    pub fn new(id: impl Into<String>, object_id: impl Into<String>) -> Self {
        SegmentContainer {
            id: id.into(),
            object_id: object_id.into(),
            text: None,
            average_image: None,
        }
    }

    /// Create a query container carrying only text
    pub fn from_text(text: impl Into<String>) -> Self {
        SegmentContainer {
            text: Some(text.into()),
            ..Self::new("", "")
        }
    }

    /// Builder: set text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder: set average image
    pub fn with_average_image(mut self, image: RgbImage) -> Self {
        self.average_image = Some(image);
        self
    }

    /// Text, or the empty string
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_bounds() {
        let img = RgbImage::filled(2, 2, [1, 2, 3]);
        assert_eq!(img.pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(img.pixel(2, 0), None);
        assert!(img.is_consistent());
    }

    #[test]
    fn test_inconsistent_buffer() {
        let img = RgbImage {
            width: 3,
            height: 3,
            pixels: vec![[0, 0, 0]; 4],
        };
        assert!(!img.is_consistent());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let seg: SegmentContainer =
            serde_json::from_str(r#"{"id":"s1","objectId":"o1","text":"hello"}"#).unwrap();
        assert_eq!(seg.id, "s1");
        assert_eq!(seg.object_id, "o1");
        assert_eq!(seg.text(), "hello");
        assert!(seg.average_image.is_none());
    }
}
