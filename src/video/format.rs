//! Frame geometry and color configuration types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const VGA: Size = Size::new(640, 480);
    pub const HD720: Size = Size::new(1280, 720);
    pub const HD1080: Size = Size::new(1920, 1080);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Landscape means width >= height (square counts as landscape)
    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }

    /// Return the size with width and height exchanged
    pub fn swapped(&self) -> Size {
        Size::new(self.height, self.width)
    }

    /// Dimensions ordered (max, min) regardless of posture
    pub fn ordered_desc(&self) -> Size {
        Size::new(
            self.width.max(self.height),
            self.width.min(self.height),
        )
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Color profile requested when opening a capture session.
///
/// Opaque to the pipeline core; it is handed through to the capture backend
/// once per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorProfile {
    #[default]
    Srgb,
    Bt601,
    Bt709,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_posture() {
        assert!(Size::HD1080.is_landscape());
        assert!(!Size::new(1080, 1920).is_landscape());
        // Square counts as landscape
        assert!(Size::new(512, 512).is_landscape());
    }

    #[test]
    fn test_ordered_desc() {
        assert_eq!(Size::new(1080, 1920).ordered_desc(), Size::new(1920, 1080));
        assert_eq!(Size::new(1920, 1080).ordered_desc(), Size::new(1920, 1080));
    }

    #[test]
    fn test_display() {
        assert_eq!(Size::HD720.to_string(), "1280x720");
    }
}
