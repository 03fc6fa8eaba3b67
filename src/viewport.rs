use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Fixed desktop layout size; wide enough that responsive pages do not switch
/// to their mobile presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 847,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1280x847)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Width must be positive")]
    ZeroWidth,
    #[error("Height must be positive")]
    ZeroHeight,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if height.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = width
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(width.to_string()))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(height.to_string()))?;

        if width == 0 {
            return Err(ViewportParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(ViewportParseError::ZeroHeight);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let vp: Viewport = "1280x847".parse().unwrap();
        assert_eq!(vp.width, 1280);
        assert_eq!(vp.height, 847);
    }

    #[test]
    fn test_parse_with_spaces_and_uppercase_separator() {
        let vp: Viewport = " 1920 X 1080 ".parse().unwrap();
        assert_eq!(vp.width, 1920);
        assert_eq!(vp.height, 1080);
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!("1280".parse::<Viewport>().is_err());
        assert!("1280x847x600".parse::<Viewport>().is_err());
        assert!("x847".parse::<Viewport>().is_err());
    }

    #[test]
    fn test_parse_zero_dimensions() {
        assert!(matches!(
            "0x847".parse::<Viewport>(),
            Err(ViewportParseError::ZeroWidth)
        ));
        assert!(matches!(
            "1280x0".parse::<Viewport>(),
            Err(ViewportParseError::ZeroHeight)
        ));
    }

    #[test]
    fn test_default_is_desktop_layout() {
        let vp = Viewport::default();
        assert_eq!(vp.width, 1280);
        assert_eq!(vp.height, 847);
        assert_eq!(vp.to_string(), "1280x847");
    }
}
