//! Feedback form input types.

use core::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing [`FeedbackText`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedbackTextError {
    /// Nothing but whitespace was entered.
    #[error("feedback text cannot be empty")]
    Empty,
}

/// Free-text feedback, trimmed and guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackText(String);

impl FeedbackText {
    /// Parse feedback text, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`FeedbackTextError::Empty`] if the text is empty after
    /// trimming.
    pub fn parse(s: &str) -> Result<Self, FeedbackTextError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FeedbackTextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the text as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedbackText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when decoding a [`Screenshot`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScreenshotError {
    /// The input is not a `data:image/png;base64,` URL.
    #[error("screenshot must be a base64 PNG data URL")]
    NotPngDataUrl,
    /// The base64 payload failed to decode.
    #[error("screenshot payload is not valid base64")]
    InvalidBase64,
    /// The decoded bytes are not a PNG image.
    #[error("screenshot payload is not a PNG image")]
    NotPng,
    /// The decoded image is larger than accepted.
    #[error("screenshot must be at most {max} bytes")]
    TooLarge {
        /// Maximum accepted size in bytes.
        max: usize,
    },
}

/// A captured page screenshot, held only in the visitor's local state.
///
/// Stored as the original data URL so it can be rendered back into the
/// feedback panel without re-encoding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Screenshot(String);

impl Screenshot {
    /// Maximum decoded image size (4 MiB).
    pub const MAX_BYTES: usize = 4 * 1024 * 1024;

    const DATA_URL_PREFIX: &'static str = "data:image/png;base64,";
    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// Decode a screenshot from a `data:image/png;base64,...` URL.
    ///
    /// # Errors
    ///
    /// Returns a [`ScreenshotError`] if the URL has the wrong scheme, the
    /// payload is not base64, the bytes are not a PNG, or the image exceeds
    /// [`Self::MAX_BYTES`].
    pub fn from_data_url(data_url: &str) -> Result<Self, ScreenshotError> {
        let payload = data_url
            .strip_prefix(Self::DATA_URL_PREFIX)
            .ok_or(ScreenshotError::NotPngDataUrl)?;

        // Base64 expands 3 bytes to 4; reject before decoding.
        if payload.len() / 4 * 3 > Self::MAX_BYTES {
            return Err(ScreenshotError::TooLarge {
                max: Self::MAX_BYTES,
            });
        }

        let bytes = STANDARD
            .decode(payload)
            .map_err(|_| ScreenshotError::InvalidBase64)?;

        if !bytes.starts_with(&Self::PNG_SIGNATURE) {
            return Err(ScreenshotError::NotPng);
        }

        Ok(Self(data_url.to_owned()))
    }

    /// Returns the data URL for rendering in an `<img>` tag.
    #[must_use]
    pub fn data_url(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Screenshot")
            .field(&format_args!("{} bytes", self.0.len()))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png_data_url() -> String {
        let mut bytes = Screenshot::PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(b"rest-of-image");
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_feedback_text_trims() {
        let text = FeedbackText::parse("  the button is broken \n").unwrap();
        assert_eq!(text.as_str(), "the button is broken");
    }

    #[test]
    fn test_feedback_text_rejects_blank() {
        assert_eq!(FeedbackText::parse(""), Err(FeedbackTextError::Empty));
        assert_eq!(FeedbackText::parse(" \t\n "), Err(FeedbackTextError::Empty));
    }

    #[test]
    fn test_feedback_text_has_no_length_cap() {
        let long = "x".repeat(20_000);
        let text = FeedbackText::parse(&long).unwrap();
        assert_eq!(text.as_str().len(), 20_000);
    }

    #[test]
    fn test_screenshot_accepts_png() {
        let url = png_data_url();
        let shot = Screenshot::from_data_url(&url).unwrap();
        assert_eq!(shot.data_url(), url);
    }

    #[test]
    fn test_screenshot_rejects_other_schemes() {
        assert_eq!(
            Screenshot::from_data_url("data:image/jpeg;base64,AAAA"),
            Err(ScreenshotError::NotPngDataUrl)
        );
        assert_eq!(
            Screenshot::from_data_url("https://example.com/shot.png"),
            Err(ScreenshotError::NotPngDataUrl)
        );
    }

    #[test]
    fn test_screenshot_rejects_bad_payloads() {
        assert_eq!(
            Screenshot::from_data_url("data:image/png;base64,!!not base64!!"),
            Err(ScreenshotError::InvalidBase64)
        );

        let not_png = format!("data:image/png;base64,{}", STANDARD.encode(b"GIF89a...."));
        assert_eq!(
            Screenshot::from_data_url(&not_png),
            Err(ScreenshotError::NotPng)
        );
    }

    #[test]
    fn test_screenshot_debug_hides_payload() {
        let shot = Screenshot::from_data_url(&png_data_url()).unwrap();
        let debug = format!("{shot:?}");
        assert!(!debug.contains("base64"));
        assert!(debug.contains("bytes"));
    }
}
