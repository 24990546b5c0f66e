use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::consts::{
    MAX_IMAGE_COUNT, MAX_SOURCE_IMAGE_BYTES, MIN_IMAGE_COUNT, SOURCE_IMAGE_TOO_LARGE_MESSAGE,
};
use crate::error::StudioError;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Display, EnumString, EnumIter, PartialEq, Eq,
)]
#[strum(ascii_case_insensitive)]
pub enum Style {
    #[default]
    Realistic,
    Anime,
    Cyberpunk,
    Noir,
    Documentary,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Display, EnumString, EnumIter, PartialEq, Eq,
)]
pub enum AspectRatio {
    #[default]
    #[strum(serialize = "1:1")]
    #[serde(rename = "1:1")]
    Square,
    #[strum(serialize = "16:9")]
    #[serde(rename = "16:9")]
    Landscape,
    #[strum(serialize = "9:16")]
    #[serde(rename = "9:16")]
    Portrait,
    #[strum(serialize = "4:3")]
    #[serde(rename = "4:3")]
    Standard,
    #[strum(serialize = "3:4")]
    #[serde(rename = "3:4")]
    StandardPortrait,
}

/// Aspect ratios the video model accepts
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Display, EnumString, EnumIter, PartialEq, Eq,
)]
pub enum VideoAspectRatio {
    #[default]
    #[strum(serialize = "16:9")]
    #[serde(rename = "16:9")]
    Landscape,
    #[strum(serialize = "9:16")]
    #[serde(rename = "9:16")]
    Portrait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub style: Style,
    pub count: u8,
    pub aspect_ratio: AspectRatio,
}

impl ImageRequest {
    /// Style goes first, the negative prompt is appended as a trailing clause
    pub fn composed_prompt(&self) -> String {
        let negative = self.negative_prompt.trim();
        if negative.is_empty() {
            format!("Style: {}. {}", self.style, self.prompt)
        } else {
            format!(
                "Style: {}. {}. Negative prompt: {}",
                self.style, self.prompt, negative
            )
        }
    }

    pub fn validate(&self) -> Result<(), StudioError> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::InvalidRequest(
                "Prompt must not be empty".to_string(),
            ));
        }
        if !(MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(&self.count) {
            return Err(StudioError::InvalidRequest(format!(
                "Number of images must be between {MIN_IMAGE_COUNT} and {MAX_IMAGE_COUNT}"
            )));
        }
        Ok(())
    }
}

/// Still image that a video is animated from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub prompt: String,
    pub image: SourceImage,
    pub aspect_ratio: VideoAspectRatio,
}

impl VideoRequest {
    pub fn validate(&self) -> Result<(), StudioError> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::InvalidRequest(
                "Prompt must not be empty".to_string(),
            ));
        }
        if !self.image.mime_type.starts_with("image/") {
            return Err(StudioError::InvalidRequest(format!(
                "Unsupported source image type: {}",
                self.image.mime_type
            )));
        }
        if self.image.bytes.is_empty() {
            return Err(StudioError::InvalidRequest(
                "Source image is empty".to_string(),
            ));
        }
        if self.image.bytes.len() > MAX_SOURCE_IMAGE_BYTES {
            return Err(StudioError::InvalidRequest(
                SOURCE_IMAGE_TOO_LARGE_MESSAGE.to_string(),
            ));
        }
        Ok(())
    }
}

/// A generated image as an inline `data:` URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageArtifact {
    pub data_uri: String,
}

impl ImageArtifact {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            data_uri: format!("data:{};base64,{}", mime_type, BASE64.encode(bytes)),
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.data_uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(';'))
            .map(|(mime, _)| mime)
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = self
            .data_uri
            .split_once(',')
            .map(|(_, payload)| payload)
            .unwrap_or_default();
        BASE64.decode(payload)
    }
}

/// A finished video, stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoArtifact {
    pub source_uri: String,
    pub path: PathBuf,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum GenerationResult {
    #[default]
    None,
    Images(Vec<ImageArtifact>),
    Video(VideoArtifact),
}

/// Everything a front end needs to render the studio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudioView {
    pub busy: bool,
    pub progress_message: String,
    /// Dismissible error text
    pub banner: Option<String>,
    pub result: GenerationResult,
    pub credential_selected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    fn image_request() -> ImageRequest {
        ImageRequest {
            prompt: "A lion".to_string(),
            negative_prompt: String::new(),
            style: Style::Noir,
            count: 1,
            aspect_ratio: AspectRatio::Square,
        }
    }

    #[test]
    fn test_composed_prompt() {
        let mut request = image_request();
        assert_eq!(request.composed_prompt(), "Style: Noir. A lion");

        request.negative_prompt = "blurry, text".to_string();
        assert_eq!(
            request.composed_prompt(),
            "Style: Noir. A lion. Negative prompt: blurry, text"
        );
    }

    #[test]
    fn test_image_count_bounds() {
        let mut request = image_request();
        for count in 1..=4 {
            request.count = count;
            assert!(request.validate().is_ok());
        }

        request.count = 0;
        assert!(matches!(
            request.validate(),
            Err(StudioError::InvalidRequest(_))
        ));
        request.count = 5;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_aspect_ratio_strings() {
        assert_eq!(AspectRatio::from_str("4:3").unwrap(), AspectRatio::Standard);
        assert_eq!(AspectRatio::StandardPortrait.to_string(), "3:4");
        assert_eq!(AspectRatio::iter().count(), 5);

        assert_eq!(
            VideoAspectRatio::from_str("9:16").unwrap(),
            VideoAspectRatio::Portrait
        );
        assert!(VideoAspectRatio::from_str("1:1").is_err());

        let json = serde_json::to_string(&VideoAspectRatio::Landscape).unwrap();
        assert_eq!(json, "\"16:9\"");
    }

    #[test]
    fn test_style_parsing_ignores_case() {
        assert_eq!(Style::from_str("cyberpunk").unwrap(), Style::Cyberpunk);
        assert_eq!(Style::default().to_string(), "Realistic");
    }

    #[test]
    fn test_video_request_validation() {
        let mut request = VideoRequest {
            prompt: "P".to_string(),
            image: SourceImage {
                bytes: vec![1, 2, 3],
                mime_type: "image/png".to_string(),
            },
            aspect_ratio: VideoAspectRatio::Landscape,
        };
        assert!(request.validate().is_ok());

        request.image.mime_type = "application/pdf".to_string();
        assert!(request.validate().is_err());

        request.image.mime_type = "image/jpeg".to_string();
        request.image.bytes = vec![0; MAX_SOURCE_IMAGE_BYTES + 1];
        assert_eq!(
            request.validate(),
            Err(StudioError::InvalidRequest(
                SOURCE_IMAGE_TOO_LARGE_MESSAGE.to_string()
            ))
        );
    }

    #[test]
    fn test_image_artifact_data_uri() {
        let artifact = ImageArtifact::from_bytes("image/png", b"png-bytes");
        assert!(artifact.data_uri.starts_with("data:image/png;base64,"));
        assert_eq!(artifact.mime_type(), Some("image/png"));
        assert_eq!(artifact.decode().unwrap(), b"png-bytes");
    }
}
