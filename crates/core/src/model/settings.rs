use thiserror::Error;
use url::Url;

/// Default endpoint of the generative-language API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Model used for question generation and tutoring text.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
/// Model used for image analysis.
pub const DEFAULT_VISION_MODEL: &str = "gemini-3-pro-preview";
/// Model used for diagram generation.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
/// Model used for map-grounded place search.
pub const DEFAULT_MAPS_MODEL: &str = "gemini-2.5-flash";

/// Validated connection settings for the AI provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AiSettings {
    api_key: Option<String>,
    base_url: String,
    text_model: String,
    vision_model: String,
    image_model: String,
    maps_model: String,
}

#[derive(Clone, Debug, Default)]
pub struct AiSettingsDraft {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub text_model: Option<String>,
    pub vision_model: Option<String>,
    pub image_model: Option<String>,
    pub maps_model: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AiSettingsError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl AiSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns `AiSettingsError` if the base URL is present but invalid.
    pub fn validate(self) -> Result<AiSettings, AiSettingsError> {
        let base_url = normalize_optional(self.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if Url::parse(&base_url).is_err() {
            return Err(AiSettingsError::InvalidBaseUrl(base_url));
        }

        Ok(AiSettings {
            api_key: normalize_optional(self.api_key),
            base_url: base_url.trim_end_matches('/').to_string(),
            text_model: normalize_optional(self.text_model)
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            vision_model: normalize_optional(self.vision_model)
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            image_model: normalize_optional(self.image_model)
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            maps_model: normalize_optional(self.maps_model)
                .unwrap_or_else(|| DEFAULT_MAPS_MODEL.to_string()),
        })
    }
}

impl AiSettings {
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    #[must_use]
    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    #[must_use]
    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    #[must_use]
    pub fn maps_model(&self) -> &str {
        &self.maps_model
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            maps_model: DEFAULT_MAPS_MODEL.to_string(),
        }
    }
}

// Keeps the key out of logs.
impl std::fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("text_model", &self.text_model)
            .finish_non_exhaustive()
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
