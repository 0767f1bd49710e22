use std::collections::HashMap;
use std::str::FromStr;

use url::Url;

use crate::error::{AiError, TutorError};
use crate::gemini::{
    GeminiClient, GenerateRequest, GenerateResponse, GenerationConfig, GroundingChunk,
    GroundingSource, ImageConfig, LatLng, Part, RetrievalConfig, Tool, ToolConfig,
};

const SEARCH_CONTEXT: &str = "Pesquise informações oficiais e atualizadas sobre o Edital 2025 da Prefeitura de Eusébio/CE para Técnico em Radiologia (Banca Consulpam). Query:";
const STUDY_CENTERS_PROMPT: &str = "Encontre locais de prova da banca Consulpam, hospitais públicos ou centros de estudo no Eusébio/CE.";
const IMAGE_PROMPT_PREFIX: &str = "Diagrama médico educativo para radiologia:";
const DEFAULT_SOURCE_TITLE: &str = "Fonte de Informação";
const DEFAULT_PLACE_TITLE: &str = "Local de Interesse";

/// Aspect ratios accepted by diagram generation.
pub const ASPECT_RATIOS: [&str; 4] = ["1:1", "4:3", "16:9", "9:16"];
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Who said a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// A web page or place cited by a grounded answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLink {
    pub title: String,
    pub uri: Url,
}

/// Model text plus the sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedAnswer {
    pub text: String,
    pub sources: Vec<SourceLink>,
}

/// Output resolution of a generated study image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    #[default]
    OneK,
    TwoK,
    FourK,
}

impl ImageSize {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

impl FromStr for ImageSize {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(ImageSize::OneK),
            "2K" => Ok(ImageSize::TwoK),
            "4K" => Ok(ImageSize::FourK),
            _ => Err(TutorError::InvalidImageOption(s.to_string())),
        }
    }
}

/// Study helpers around the generative-language API: tutor chat, image
/// analysis, grounded search and diagram generation.
///
/// All calls need network access and an API key; without a key every call
/// fails with `AiError::Disabled`.
#[derive(Clone)]
pub struct TutorService {
    client: GeminiClient,
}

impl TutorService {
    #[must_use]
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.client.enabled()
    }

    /// Continue a tutoring conversation.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::EmptyPrompt` for an empty conversation and
    /// `TutorError::Ai` when the request fails or the reply is empty.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, TutorError> {
        let prompt = flatten_conversation(messages);
        if prompt.trim().is_empty() {
            return Err(TutorError::EmptyPrompt);
        }
        let response = self
            .client
            .generate(
                self.client.settings().text_model(),
                &GenerateRequest::text(prompt),
            )
            .await?;
        Ok(response.text().ok_or(AiError::EmptyResponse)?)
    }

    /// Ask a question about a JPEG image (base64 without the `data:` prefix).
    ///
    /// # Errors
    ///
    /// Returns `TutorError` when the prompt or image is empty or the request fails.
    pub async fn analyze_image(
        &self,
        base64_jpeg: &str,
        prompt: &str,
    ) -> Result<String, TutorError> {
        let request = image_analysis_request(base64_jpeg, prompt)?;
        let response = self
            .client
            .generate(self.client.settings().vision_model(), &request)
            .await?;
        Ok(response.text().ok_or(AiError::EmptyResponse)?)
    }

    /// Search the web for exam information.
    ///
    /// # Errors
    ///
    /// Returns `TutorError` when the query is empty or the request fails.
    pub async fn search_exam_info(&self, query: &str) -> Result<GroundedAnswer, TutorError> {
        if query.trim().is_empty() {
            return Err(TutorError::EmptyPrompt);
        }
        let request = GenerateRequest::text(format!("{SEARCH_CONTEXT} {}", query.trim()))
            .with_tool(Tool::google_search());
        let response = self
            .client
            .generate(self.client.settings().text_model(), &request)
            .await?;
        Ok(GroundedAnswer {
            text: response.text().unwrap_or_default(),
            sources: collect_sources(response.grounding_chunks(), |c| c.web.as_ref(), DEFAULT_SOURCE_TITLE),
        })
    }

    /// Find exam venues and study centres near a location.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidCoordinates` for out-of-range coordinates and
    /// `TutorError::Ai` when the request fails.
    pub async fn find_study_centers(&self, lat: f64, lng: f64) -> Result<GroundedAnswer, TutorError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(TutorError::InvalidCoordinates { lat, lng });
        }
        let request = GenerateRequest::text(STUDY_CENTERS_PROMPT)
            .with_tool(Tool::google_maps())
            .with_tool_config(ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: lat,
                        longitude: lng,
                    },
                },
            });
        let response = self
            .client
            .generate(self.client.settings().maps_model(), &request)
            .await?;
        Ok(GroundedAnswer {
            text: response.text().unwrap_or_default(),
            sources: collect_sources(response.grounding_chunks(), |c| c.maps.as_ref(), DEFAULT_PLACE_TITLE),
        })
    }

    /// Generate an educational diagram and return it as a `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns `TutorError` when the prompt is empty, the aspect ratio is not
    /// one of [`ASPECT_RATIOS`], the request fails or no image comes back.
    pub async fn generate_study_image(
        &self,
        prompt: &str,
        size: ImageSize,
        aspect_ratio: &str,
    ) -> Result<String, TutorError> {
        let request = study_image_request(prompt, size, aspect_ratio)?;
        let response = self
            .client
            .generate(self.client.settings().image_model(), &request)
            .await?;
        Ok(image_data_url(&response)?)
    }
}

fn image_analysis_request(base64_jpeg: &str, prompt: &str) -> Result<GenerateRequest, TutorError> {
    if prompt.trim().is_empty() || base64_jpeg.trim().is_empty() {
        return Err(TutorError::EmptyPrompt);
    }
    Ok(GenerateRequest::with_parts(vec![
        Part::inline("image/jpeg", base64_jpeg.trim()),
        Part::text(prompt.trim()),
    ]))
}

fn study_image_request(
    prompt: &str,
    size: ImageSize,
    aspect_ratio: &str,
) -> Result<GenerateRequest, TutorError> {
    if prompt.trim().is_empty() {
        return Err(TutorError::EmptyPrompt);
    }
    let aspect_ratio = aspect_ratio.trim();
    if !ASPECT_RATIOS.contains(&aspect_ratio) {
        return Err(TutorError::InvalidImageOption(aspect_ratio.to_string()));
    }
    Ok(GenerateRequest::with_parts(vec![Part::text(format!(
        "{IMAGE_PROMPT_PREFIX} {}",
        prompt.trim()
    ))])
    .with_generation_config(GenerationConfig {
        image_config: Some(ImageConfig {
            aspect_ratio: aspect_ratio.to_string(),
            image_size: size.as_str().to_string(),
        }),
        ..GenerationConfig::default()
    }))
}

/// First inline image of `response` as a `data:` URL.
fn image_data_url(response: &GenerateResponse) -> Result<String, AiError> {
    let image = response.first_inline_data().ok_or(AiError::EmptyResponse)?;
    Ok(format!("data:{};base64,{}", image.mime_type, image.data))
}

/// Render a conversation as `role: text` lines.
fn flatten_conversation(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| format!("{}: {}", m.role.as_str(), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One source per URI, in order of first appearance; a repeated URI takes the
/// later chunk's title. Chunks without a valid URL are dropped.
fn collect_sources(
    chunks: &[GroundingChunk],
    pick: impl Fn(&GroundingChunk) -> Option<&GroundingSource>,
    default_title: &str,
) -> Vec<SourceLink> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut sources: Vec<SourceLink> = Vec::new();
    for source in chunks.iter().filter_map(pick) {
        let Some(uri) = source.uri.as_deref().and_then(|u| Url::parse(u).ok()) else {
            continue;
        };
        let title = source
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(default_title)
            .to_string();
        match positions.get(uri.as_str()) {
            Some(&at) => sources[at].title = title,
            None => {
                positions.insert(uri.as_str().to_string(), sources.len());
                sources.push(SourceLink { title, uri });
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::AiSettings;
    use serde_json::json;

    #[test]
    fn conversation_is_flattened_to_role_lines() {
        let messages = vec![
            ChatMessage::user("O que é kVp?"),
            ChatMessage::model("Pico de quilovoltagem."),
            ChatMessage::user("  "),
            ChatMessage::user("E mAs?"),
        ];
        assert_eq!(
            flatten_conversation(&messages),
            "user: O que é kVp?\nmodel: Pico de quilovoltagem.\nuser: E mAs?"
        );
    }

    #[test]
    fn sources_are_deduplicated_by_uri_keeping_the_last_title() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://consulpam.com.br/edital", "title": "Edital"}},
                    {"web": {"uri": "https://consulpam.com.br/edital", "title": "Edital (cópia)"}},
                    {"web": {"uri": "not a url"}},
                    {"web": {"title": "Sem link"}},
                    {"maps": {"uri": "https://maps.example/x"}},
                    {"web": {"uri": "https://eusebio.ce.gov.br"}}
                ]}
            }]
        }))
        .unwrap();

        let sources = collect_sources(response.grounding_chunks(), |c| c.web.as_ref(), DEFAULT_SOURCE_TITLE);
        let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Edital (cópia)", DEFAULT_SOURCE_TITLE]);
        assert_eq!(sources[1].uri.as_str(), "https://eusebio.ce.gov.br/");
    }

    #[test]
    fn image_analysis_sends_jpeg_then_prompt() {
        let request = image_analysis_request(" /9j/4AAQ ", "Qual incidência?").unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [
                    {"inlineData": {"mimeType": "image/jpeg", "data": "/9j/4AAQ"}},
                    {"text": "Qual incidência?"}
                ]}]
            })
        );
        assert!(matches!(
            image_analysis_request("", "Qual incidência?"),
            Err(TutorError::EmptyPrompt)
        ));
    }

    #[test]
    fn study_image_request_carries_size_and_aspect() {
        let request = study_image_request("tórax PA", ImageSize::TwoK, "4:3").unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [
                    {"text": "Diagrama médico educativo para radiologia: tórax PA"}
                ]}],
                "generationConfig": {"imageConfig": {"aspectRatio": "4:3", "imageSize": "2K"}}
            })
        );
        assert!(matches!(
            study_image_request("tórax PA", ImageSize::OneK, "21:9"),
            Err(TutorError::InvalidImageOption(_))
        ));
    }

    #[test]
    fn image_size_parses_case_insensitively() {
        assert_eq!("2k".parse::<ImageSize>().unwrap(), ImageSize::TwoK);
        assert_eq!("4K".parse::<ImageSize>().unwrap(), ImageSize::FourK);
        assert!("8K".parse::<ImageSize>().is_err());
    }

    #[test]
    fn generated_image_becomes_a_data_url() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Segue o diagrama"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(
            image_data_url(&response).unwrap(),
            "data:image/png;base64,iVBORw0KGgo="
        );

        let empty: GenerateResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(image_data_url(&empty), Err(AiError::EmptyResponse)));
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected_before_any_request() {
        let tutor = TutorService::new(GeminiClient::new(AiSettings::default()));
        assert!(!tutor.enabled());
        assert!(matches!(tutor.chat(&[]).await, Err(TutorError::EmptyPrompt)));
        assert!(matches!(
            tutor.search_exam_info("   ").await,
            Err(TutorError::EmptyPrompt)
        ));
        assert!(matches!(
            tutor.find_study_centers(120.0, 0.0).await,
            Err(TutorError::InvalidCoordinates { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_client_reports_disabled() {
        let tutor = TutorService::new(GeminiClient::new(AiSettings::default()));
        assert!(matches!(
            tutor.chat(&[ChatMessage::user("oi")]).await,
            Err(TutorError::Ai(AiError::Disabled))
        ));
    }
}
