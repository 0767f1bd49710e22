use std::collections::HashSet;
use std::fmt::Write as _;

use async_trait::async_trait;
use prep_core::model::syllabus::{COMPLEMENTARY_PAIRS, DEFAULT_GAP_TOPICS};
use prep_core::model::{ExamMode, Question, QuestionDraft, QuestionId, TopicArea};
use rand::Rng;
use serde_json::json;

use crate::error::ProviderError;
use crate::gemini::{GeminiClient, GenerateRequest, GenerationConfig};

/// What to ask a provider for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRequest {
    pub count: u32,
    pub mode: ExamMode,
    pub subject: Option<String>,
    /// Weak subjects to favour in gap-focus mode. Empty means "use the defaults".
    pub focus_subjects: Vec<String>,
}

impl QuestionRequest {
    #[must_use]
    pub fn new(count: u32, mode: ExamMode, subject: Option<String>) -> Self {
        Self {
            count,
            mode,
            subject,
            focus_subjects: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_focus_subjects(mut self, subjects: Vec<String>) -> Self {
        self.focus_subjects = subjects;
        self
    }
}

/// Source of exam questions.
///
/// Implementations may return fewer questions than requested, but every
/// returned question must be valid and ids must be unique within the batch.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Fetch one batch of questions.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the source is unreachable or its answer
    /// cannot be used at all.
    async fn fetch_questions(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<Question>, ProviderError>;
}

//
// ─── GEMINI PROVIDER ───────────────────────────────────────────────────────────
//

/// Generates board-style questions through the generative-language API.
#[derive(Clone)]
pub struct GeminiQuestionProvider {
    client: GeminiClient,
}

impl GeminiQuestionProvider {
    #[must_use]
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuestionProvider for GeminiQuestionProvider {
    async fn fetch_questions(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<Question>, ProviderError> {
        if request.count == 0 {
            return Ok(Vec::new());
        }
        let pair = rand::rng().random_range(0..COMPLEMENTARY_PAIRS.len());
        let prompt = build_prompt(request, pair);
        let generate = GenerateRequest::text(prompt).with_generation_config(GenerationConfig {
            response_mime_type: Some("application/json".into()),
            response_schema: Some(question_schema()),
            ..GenerationConfig::default()
        });

        let response = self
            .client
            .generate(self.client.settings().text_model(), &generate)
            .await?;
        let raw = response
            .text()
            .ok_or_else(|| ProviderError::Parse("empty response".into()))?;

        let questions = parse_questions(&raw, request.count)?;
        tracing::info!(
            mode = %request.mode,
            requested = request.count,
            received = questions.len(),
            "fetched questions"
        );
        Ok(questions)
    }
}

/// Build the generation prompt. `pair` selects the complementary pair for
/// paired mode.
fn build_prompt(request: &QuestionRequest, pair: usize) -> String {
    let mut prompt = String::from(
        "Atue como um especialista em concursos da banca CONSULPAM.\n",
    );
    let _ = writeln!(
        prompt,
        "Gere um simulado com exatamente {} questões para o cargo de Técnico em Radiologia (Concurso Eusébio 2025).",
        request.count
    );
    let _ = writeln!(prompt, "\nMODALIDADE: {}", distribution_text(request, pair));
    prompt.push_str(
        "\nESTILO: Questões diretas, com 4 alternativas (A, B, C, D) conforme o padrão Consulpam.\n\
         As justificativas (explanation) devem ser didáticas e profundas.\n\
         \nRetorne em JSON estrito.",
    );
    prompt
}

fn distribution_text(request: &QuestionRequest, pair: usize) -> String {
    match request.mode {
        ExamMode::SingleSubject => format!(
            "FOCO TOTAL na matéria: {}. Todas as questões devem ser deste tema.",
            request.subject.as_deref().unwrap_or_default()
        ),
        ExamMode::PairedSubjects => {
            let (a, b) = COMPLEMENTARY_PAIRS[pair % COMPLEMENTARY_PAIRS.len()];
            format!(
                "FOCO EM PAR COMPLEMENTAR: Divida as questões igualmente entre {a} e {b}."
            )
        }
        ExamMode::GapFocus => {
            let topics = if request.focus_subjects.is_empty() {
                DEFAULT_GAP_TOPICS.join(" e ")
            } else {
                request.focus_subjects.join(", ")
            };
            format!(
                "FOCO EM CORREÇÃO DE GAPS: Gere questões dos temas mais complexos e com maior taxa de erro: {topics}."
            )
        }
        ExamMode::Random => {
            "ESCOLHA ALEATÓRIA: Misture temas de forma imprevisível entre gerais e específicos."
                .to_string()
        }
        ExamMode::FullMock => {
            let parts: Vec<String> = TopicArea::distribute(request.count)
                .into_iter()
                .map(|(area, n)| {
                    format!("{}% {} ({n} questões)", area.weight_percent(), area.label())
                })
                .collect();
            format!("DISTRIBUIÇÃO OFICIAL EDITAL: {}.", parts.join(", "))
        }
    }
}

fn question_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": {"type": "STRING"},
                "subject": {"type": "STRING"},
                "text": {"type": "STRING"},
                "options": {"type": "ARRAY", "items": {"type": "STRING"}, "minItems": 4, "maxItems": 4},
                "correctIndex": {"type": "INTEGER"},
                "explanation": {"type": "STRING"}
            },
            "required": ["id", "subject", "text", "options", "correctIndex", "explanation"]
        }
    })
}

/// Parse a JSON array of questions, keeping at most `limit` valid items.
///
/// Malformed items are dropped with a warning. Missing or repeated ids are
/// replaced with fresh ones.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the payload is not a JSON array.
pub fn parse_questions(raw: &str, limit: u32) -> Result<Vec<Question>, ProviderError> {
    let items: Vec<serde_json::Value> = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ProviderError::Parse(e.to_string()))?;
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    let mut seen = HashSet::new();
    let mut questions = Vec::with_capacity(items.len().min(limit));
    for (position, item) in items.into_iter().enumerate() {
        if questions.len() >= limit {
            break;
        }
        let mut draft: QuestionDraft = match serde_json::from_value(item) {
            Ok(draft) => draft,
            Err(err) => {
                tracing::warn!(position, error = %err, "dropping undecodable question");
                continue;
            }
        };
        let needs_id = draft
            .id
            .as_deref()
            .is_none_or(|id| id.trim().is_empty() || seen.contains(id.trim()));
        if needs_id {
            draft.id = Some(fresh_question_id().as_str().to_string());
        }
        match draft.validate() {
            Ok(question) => {
                seen.insert(question.id().as_str().to_string());
                questions.push(question);
            }
            Err(err) => tracing::warn!(position, error = %err, "dropping invalid question"),
        }
    }
    Ok(questions)
}

/// A random question id.
#[must_use]
pub fn fresh_question_id() -> QuestionId {
    QuestionId::new(uuid::Uuid::new_v4().to_string())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
