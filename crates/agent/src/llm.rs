use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use chatcart_core::catalog::Persona;
use chatcart_core::collaborators::ToneGenerator;
use chatcart_core::config::{LlmConfig, LlmProvider};
use chatcart_core::errors::ApplicationError;
use chatcart_core::flows::ToneRequest;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Chat-completions client for OpenAI and OpenAI-compatible servers (Ollama's `/v1`).
pub struct OpenAiToneGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiToneGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, ApplicationError> {
        let base = match config.base_url.as_deref().map(|url| url.trim_end_matches('/')) {
            Some(url) if config.provider == LlmProvider::Ollama => format!("{url}/v1"),
            Some(url) => url.to_owned(),
            None => OPENAI_BASE_URL.to_owned(),
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{base}/chat/completions"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ToneGenerator for OpenAiToneGenerator {
    async fn rephrase(
        &self,
        persona: &Persona,
        request: &ToneRequest,
    ) -> Result<String, ApplicationError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: build_messages(persona, request),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key.expose_secret());
        }
        let response = call
            .send()
            .await
            .map_err(|error| ApplicationError::Integration(format!("tone request failed: {error}")))?;

        if !response.status().is_success() {
            return Err(ApplicationError::Integration(format!(
                "tone endpoint returned {}",
                response.status()
            )));
        }

        let raw = response.text().await.map_err(|error| {
            ApplicationError::Integration(format!("tone response unreadable: {error}"))
        })?;
        parse_completion(&raw)
    }
}

/// Always fails, so callers send the literal fallback text.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledToneGenerator;

#[async_trait]
impl ToneGenerator for DisabledToneGenerator {
    async fn rephrase(
        &self,
        _persona: &Persona,
        _request: &ToneRequest,
    ) -> Result<String, ApplicationError> {
        Err(ApplicationError::Integration("tone generation is disabled".to_owned()))
    }
}

pub fn tone_generator_from_config(
    config: &LlmConfig,
) -> Result<Arc<dyn ToneGenerator>, ApplicationError> {
    match config.provider {
        LlmProvider::Disabled => Ok(Arc::new(DisabledToneGenerator)),
        LlmProvider::OpenAi | LlmProvider::Ollama => Ok(Arc::new(OpenAiToneGenerator::new(config)?)),
    }
}

pub fn build_messages(persona: &Persona, request: &ToneRequest) -> Vec<ChatMessage> {
    let system = format!(
        "คุณคือ {} แอดมินร้านค้าออนไลน์ บุคลิก: {}\n\
         ตอบเป็นภาษาไทย สั้น กระชับ ไม่เกิน 3 ประโยค \
         ห้ามแต่งราคา โปรโมชั่น หรือข้อมูลสินค้าที่ไม่ได้ให้ไว้",
        persona.name, persona.personality
    );
    let mut user = request.instruction.clone();
    if let Some(context) = request.context.as_deref().filter(|context| !context.trim().is_empty()) {
        user.push_str("\n\nข้อมูลประกอบ:\n");
        user.push_str(context);
    }
    user.push_str("\n\nข้อความสำรอง (ใช้ได้ถ้าไม่แน่ใจ): ");
    user.push_str(&request.fallback);

    vec![
        ChatMessage { role: "system".to_owned(), content: system },
        ChatMessage { role: "user".to_owned(), content: user },
    ]
}

fn parse_completion(raw: &str) -> Result<String, ApplicationError> {
    let response: CompletionResponse = serde_json::from_str(raw).map_err(|error| {
        ApplicationError::Integration(format!("tone response is not valid json: {error}"))
    })?;
    response
        .choices
        .into_iter()
        .map(|choice| choice.message.content.trim().to_owned())
        .find(|content| !content.is_empty())
        .ok_or_else(|| ApplicationError::Integration("tone response had no content".to_owned()))
}
