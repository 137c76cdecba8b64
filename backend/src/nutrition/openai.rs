use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::NutritionRecord;
use std::time::Duration;

use super::provider::{
    NutritionProvider, ProviderError, check_status, nutrition_prompt, parse_nutrition_payload,
    transport_error,
};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4";

#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

impl OpenAiProvider {
    pub fn new(
        http_client: reqwest::Client,
        api_key: String,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl NutritionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, food_name: &str, context: &str) -> Result<NutritionRecord, ProviderError> {
        let prompt = nutrition_prompt(food_name, context);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: 300,
            temperature: 0.1,
        };

        let response = self
            .http_client
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let reply: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        parse_nutrition_payload(&extract_text(reply)?)
    }
}

fn extract_text(reply: ChatResponse) -> Result<String, ProviderError> {
    reply
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ProviderError::Parse("response has no choices".into()))
}
