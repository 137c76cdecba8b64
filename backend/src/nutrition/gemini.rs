use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::NutritionRecord;
use std::time::Duration;
use url::Url;

use super::provider::{
    NutritionProvider, ProviderError, check_status, nutrition_prompt, parse_nutrition_payload,
    transport_error,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-pro";

#[derive(Clone)]
pub struct GeminiProvider {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiProvider {
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

    fn endpoint(&self) -> Result<Url, ProviderError> {
        let base = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);
        Url::parse_with_params(&base, &[("key", self.api_key.as_str())])
            .map_err(|e| ProviderError::Network(format!("invalid Gemini URL: {}", e)))
    }
}

#[async_trait]
impl NutritionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, food_name: &str, context: &str) -> Result<NutritionRecord, ProviderError> {
        let prompt = nutrition_prompt(food_name, context);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        let response = self
            .http_client
            .post(self.endpoint()?)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let reply: GenerateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| ProviderError::Parse("response has no candidate text".into()))?;
        parse_nutrition_payload(&text)
    }
}
