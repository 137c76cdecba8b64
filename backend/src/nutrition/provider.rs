use async_trait::async_trait;
use shared::NutritionRecord;
use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicProvider;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use crate::config::{ApiKeys, ProviderConfig, ProviderKind};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Classifies a transport failure; `timeout` is the bound that was applied.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if err.is_decode() {
        ProviderError::Parse(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// An external source of nutrition facts.
#[async_trait]
pub trait NutritionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Upper bound the resolver enforces on a single `resolve` call.
    fn timeout(&self) -> Duration;

    async fn resolve(&self, food_name: &str, context: &str)
    -> Result<NutritionRecord, ProviderError>;
}

pub fn nutrition_prompt(food_name: &str, context: &str) -> String {
    format!(
        r#"Analyze the nutritional content of "{food_name}" based on this context: "{context}".

Provide accurate nutritional information per 100g in JSON format:
{{
    "calories_per_100g": <number>,
    "protein": <number>,
    "carbs": <number>,
    "fat": <number>,
    "fiber": <number>,
    "sugar": <number>,
    "sodium": <number>,
    "vitamins": {{"vitamin_c": <number>, "vitamin_a": <number>}},
    "minerals": {{"iron": <number>, "calcium": <number>}}
}}

Only return the JSON, no other text."#
    )
}

/// Parses model output into a record, tolerating a surrounding code fence.
pub fn parse_nutrition_payload(text: &str) -> Result<NutritionRecord, ProviderError> {
    let trimmed = text.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let record: NutritionRecord =
        serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let macros = [
        record.calories_per_100g,
        record.protein,
        record.carbs,
        record.fat,
        record.fiber,
        record.sugar,
        record.sodium,
    ];
    let micros = record.vitamins.values().chain(record.minerals.values());
    if macros.iter().chain(micros).any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ProviderError::Parse(
            "nutrient values must be finite and non-negative".into(),
        ));
    }
    Ok(record)
}

/// Turns a non-success HTTP response into `ProviderError::Api`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Builds the ordered chain, leaving out providers that have no API key.
pub fn build_provider_chain(
    configs: &[ProviderConfig],
    keys: &ApiKeys,
    http_client: &reqwest::Client,
) -> Vec<Arc<dyn NutritionProvider>> {
    let mut chain: Vec<Arc<dyn NutritionProvider>> = Vec::new();
    for config in configs {
        let Some(api_key) = keys.get(config.id) else {
            log::info!("Nutrition provider {:?} has no API key, skipping", config.id);
            continue;
        };
        let api_key = api_key.to_string();
        let model = config.model.clone();
        let timeout = config.timeout();
        let client = http_client.clone();
        let provider: Arc<dyn NutritionProvider> = match config.id {
            ProviderKind::Openai => Arc::new(OpenAiProvider::new(client, api_key, model, timeout)),
            ProviderKind::Anthropic => {
                Arc::new(AnthropicProvider::new(client, api_key, model, timeout))
            }
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(client, api_key, model, timeout)),
        };
        chain.push(provider);
    }
    log::info!(
        "Nutrition provider chain: [{}]",
        chain
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain = r#"{"calories_per_100g": 130, "protein": 2.7, "carbs": 28, "fat": 0.3}"#;
        let record = parse_nutrition_payload(plain).unwrap();
        assert_eq!(record.calories_per_100g, 130.0);
        assert_eq!(record.sugar, 0.0);

        let fenced = format!("```json\n{}\n```", plain);
        assert_eq!(parse_nutrition_payload(&fenced).unwrap(), record);
    }

    #[test]
    fn rejects_prose_and_negative_values() {
        assert!(matches!(
            parse_nutrition_payload("Rice has about 130 calories."),
            Err(ProviderError::Parse(_))
        ));
        assert!(matches!(
            parse_nutrition_payload(
                r#"{"calories_per_100g": -1, "protein": 1, "carbs": 1, "fat": 1}"#
            ),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn prompt_mentions_food_and_context() {
        let prompt = nutrition_prompt("ramen", "a bowl of noodle soup");
        assert!(prompt.contains("\"ramen\""));
        assert!(prompt.contains("a bowl of noodle soup"));
        assert!(prompt.contains("\"calories_per_100g\": <number>"));
    }

    #[test]
    fn chain_skips_providers_without_keys() {
        let configs = vec![
            ProviderConfig {
                id: ProviderKind::Openai,
                model: None,
                timeout_ms: 10_000,
            },
            ProviderConfig {
                id: ProviderKind::Anthropic,
                model: None,
                timeout_ms: 10_000,
            },
            ProviderConfig {
                id: ProviderKind::Gemini,
                model: None,
                timeout_ms: 10_000,
            },
        ];
        let keys = ApiKeys {
            openai: None,
            anthropic: Some("key-a".into()),
            gemini: Some("key-g".into()),
        };
        let chain = build_provider_chain(&configs, &keys, &reqwest::Client::new());
        let names: Vec<_> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["anthropic", "gemini"]);
    }
}
