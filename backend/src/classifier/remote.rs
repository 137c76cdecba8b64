use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use url::Url;

use super::{BackendError, ClassifierBackend, RawPrediction, rank_top_k};

/// Classifier served by a model server that accepts a raw image body.
#[derive(Clone)]
pub struct RemoteClassifier {
    id: String,
    endpoint: Url,
    http_client: reqwest::Client,
}

// Model servers answer either `{"label": score}` or `[{"label": .., "score": ..}]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoresPayload {
    Map(HashMap<String, f64>),
    List(Vec<LabelScore>),
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    #[serde(alias = "probability", alias = "confidence")]
    score: f64,
}

impl ScoresPayload {
    fn into_scores(self) -> Vec<(String, f64)> {
        match self {
            ScoresPayload::Map(map) => map.into_iter().collect(),
            ScoresPayload::List(list) => list.into_iter().map(|s| (s.label, s.score)).collect(),
        }
    }
}

impl RemoteClassifier {
    pub fn new(id: String, endpoint: &str, http_client: reqwest::Client) -> Result<Self, BackendError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| BackendError::Unavailable(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        Ok(Self {
            id,
            endpoint,
            http_client,
        })
    }

    fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| BackendError::Unavailable(format!("failed to encode image: {}", e)))?;
        Ok(buf)
    }
}

#[async_trait]
impl ClassifierBackend for RemoteClassifier {
    fn id(&self) -> &str {
        &self.id
    }

    async fn classify(
        &self,
        image: Arc<DynamicImage>,
        top_k: usize,
    ) -> Result<Vec<RawPrediction>, BackendError> {
        let body = Self::encode_png(&image)?;
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("{}: {}", self.id, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "{} answered with status {}",
                self.id, status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Unavailable(format!("{}: {}", self.id, e)))?;
        let payload = parse_scores(&text)?;
        log::debug!("{} returned {} scores", self.id, payload.len());
        Ok(rank_top_k(payload, top_k, &self.id))
    }
}

fn parse_scores(text: &str) -> Result<Vec<(String, f64)>, BackendError> {
    serde_json::from_str::<ScoresPayload>(text)
        .map(ScoresPayload::into_scores)
        .map_err(|e| BackendError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_score_map() {
        let mut scores = parse_scores(r#"{"pizza": 0.8, "plate": 0.1}"#).unwrap();
        scores.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            scores,
            vec![("pizza".to_string(), 0.8), ("plate".to_string(), 0.1)]
        );
    }

    #[test]
    fn parses_label_score_list() {
        let scores =
            parse_scores(r#"[{"label": "bagel", "score": 0.6}, {"label": "pretzel", "probability": 0.2}]"#)
                .unwrap();
        assert_eq!(
            scores,
            vec![("bagel".to_string(), 0.6), ("pretzel".to_string(), 0.2)]
        );
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        assert!(matches!(
            parse_scores(r#"{"error": "model not loaded"}"#),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let result = RemoteClassifier::new("m".into(), "not a url", reqwest::Client::new());
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }
}
