pub mod normalizer;
pub mod remote;
#[cfg(feature = "torch")]
pub mod torchscript;

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClassifierConfig, ClassifierKind, PipelineConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub label: String,
    pub confidence: f64,
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed backend output: {0}")]
    Decode(String),
}

/// An opaque image classifier.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    fn id(&self) -> &str;

    /// Returns at most `top_k` predictions, best first, confidences in [0, 1].
    async fn classify(
        &self,
        image: Arc<DynamicImage>,
        top_k: usize,
    ) -> Result<Vec<RawPrediction>, BackendError>;
}

/// A backend together with the settings the pipeline applies around it.
#[derive(Clone)]
pub struct BackendHandle {
    pub backend: Arc<dyn ClassifierBackend>,
    pub reliability: f64,
    pub top_k: usize,
    pub timeout: Duration,
}

impl BackendHandle {
    pub fn new(backend: Arc<dyn ClassifierBackend>, config: &ClassifierConfig) -> Self {
        Self {
            backend,
            reliability: config.reliability,
            top_k: config.top_k,
            timeout: config.timeout(),
        }
    }

    pub fn id(&self) -> &str {
        self.backend.id()
    }

    /// Classifies with the handle's timeout; a hung backend becomes `Timeout`.
    pub async fn classify_bounded(
        &self,
        image: Arc<DynamicImage>,
        top_k: usize,
    ) -> Result<Vec<RawPrediction>, BackendError> {
        match tokio::time::timeout(self.timeout, self.backend.classify(image, top_k)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.timeout)),
        }
    }
}

/// Sorts label scores best first, clamps them into [0, 1] and keeps `top_k`.
pub fn rank_top_k(scores: Vec<(String, f64)>, top_k: usize, source: &str) -> Vec<RawPrediction> {
    let mut scores: Vec<(String, f64)> = scores
        .into_iter()
        .filter(|(_, score)| score.is_finite())
        .collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores.truncate(top_k);
    scores
        .into_iter()
        .map(|(label, score)| RawPrediction {
            label,
            confidence: score.clamp(0.0, 1.0),
            source: source.to_string(),
        })
        .collect()
}

/// Instantiates every configured backend. A backend that cannot be
/// constructed is logged and left out rather than failing startup.
pub fn build_backends(config: &PipelineConfig, http_client: &reqwest::Client) -> Vec<BackendHandle> {
    let mut handles = Vec::with_capacity(config.classifiers.len());
    for classifier in &config.classifiers {
        match build_backend(classifier, http_client) {
            Ok(backend) => {
                log::info!(
                    "Classifier '{}' ready (reliability {}, top_k {})",
                    classifier.id,
                    classifier.reliability,
                    classifier.top_k
                );
                handles.push(BackendHandle::new(backend, classifier));
            }
            Err(e) => log::error!("Skipping classifier '{}': {}", classifier.id, e),
        }
    }
    handles
}

fn build_backend(
    config: &ClassifierConfig,
    http_client: &reqwest::Client,
) -> Result<Arc<dyn ClassifierBackend>, BackendError> {
    match &config.kind {
        ClassifierKind::Remote { endpoint } => Ok(Arc::new(remote::RemoteClassifier::new(
            config.id.clone(),
            endpoint,
            http_client.clone(),
        )?)),
        #[cfg(feature = "torch")]
        ClassifierKind::Torchscript {
            model_path,
            labels_path,
        } => Ok(Arc::new(torchscript::TorchScriptClassifier::load(
            config.id.clone(),
            model_path,
            labels_path,
        )?)),
        #[cfg(not(feature = "torch"))]
        ClassifierKind::Torchscript { .. } => Err(BackendError::Unavailable(
            "built without the `torch` feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy;

    #[async_trait]
    impl ClassifierBackend for Sleepy {
        fn id(&self) -> &str {
            "sleepy"
        }

        async fn classify(
            &self,
            _image: Arc<DynamicImage>,
            _top_k: usize,
        ) -> Result<Vec<RawPrediction>, BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    #[test]
    fn rank_top_k_sorts_clamps_and_truncates() {
        let ranked = rank_top_k(
            vec![
                ("plate".into(), 0.05),
                ("pizza".into(), 1.2),
                ("bagel".into(), 0.3),
                ("nan".into(), f64::NAN),
                ("soup".into(), 0.1),
            ],
            3,
            "mobilenet",
        );
        let labels: Vec<_> = ranked.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["pizza", "bagel", "soup"]);
        assert_eq!(ranked[0].confidence, 1.0);
        assert!(ranked.iter().all(|p| p.source == "mobilenet"));
    }

    #[tokio::test]
    async fn hung_backend_times_out() {
        let handle = BackendHandle {
            backend: Arc::new(Sleepy),
            reliability: 1.0,
            top_k: 3,
            timeout: Duration::from_millis(20),
        };
        let image = Arc::new(DynamicImage::new_rgb8(4, 4));
        let err = handle.classify_bounded(image, 3).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }
}
