//! End-to-end "analyze image" operation.

use futures::future::join_all;
use image::DynamicImage;
use shared::{AnalysisResponse, FoodPrediction};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::cache_service::PredictionCache;
use crate::cache::fingerprint;
use crate::classifier::normalizer::LabelNormalizer;
use crate::classifier::{BackendHandle, RawPrediction};
use crate::config::PipelineConfig;
use crate::ensemble::{EnsembleAggregator, EnsembleResult, NormalizedPrediction};
use crate::nutrition::NutritionResolver;
use crate::portion::{PortionEstimate, PortionEstimator};
use crate::preprocess::{decode_image, enhance_image};

pub const DEFAULT_CONTEXT: &str = "Food image";
const ENSEMBLE_TAG: &str = "ensemble";
const SINGLE_BACKEND_TOP_K: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("No food could be recognised in the image")]
    NoPredictions,
    #[error("Worker task failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub context: Option<String>,
    /// `false` skips the ensemble and asks only the primary classifier.
    pub advanced_mode: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            context: None,
            advanced_mode: true,
        }
    }
}

pub struct PipelineOrchestrator {
    backends: Vec<BackendHandle>,
    primary: String,
    normalizer: LabelNormalizer,
    aggregator: EnsembleAggregator,
    portion_estimator: PortionEstimator,
    cache: Arc<PredictionCache>,
    resolver: Arc<NutritionResolver>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &PipelineConfig,
        backends: Vec<BackendHandle>,
        cache: Arc<PredictionCache>,
        resolver: Arc<NutritionResolver>,
    ) -> Self {
        Self {
            backends,
            primary: config.primary_classifier.clone(),
            normalizer: LabelNormalizer::new(config.label_synonyms.clone()),
            aggregator: EnsembleAggregator::new(config.ensemble.max_results),
            portion_estimator: PortionEstimator::new(config.portion.foreground_threshold),
            cache,
            resolver,
        }
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    pub fn resolver(&self) -> &NutritionResolver {
        &self.resolver
    }

    pub fn normalizer(&self) -> &LabelNormalizer {
        &self.normalizer
    }

    pub async fn analyze(
        &self,
        image_data: &[u8],
        options: AnalyzeOptions,
    ) -> Result<AnalysisResponse, PipelineError> {
        let started = Instant::now();
        let image_hash = fingerprint(image_data);

        if let Some(cached) = self.cached_response(&image_hash).await {
            log::info!("Using cached prediction for image {}", image_hash);
            return Ok(cached);
        }

        let bytes = image_data.to_vec();
        let image = tokio::task::spawn_blocking(move || {
            decode_image(&bytes).map(|image| enhance_image(&image))
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
        let image = Arc::new(image);

        let (portion, outputs) = tokio::join!(
            self.estimate_portion(image.clone()),
            self.run_backends(image.clone(), options.advanced_mode)
        );

        let normalized: Vec<NormalizedPrediction> = outputs
            .into_iter()
            .flat_map(|(reliability, raw)| self.normalize(raw, reliability, portion.multiplier))
            .collect();
        let mut results = self.aggregator.aggregate(&normalized);
        let mut model_tag: &str = ENSEMBLE_TAG;

        if results.is_empty() {
            if options.advanced_mode {
                log::warn!(
                    "Ensemble produced no predictions for {}, falling back to '{}'",
                    image_hash,
                    self.primary
                );
            }
            results = self.single_backend(image, portion.multiplier).await;
            model_tag = self.primary.as_str();
        }
        if results.is_empty() {
            return Err(PipelineError::NoPredictions);
        }

        let context = options
            .context
            .filter(|context| !context.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
        let predictions = self.attach_nutrition(results, model_tag, &context).await;
        let ai_confidence = if predictions.is_empty() {
            0.0
        } else {
            predictions.iter().map(|p| p.confidence).sum::<f64>() / predictions.len() as f64
        };

        let response = AnalysisResponse {
            success: true,
            request_id: Uuid::new_v4(),
            predictions,
            image_hash,
            processing_time: started.elapsed().as_secs_f64(),
            ai_confidence,
            image_context: context,
            portion_analysis: BTreeMap::from([("default".to_string(), portion.multiplier)]),
            cached: false,
        };
        self.store(&response).await;

        log::info!(
            "Food analysis completed in {:.2}s with {} predictions",
            response.processing_time,
            response.predictions.len()
        );
        Ok(response)
    }

    async fn cached_response(&self, image_hash: &str) -> Option<AnalysisResponse> {
        let entry = self.cache.get(image_hash).await?;
        match serde_json::from_str::<AnalysisResponse>(&entry.payload) {
            Ok(mut response) => {
                response.cached = true;
                Some(response)
            }
            Err(e) => {
                log::warn!("Cached entry for {} is corrupt, recomputing: {}", image_hash, e);
                None
            }
        }
    }

    async fn store(&self, response: &AnalysisResponse) {
        match serde_json::to_string(response) {
            Ok(payload) => self.cache.put(&response.image_hash, payload).await,
            Err(e) => log::warn!("Failed to serialize response for caching: {}", e),
        }
    }

    async fn estimate_portion(&self, image: Arc<DynamicImage>) -> PortionEstimate {
        let estimator = self.portion_estimator.clone();
        match tokio::task::spawn_blocking(move || estimator.estimate(&image)).await {
            Ok(estimate) => estimate,
            Err(e) => {
                log::warn!("Portion estimation failed: {}", e);
                PortionEstimate::default()
            }
        }
    }

    /// Queries every backend concurrently; failures and timeouts are dropped.
    async fn run_backends(
        &self,
        image: Arc<DynamicImage>,
        advanced_mode: bool,
    ) -> Vec<(f64, Vec<RawPrediction>)> {
        if !advanced_mode {
            return Vec::new();
        }
        let calls = self.backends.iter().map(|handle| {
            let image = image.clone();
            async move { (handle, handle.classify_bounded(image, handle.top_k).await) }
        });

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|(handle, result)| match result {
                Ok(predictions) => {
                    log::debug!("{} proposed {:?}", handle.id(), predictions);
                    Some((handle.reliability, predictions))
                }
                Err(e) => {
                    log::warn!("Classifier '{}' unavailable: {}", handle.id(), e);
                    None
                }
            })
            .collect()
    }

    /// Primary classifier alone, unscaled, with a wider top-k.
    async fn single_backend(&self, image: Arc<DynamicImage>, portion: f64) -> Vec<EnsembleResult> {
        let Some(handle) = self.backends.iter().find(|h| h.id() == self.primary) else {
            log::error!("Primary classifier '{}' is not available", self.primary);
            return Vec::new();
        };
        match handle.classify_bounded(image, SINGLE_BACKEND_TOP_K).await {
            Ok(raw) => self
                .aggregator
                .aggregate(&self.normalize(raw, 1.0, portion)),
            Err(e) => {
                log::warn!("Primary classifier '{}' failed: {}", self.primary, e);
                Vec::new()
            }
        }
    }

    fn normalize(
        &self,
        raw: Vec<RawPrediction>,
        reliability: f64,
        portion: f64,
    ) -> Vec<NormalizedPrediction> {
        raw.into_iter()
            .map(|prediction| {
                NormalizedPrediction::from_raw(prediction, &self.normalizer, reliability, portion)
            })
            .collect()
    }

    async fn attach_nutrition(
        &self,
        results: Vec<EnsembleResult>,
        model_tag: &str,
        context: &str,
    ) -> Vec<FoodPrediction> {
        let resolutions = join_all(
            results
                .iter()
                .map(|result| self.resolver.resolve(&result.food_name, context)),
        )
        .await;

        results
            .into_iter()
            .zip(resolutions)
            .map(|(result, resolution)| FoodPrediction {
                nutritional_values: resolution.record.scaled(result.portion_multiplier),
                nutrition: resolution.record,
                food_name: result.food_name,
                original_prediction: result.original_label,
                confidence: result.confidence,
                model_agreement: result.agreement_count,
                ai_model_used: model_tag.to_string(),
                estimated_portion: result.portion_multiplier,
                context: context.to_string(),
            })
            .collect()
    }
}
