//! Reconciles predictions from several classifiers into one ranked list.

use std::collections::HashMap;

use crate::classifier::RawPrediction;
use crate::classifier::normalizer::LabelNormalizer;

const MEAN_WEIGHT: f64 = 0.7;
const MAX_WEIGHT: f64 = 0.3;

/// A raw prediction mapped onto the canonical vocabulary, with its confidence
/// already scaled by the reliability of the backend that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPrediction {
    pub food_name: String,
    pub original_label: String,
    pub confidence: f64,
    pub source: String,
    pub portion: f64,
}

impl NormalizedPrediction {
    pub fn from_raw(
        raw: RawPrediction,
        normalizer: &LabelNormalizer,
        reliability: f64,
        portion: f64,
    ) -> Self {
        Self {
            food_name: normalizer.normalize(&raw.label),
            confidence: raw.confidence * reliability,
            original_label: raw.label,
            source: raw.source,
            portion,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleResult {
    pub food_name: String,
    /// Raw label of the first prediction that proposed this food.
    pub original_label: String,
    pub confidence: f64,
    pub agreement_count: usize,
    pub portion_multiplier: f64,
}

#[derive(Debug, Clone)]
pub struct EnsembleAggregator {
    max_results: usize,
}

struct Group<'a> {
    food_name: &'a str,
    original_label: &'a str,
    confidences: Vec<f64>,
    portions: Vec<f64>,
    sources: Vec<&'a str>,
}

impl EnsembleAggregator {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }

    /// Groups by canonical name and ranks by `0.7 * mean + 0.3 * max`.
    ///
    /// Ties fall back to agreement (more backends first), then to the order in
    /// which each food first appeared. An empty input gives an empty output.
    pub fn aggregate(&self, predictions: &[NormalizedPrediction]) -> Vec<EnsembleResult> {
        let mut groups: Vec<Group<'_>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for prediction in predictions {
            let slot = *index
                .entry(prediction.food_name.as_str())
                .or_insert_with(|| {
                    groups.push(Group {
                        food_name: &prediction.food_name,
                        original_label: &prediction.original_label,
                        confidences: Vec::new(),
                        portions: Vec::new(),
                        sources: Vec::new(),
                    });
                    groups.len() - 1
                });
            let group = &mut groups[slot];
            group.confidences.push(prediction.confidence);
            group.portions.push(prediction.portion);
            if !group.sources.contains(&prediction.source.as_str()) {
                group.sources.push(&prediction.source);
            }
        }

        // Enumeration order is first-seen order.
        let mut ranked: Vec<(usize, EnsembleResult)> = groups
            .into_iter()
            .enumerate()
            .map(|(first_seen, group)| {
                let max = group
                    .confidences
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                let combined = MEAN_WEIGHT * mean(&group.confidences) + MAX_WEIGHT * max;
                (
                    first_seen,
                    EnsembleResult {
                        food_name: group.food_name.to_string(),
                        original_label: group.original_label.to_string(),
                        confidence: combined,
                        agreement_count: group.sources.len(),
                        portion_multiplier: mean(&group.portions),
                    },
                )
            })
            .collect();

        ranked.sort_by(|(seen_a, a), (seen_b, b)| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.agreement_count.cmp(&a.agreement_count))
                .then_with(|| seen_a.cmp(seen_b))
        });
        ranked.truncate(self.max_results);
        ranked.into_iter().map(|(_, result)| result).collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
