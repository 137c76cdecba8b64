use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalyzeRequest {
    /// Base64 image, optionally prefixed with a `data:image/...;base64,` header.
    pub image: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default = "default_advanced_mode")]
    pub advanced_mode: bool,
}

fn default_advanced_mode() -> bool {
    true
}

/// Nutrition facts per 100g of a food.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NutritionRecord {
    pub calories_per_100g: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub sodium: f64,
    #[serde(default)]
    pub vitamins: BTreeMap<String, f64>,
    #[serde(default)]
    pub minerals: BTreeMap<String, f64>,
}

impl NutritionRecord {
    /// Generic placeholder used when nothing else knows the food.
    pub fn placeholder() -> Self {
        Self {
            calories_per_100g: 200.0,
            protein: 10.0,
            carbs: 30.0,
            fat: 8.0,
            fiber: 3.0,
            sugar: 0.0,
            sodium: 0.0,
            vitamins: BTreeMap::new(),
            minerals: BTreeMap::new(),
        }
    }

    pub fn scaled(&self, portion: f64) -> NutritionalValues {
        NutritionalValues {
            calories: self.calories_per_100g * portion,
            protein: self.protein * portion,
            carbs: self.carbs * portion,
            fat: self.fat * portion,
            fiber: self.fiber * portion,
            sugar: self.sugar * portion,
            sodium: self.sodium * portion,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NutritionalValues {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FoodPrediction {
    pub food_name: String,
    pub original_prediction: String,
    pub confidence: f64,
    pub model_agreement: usize,
    pub ai_model_used: String,
    pub nutrition: NutritionRecord,
    pub estimated_portion: f64,
    pub nutritional_values: NutritionalValues,
    pub context: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalysisResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub predictions: Vec<FoodPrediction>,
    pub image_hash: String,
    pub processing_time: f64,
    pub ai_confidence: f64,
    pub image_context: String,
    pub portion_analysis: BTreeMap<String, f64>,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
