use serde::{Deserialize, Deserializer};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub classifiers: Vec<ClassifierConfig>,
    /// Backend used alone when the ensemble produces nothing.
    pub primary_classifier: String,
    #[serde(deserialize_with = "deserialize_synonyms")]
    pub label_synonyms: Vec<(String, String)>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub portion: PortionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: ClassifierKind,
    pub reliability: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierKind {
    Remote {
        endpoint: String,
    },
    Torchscript {
        model_path: PathBuf,
        labels_path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Gemini,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    pub max_results: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self { max_results: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortionConfig {
    /// Pixels brighter than this intensity count as foreground.
    #[serde(default)]
    pub foreground_threshold: u8,
}

fn default_top_k() -> usize {
    3
}

fn default_classifier_timeout_ms() -> u64 {
    5_000
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

// YAML mappings keep their order, which the first-match lookup depends on.
fn deserialize_synonyms<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    mapping
        .into_iter()
        .map(|(key, value)| match (key.as_str(), value.as_str()) {
            (Some(raw), Some(canonical)) => Ok((raw.to_string(), canonical.to_string())),
            _ => Err(serde::de::Error::custom(format!(
                "label synonym entries must be strings: {:?} -> {:?}",
                key, value
            ))),
        })
        .collect()
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.classifiers.is_empty() {
            return Err(ConfigError::Invalid("no classifiers configured".into()));
        }
        for (i, classifier) in self.classifiers.iter().enumerate() {
            if self.classifiers[..i].iter().any(|c| c.id == classifier.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate classifier id '{}'",
                    classifier.id
                )));
            }
            if !(classifier.reliability > 0.0 && classifier.reliability <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "classifier '{}' reliability must be in (0, 1], got {}",
                    classifier.id, classifier.reliability
                )));
            }
            if classifier.top_k == 0 {
                return Err(ConfigError::Invalid(format!(
                    "classifier '{}' top_k must be positive",
                    classifier.id
                )));
            }
        }
        if !self
            .classifiers
            .iter()
            .any(|c| c.id == self.primary_classifier)
        {
            return Err(ConfigError::Invalid(format!(
                "primary classifier '{}' is not configured",
                self.primary_classifier
            )));
        }
        if self.ensemble.max_results == 0 {
            return Err(ConfigError::Invalid("ensemble.max_results must be positive".into()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.ttl_hours)
    }
}

#[derive(Debug, Clone)]
pub enum CacheBackend {
    File { dir: PathBuf },
    DynamoDb { table: String },
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            openai: configured_key("OPENAI_API_KEY"),
            anthropic: configured_key("ANTHROPIC_API_KEY"),
            gemini: configured_key("GEMINI_API_KEY"),
        }
    }

    pub fn get(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::Openai => self.openai.as_deref(),
            ProviderKind::Anthropic => self.anthropic.as_deref(),
            ProviderKind::Gemini => self.gemini.as_deref(),
        }
    }
}

fn configured_key(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .filter(|key| is_configured(key))
}

/// Template `.env` files ship values like `your-openai-api-key`.
fn is_configured(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && !key.starts_with("your-") && !key.starts_with("your_")
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: String,
    pub pipeline: PipelineConfig,
    pub nutrition_data_path: PathBuf,
    pub nutrition_cache_path: PathBuf,
    pub cache_backend: CacheBackend,
    pub api_keys: ApiKeys,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = project_root();
        let config_path = env::var("FOODVISION_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("config/foodvision.yaml"));
        log::info!("Loading pipeline config from {}", config_path.display());
        let pipeline = PipelineConfig::load(&config_path)?;

        let cache_backend = match env::var("CACHE_BACKEND").as_deref() {
            Ok("dynamodb") => CacheBackend::DynamoDb {
                table: env::var("DYNAMODB_CACHE_TABLE").map_err(|_| {
                    ConfigError::Invalid(
                        "CACHE_BACKEND=dynamodb requires DYNAMODB_CACHE_TABLE".into(),
                    )
                })?,
            },
            Ok("file") | Err(_) => CacheBackend::File {
                dir: env::var("CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| root.join("cache/predictions")),
            },
            Ok(other) => {
                return Err(ConfigError::Invalid(format!(
                    "unknown CACHE_BACKEND '{}'",
                    other
                )));
            }
        };

        Ok(Self {
            port: env::var("PORT").unwrap_or_else(|_| "8081".to_string()),
            pipeline,
            nutrition_data_path: env::var("NUTRITION_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| root.join("data/nutrition_data.json")),
            nutrition_cache_path: env::var("NUTRITION_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| root.join("cache/nutrition_cache.json")),
            cache_backend,
            api_keys: ApiKeys::from_env(),
        })
    }
}

fn project_root() -> PathBuf {
    match env::var("CARGO_MANIFEST_DIR") {
        Ok(manifest_dir) => Path::new(&manifest_dir).join(".."),
        Err(_) => PathBuf::from("."),
    }
}

#[cfg(test)]
pub(crate) fn shipped_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/foodvision.yaml")
}
