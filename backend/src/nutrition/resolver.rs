use shared::NutritionRecord;
use std::sync::Arc;

use super::dictionary::NutritionDictionary;
use super::provider::{NutritionProvider, ProviderError};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionSource {
    Dictionary,
    Provider(String),
    Default,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &str {
        match self {
            ResolutionSource::Dictionary => "dictionary",
            ResolutionSource::Provider(name) => name,
            ResolutionSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: NutritionRecord,
    pub source: ResolutionSource,
}

/// Dictionary first, then each provider in order, then a placeholder record.
///
/// Providers are tried one after another and never concurrently; the first
/// usable record wins and is written back into the dictionary.
pub struct NutritionResolver {
    dictionary: Arc<NutritionDictionary>,
    chain: Vec<Arc<dyn NutritionProvider>>,
    default_record: NutritionRecord,
}

impl NutritionResolver {
    pub fn new(dictionary: Arc<NutritionDictionary>, chain: Vec<Arc<dyn NutritionProvider>>) -> Self {
        Self {
            dictionary,
            chain,
            default_record: NutritionRecord::placeholder(),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.chain.len()
    }

    pub fn dictionary(&self) -> &NutritionDictionary {
        &self.dictionary
    }

    pub async fn resolve(&self, food_name: &str, context: &str) -> Resolution {
        if let Some(record) = self.dictionary.get(food_name) {
            return Resolution {
                record,
                source: ResolutionSource::Dictionary,
            };
        }

        for provider in &self.chain {
            match self.query(provider.as_ref(), food_name, context).await {
                Ok(record) => {
                    log::info!("{} resolved nutrition for '{}'", provider.name(), food_name);
                    self.dictionary.insert(food_name, record.clone());
                    if let Err(e) = self.dictionary.flush().await {
                        log::warn!("Failed to save nutrition cache: {}", e);
                    }
                    return Resolution {
                        record,
                        source: ResolutionSource::Provider(provider.name().to_string()),
                    };
                }
                Err(e) => {
                    log::warn!(
                        "{} nutrition prediction failed for '{}': {}",
                        provider.name(),
                        food_name,
                        e
                    );
                }
            }
        }

        log::info!("Using default nutrition for '{}'", food_name);
        Resolution {
            record: self.default_record.clone(),
            source: ResolutionSource::Default,
        }
    }

    async fn query(
        &self,
        provider: &dyn NutritionProvider,
        food_name: &str,
        context: &str,
    ) -> Result<NutritionRecord, ProviderError> {
        let timeout = provider.timeout();
        match tokio::time::timeout(timeout, provider.resolve(food_name, context)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Behaviour {
        Hang,
        Garbage,
        Answer(NutritionRecord),
    }

    struct ScriptedProvider {
        name: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn chain(providers: &[&Arc<ScriptedProvider>]) -> Vec<Arc<dyn NutritionProvider>> {
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn NutritionProvider>)
            .collect()
    }

    #[async_trait]
    impl NutritionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(30)
        }

        async fn resolve(&self, _food: &str, _context: &str) -> Result<NutritionRecord, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Err(ProviderError::Network("unreachable".into()))
                }
                Behaviour::Garbage => Err(ProviderError::Parse("not json".into())),
                Behaviour::Answer(record) => Ok(record.clone()),
            }
        }
    }

    fn kimchi() -> NutritionRecord {
        NutritionRecord {
            calories_per_100g: 15.0,
            protein: 1.1,
            carbs: 2.4,
            fat: 0.5,
            fiber: 1.6,
            sugar: 1.1,
            sodium: 498.0,
            ..NutritionRecord::placeholder()
        }
    }

    #[tokio::test]
    async fn falls_through_to_first_working_provider_and_caches() {
        let dictionary = Arc::new(NutritionDictionary::in_memory());
        let a = ScriptedProvider::new("a", Behaviour::Hang);
        let b = ScriptedProvider::new("b", Behaviour::Answer(kimchi()));
        let c = ScriptedProvider::new("c", Behaviour::Answer(NutritionRecord::placeholder()));
        let resolver = NutritionResolver::new(dictionary.clone(), chain(&[&a, &b, &c]));

        let first = resolver.resolve("kimchi", "Food image").await;
        assert_eq!(first.record, kimchi());
        assert_eq!(first.source, ResolutionSource::Provider("b".into()));
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));

        // Every provider unreachable now; the dictionary answers.
        let offline = NutritionResolver::new(
            dictionary,
            chain(&[
                &ScriptedProvider::new("a", Behaviour::Hang),
                &ScriptedProvider::new("b", Behaviour::Hang),
            ]),
        );
        let second = offline.resolve("Kimchi", "Food image").await;
        assert_eq!(second.record, kimchi());
        assert_eq!(second.source, ResolutionSource::Dictionary);
    }

    #[tokio::test]
    async fn all_providers_failing_yields_default() {
        let resolver = NutritionResolver::new(
            Arc::new(NutritionDictionary::in_memory()),
            chain(&[
                &ScriptedProvider::new("a", Behaviour::Garbage),
                &ScriptedProvider::new("b", Behaviour::Hang),
            ]),
        );
        let resolution = resolver.resolve("mystery stew", "").await;
        assert_eq!(resolution.record, NutritionRecord::placeholder());
        assert_eq!(resolution.source, ResolutionSource::Default);
        assert!(resolver.dictionary().get("mystery stew").is_none());
    }

    #[tokio::test]
    async fn empty_chain_yields_default() {
        let resolver = NutritionResolver::new(Arc::new(NutritionDictionary::in_memory()), Vec::new());
        assert_eq!(
            resolver.resolve("anything", "").await.source,
            ResolutionSource::Default
        );
    }

    #[tokio::test]
    async fn dictionary_hit_skips_providers() {
        let dictionary = Arc::new(NutritionDictionary::in_memory());
        dictionary.insert("pizza", kimchi());
        let provider = ScriptedProvider::new("a", Behaviour::Answer(NutritionRecord::placeholder()));
        let resolver = NutritionResolver::new(dictionary, chain(&[&provider]));

        let resolution = resolver.resolve("PIZZA", "").await;
        assert_eq!(resolution.source, ResolutionSource::Dictionary);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn learned_records_are_flushed_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("nutrition_cache.json");
        let dictionary = Arc::new(NutritionDictionary::new(
            Default::default(),
            Some(cache_path.clone()),
        ));
        let resolver = NutritionResolver::new(
            dictionary,
            chain(&[&ScriptedProvider::new("a", Behaviour::Answer(kimchi()))]),
        );
        resolver.resolve("kimchi", "").await;

        let reloaded = NutritionDictionary::load(&dir.path().join("none.json"), &cache_path);
        assert_eq!(reloaded.get("kimchi"), Some(kimchi()));
    }
}
