pub mod anthropic;
pub mod dictionary;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod resolver;

pub use dictionary::NutritionDictionary;
pub use provider::{NutritionProvider, ProviderError, build_provider_chain};
pub use resolver::{NutritionResolver, Resolution, ResolutionSource};
