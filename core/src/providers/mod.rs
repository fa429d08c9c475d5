pub mod factory;
pub mod openai;

pub use factory::{create_provider, provider_names};
pub use openai::OpenAIProvider;
