pub mod claude;
pub mod error;
pub mod openrouter;
pub mod provider;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use openrouter::OpenRouter;
pub use provider::{ChatProvider, ProviderChain};
pub use util::{extract_json_array, strip_code_blocks};
