//! Interactive exchange: prompt handling and streaming entropy.

pub mod driver;
pub mod entropy;
pub mod prompt;

pub use driver::{Exchange, expect_kind, failure_error};
pub use entropy::{EntropySource, collect_entropy, stream_entropy};
pub use prompt::{PromptError, PromptProvider, ScriptedPrompts};
