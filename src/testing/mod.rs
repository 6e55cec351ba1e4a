//! Test doubles for exercising the generation pipeline without a live LLM
//! endpoint.

pub mod mock_provider;

pub use mock_provider::{MockLlmProvider, ScriptedResponse};
