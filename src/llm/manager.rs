//! Priority-ordered provider selection, fallback, and per-provider retry.

use std::{collections::HashSet, sync::Arc};

use indexmap::IndexMap;

use super::{LlmError, LlmProvider, LlmResponse};
use crate::{
   config::{Priority, ProviderConfig, ProviderKind, SaigenConfig},
   context::GenerationContext,
   error::{Result, SaigenError},
   llm::{anthropic::AnthropicProvider, ollama::OllamaProvider, openai::OpenAiProvider, vllm::VllmProvider},
};

struct Entry {
   provider: Arc<dyn LlmProvider>,
   priority: Priority,
   enabled: bool,
}

pub struct ProviderManager {
   providers: IndexMap<String, Entry>,
   max_retries_per_provider: u32,
   max_providers_to_try: usize,
}

fn build_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
   let kind = config
      .kind
      .ok_or_else(|| SaigenError::ConfigurationError(format!("provider '{name}' has no kind")))?;
   let provider: Arc<dyn LlmProvider> = match kind {
      ProviderKind::Openai => Arc::new(OpenAiProvider::new(name, config.clone())?),
      ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(name, config.clone())?),
      ProviderKind::Ollama => Arc::new(OllamaProvider::new(name, config.clone())?),
      ProviderKind::Vllm => Arc::new(VllmProvider::new(name, config.clone())?),
   };
   Ok(provider)
}

impl ProviderManager {
   pub fn from_config(config: &SaigenConfig) -> Result<Self> {
      let mut providers = IndexMap::new();
      for (name, provider_config) in &config.providers {
         if !provider_config.enabled {
            continue;
         }
         match build_provider(name, provider_config) {
            Ok(provider) => {
               providers.insert(
                  name.clone(),
                  Entry { provider, priority: provider_config.priority, enabled: provider_config.enabled },
               );
            },
            Err(e) => eprintln!("Warning: skipping provider '{name}': {e}"),
         }
      }
      Ok(Self { providers, max_retries_per_provider: 3, max_providers_to_try: 3 })
   }

   /// Builds a manager directly from already-constructed providers, bypassing
   /// `ProviderKind`-based instantiation. Used by tests to wire in scripted
   /// doubles ([`crate::testing::MockLlmProvider`]) in configuration order.
   pub fn from_providers(entries: Vec<(String, Arc<dyn LlmProvider>, Priority)>) -> Self {
      let mut providers = IndexMap::new();
      for (name, provider, priority) in entries {
         providers.insert(name, Entry { provider, priority, enabled: true });
      }
      Self { providers, max_retries_per_provider: 3, max_providers_to_try: 3 }
   }

   pub fn select_best(&self, preferred: Option<&str>, exclude: &HashSet<String>) -> Option<String> {
      if let Some(preferred) = preferred {
         if !exclude.contains(preferred) {
            if let Some(entry) = self.providers.get(preferred) {
               if entry.enabled && entry.provider.is_available() {
                  return Some(preferred.to_string());
               }
            }
         }
      }

      // `IndexMap` iterates in configuration (insertion) order. `max_by_key`
      // returns the *last* of equally-maximum elements, which would let a
      // later same-priority provider win; fold manually so the first
      // provider registered at the highest priority wins ties.
      let mut best: Option<(&str, Priority)> = None;
      for (name, entry) in &self.providers {
         if exclude.contains(name) || !entry.enabled || !entry.provider.is_available() {
            continue;
         }
         if best.is_none_or(|(_, best_priority)| entry.priority > best_priority) {
            best = Some((name.as_str(), entry.priority));
         }
      }
      best.map(|(name, _)| name.to_string())
   }

   pub async fn generate_with_fallback(
      &self,
      context: &GenerationContext,
      prompt: &str,
      preferred: Option<&str>,
   ) -> Result<(LlmResponse, String)> {
      let mut excluded = HashSet::new();
      let mut last_error: Option<SaigenError> = None;
      let mut attempts = 0;

      while attempts < self.max_providers_to_try {
         let Some(name) = self.select_best(preferred, &excluded) else { break };
         attempts += 1;
         excluded.insert(name.clone());

         let entry = &self.providers[&name];
         match self.generate_with_retry(&name, entry.provider.as_ref(), context, prompt).await {
            Ok(response) => return Ok((response, name)),
            Err(e) => last_error = Some(e),
         }
      }

      Err(last_error.unwrap_or_else(|| {
         SaigenError::GenerationError("no LLM providers available".to_string())
      }))
   }

   async fn generate_with_retry(
      &self,
      name: &str,
      provider: &dyn LlmProvider,
      context: &GenerationContext,
      prompt: &str,
   ) -> Result<LlmResponse> {
      let mut retry = 0;
      loop {
         match provider.generate(context, prompt).await {
            Ok(response) => return Ok(response),
            Err(LlmError::RateLimit(msg)) => {
               if retry >= self.max_retries_per_provider {
                  return Err(SaigenError::RateLimitError { provider: name.to_string(), message: msg });
               }
               let backoff = 2u64.pow(retry);
               tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
               retry += 1;
            },
            Err(LlmError::Connection(msg)) | Err(LlmError::Generation(msg)) => {
               if retry >= self.max_retries_per_provider {
                  return Err(SaigenError::ConnectionError { provider: name.to_string(), message: msg });
               }
               tokio::time::sleep(std::time::Duration::from_secs(1)).await;
               retry += 1;
            },
            Err(LlmError::Authentication(msg)) => {
               return Err(SaigenError::AuthenticationError { provider: name.to_string(), message: msg });
            },
            Err(LlmError::Configuration(msg)) => {
               return Err(SaigenError::ConfigurationError(msg));
            },
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn select_best_prefers_higher_priority() {
      let mut config = SaigenConfig::default();
      config.providers.get_mut("openai").unwrap().api_key = Some("key".to_string());
      config.providers.get_mut("anthropic").unwrap().api_key = Some("key".to_string());
      let manager = ProviderManager::from_config(&config).unwrap();
      let chosen = manager.select_best(None, &HashSet::new());
      assert_eq!(chosen.as_deref(), Some("openai"));
   }

   #[test]
   fn select_best_breaks_ties_by_configuration_order() {
      let mut config = SaigenConfig::default();
      config.providers.get_mut("openai").unwrap().api_key = Some("key".to_string());
      config.providers.get_mut("anthropic").unwrap().api_key = Some("key".to_string());
      config.providers.get_mut("openai").unwrap().priority = Priority::Medium;
      config.providers.get_mut("anthropic").unwrap().priority = Priority::Medium;
      let manager = ProviderManager::from_config(&config).unwrap();
      let chosen = manager.select_best(None, &HashSet::new());
      // "openai" is registered first in `SaigenConfig::default()`, so it
      // must win over "anthropic" at equal priority.
      assert_eq!(chosen.as_deref(), Some("openai"));
   }
}
