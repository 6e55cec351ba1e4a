//! Drives context building, prompt rendering, LLM generation, validation,
//! url filtering, and deduplication for a single request.

use std::{sync::Arc, time::Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
   context::{ContextBuilder, GenerationContext},
   dedup,
   error::Result,
   gen_log::GenerationLogger,
   llm::manager::ProviderManager,
   merge,
   model::Saidata,
   schema,
   templates,
   url_filter::UrlFilter,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
   pub software_name: String,
   pub target_providers: Vec<String>,
   pub preferred_provider: Option<String>,
   #[serde(default)]
   pub existing_saidata: Option<Saidata>,
   #[serde(default)]
   pub user_hints: std::collections::BTreeMap<String, serde_json::Value>,
   /// `true` when this request originates from the update engine, which
   /// renders the `update` prompt template instead of `generation`.
   #[serde(default)]
   pub update_mode: bool,
}

impl GenerationRequest {
   pub fn new(software_name: impl Into<String>, target_providers: Vec<String>) -> Self {
      Self {
         software_name: software_name.into(),
         target_providers,
         preferred_provider: None,
         existing_saidata: None,
         user_hints: std::collections::BTreeMap::new(),
         update_mode: false,
      }
   }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationResult {
   pub success: bool,
   pub saidata: Option<Saidata>,
   pub validation_errors: Vec<String>,
   pub warnings: Vec<String>,
   pub generation_time_secs: f64,
   pub llm_provider_used: Option<String>,
   pub repository_sources_used: Vec<String>,
   pub tokens_used: Option<u32>,
   pub cost_estimate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateResult {
   pub success: bool,
   pub saidata: Option<Saidata>,
   pub stats: Option<merge::MergeStats>,
   pub validation_errors: Vec<String>,
   pub generation_time_secs: f64,
}

#[derive(Default)]
struct Metrics {
   generations: u64,
   total_tokens: u64,
   total_cost: f64,
}

pub struct Orchestrator {
   provider_manager: ProviderManager,
   context_builder: ContextBuilder,
   url_filter: Option<UrlFilter>,
   max_retries: u32,
   metrics: Mutex<Metrics>,
}

impl Orchestrator {
   pub fn new(
      provider_manager: ProviderManager,
      context_builder: ContextBuilder,
      url_filter: Option<UrlFilter>,
      max_retries: u32,
   ) -> Self {
      Self { provider_manager, context_builder, url_filter, max_retries, metrics: Mutex::new(Metrics::default()) }
   }

   fn validate_request(&self, request: &GenerationRequest) -> Result<()> {
      if request.software_name.trim().is_empty() {
         return Err(crate::error::SaigenError::GenerationError("software_name must not be empty".to_string()));
      }
      if request.target_providers.is_empty() {
         return Err(crate::error::SaigenError::GenerationError("target_providers must not be empty".to_string()));
      }
      Ok(())
   }

   pub async fn generate(
      self: &Arc<Self>,
      request: GenerationRequest,
      mut logger: Option<&mut GenerationLogger>,
   ) -> GenerationResult {
      let start = Instant::now();
      if let Err(e) = self.validate_request(&request) {
         return GenerationResult {
            success: false,
            validation_errors: vec![e.to_string()],
            generation_time_secs: start.elapsed().as_secs_f64(),
            ..Default::default()
         };
      }

      let mut context = GenerationContext::new(request.software_name.clone(), request.target_providers.clone());
      context.user_hints = request.user_hints.clone();
      context.existing_saidata = request.existing_saidata.clone();
      let context_start = Instant::now();
      context = self.context_builder.build(context).await;
      if let Some(logger) = logger.as_deref_mut() {
         logger.set_context_summary(&context);
         logger.record_step("build_context", crate::gen_log::StepStatus::Completed, context_start.elapsed().as_secs_f64());
      }

      let repository_sources_used: Vec<String> =
         context.repository_data.iter().map(|p| p.repository_name.clone()).collect();

      let mut is_retry = false;
      let mut last_errors: Vec<String> = Vec::new();
      let mut attempts_done = 0u32;

      loop {
         attempts_done += 1;
         let prompt = if request.update_mode {
            templates::render_update_prompt(&context)
         } else if is_retry {
            templates::render_retry_prompt(&context)
         } else {
            templates::render_generation_prompt(&context)
         };

         let prompt = match prompt {
            Ok(p) => p,
            Err(e) => {
               return GenerationResult {
                  success: false,
                  validation_errors: vec![e.to_string()],
                  generation_time_secs: start.elapsed().as_secs_f64(),
                  repository_sources_used,
                  ..Default::default()
               };
            },
         };

         let llm_start = Instant::now();
         let llm_result = self
            .provider_manager
            .generate_with_fallback(&context, &prompt, request.preferred_provider.as_deref())
            .await;

         let (response, provider_used) = match llm_result {
            Ok(pair) => pair,
            Err(e) => {
               if let Some(logger) = logger.as_deref_mut() {
                  logger.record_llm_interaction(crate::gen_log::LlmInteraction {
                     provider: request.preferred_provider.clone().unwrap_or_default(),
                     model: String::new(),
                     prompt,
                     response: String::new(),
                     tokens_used: None,
                     cost_estimate: None,
                     duration_secs: llm_start.elapsed().as_secs_f64(),
                     success: false,
                     error: Some(e.to_string()),
                     retry_attempt: is_retry,
                  });
               }
               return GenerationResult {
                  success: false,
                  validation_errors: vec![e.to_string()],
                  generation_time_secs: start.elapsed().as_secs_f64(),
                  repository_sources_used,
                  ..Default::default()
               };
            },
         };

         if let Some(logger) = logger.as_deref_mut() {
            logger.record_llm_interaction(crate::gen_log::LlmInteraction {
               provider: provider_used.clone(),
               model: response.model_used.clone(),
               prompt,
               response: response.content.clone(),
               tokens_used: response.tokens_used,
               cost_estimate: response.cost_estimate,
               duration_secs: llm_start.elapsed().as_secs_f64(),
               success: true,
               error: None,
               retry_attempt: is_retry,
            });
         }

         let cleaned = strip_code_fences(&response.content);
         let (validation, parsed) = match schema::validate_yaml(&cleaned) {
            Ok(pair) => pair,
            Err(e) => {
               let issue = crate::schema::ValidationIssue {
                  path: "/".to_string(),
                  message: e.to_string(),
                  severity: crate::schema::Severity::Error,
                  code: "parse_failed".to_string(),
                  suggestion: None,
               };
               (crate::schema::ValidationResult { issues: vec![issue] }, None)
            },
         };

         if validation.is_valid() {
            if let Some(doc) = parsed {
               let doc = if let Some(filter) = &self.url_filter { filter.filter(doc).await } else { doc };
               let doc = dedup::deduplicate(doc);

               let mut metrics = self.metrics.lock();
               metrics.generations += 1;
               if let Some(tokens) = response.tokens_used {
                  metrics.total_tokens += u64::from(tokens);
               }
               if let Some(cost) = response.cost_estimate {
                  metrics.total_cost += cost;
               }
               drop(metrics);

               let result = GenerationResult {
                  success: true,
                  saidata: Some(doc),
                  validation_errors: vec![],
                  warnings: validation.warnings().map(|w| w.message.clone()).collect(),
                  generation_time_secs: start.elapsed().as_secs_f64(),
                  llm_provider_used: Some(provider_used),
                  repository_sources_used,
                  tokens_used: response.tokens_used,
                  cost_estimate: response.cost_estimate,
               };
               if let Some(logger) = logger.as_deref_mut() {
                  let _ = logger.finish(String::new(), serde_json::json!({"success": true}), vec![]);
               }
               return result;
            }
         }

         last_errors = validation.error_messages();
         if is_retry || attempts_done > self.max_retries {
            let result = GenerationResult {
               success: false,
               validation_errors: last_errors.clone(),
               generation_time_secs: start.elapsed().as_secs_f64(),
               llm_provider_used: Some(provider_used),
               repository_sources_used,
               tokens_used: response.tokens_used,
               cost_estimate: response.cost_estimate,
               ..Default::default()
            };
            if let Some(logger) = logger.as_deref_mut() {
               let _ = logger.finish(String::new(), serde_json::json!({"success": false}), last_errors);
            }
            return result;
         }

         let excerpt: String = cleaned.chars().take(500).collect();
         context.user_hints.insert(
            "validation_feedback".to_string(),
            serde_json::json!({
               "validation_error": last_errors.join("; "),
               "specific_errors": last_errors,
               "failed_yaml_excerpt": excerpt,
               "retry_instructions": ["Return corrected YAML only"],
            }),
         );
         is_retry = true;
      }
   }

   /// Regenerates saidata for an existing document and three-way merges the
   /// result per `strategy`. In interactive mode, genuine conflicts are
   /// resolved by prompting the operator on the terminal.
   pub async fn update(
      self: &Arc<Self>,
      existing: Saidata,
      target_providers: Vec<String>,
      strategy: merge::MergeStrategy,
      interactive: bool,
      logger: Option<&mut GenerationLogger>,
   ) -> UpdateResult {
      let start = Instant::now();
      let mut request = GenerationRequest::new(existing.metadata.name.clone(), target_providers);
      request.existing_saidata = Some(existing.clone());
      request.update_mode = true;

      let result = self.generate(request, logger).await;
      let Some(fresh) = result.saidata else {
         return UpdateResult {
            success: false,
            saidata: None,
            stats: None,
            validation_errors: result.validation_errors,
            generation_time_secs: start.elapsed().as_secs_f64(),
         };
      };

      let terminal_confirm = merge::TerminalConfirm;
      let prompt: Option<&dyn merge::ConflictPrompt> = if interactive { Some(&terminal_confirm) } else { None };
      let (merged, stats) = merge::merge(existing, &fresh, strategy, prompt);

      UpdateResult {
         success: true,
         saidata: Some(merged),
         stats: Some(stats),
         validation_errors: vec![],
         generation_time_secs: start.elapsed().as_secs_f64(),
      }
   }
}

fn strip_code_fences(content: &str) -> String {
   let trimmed = content.trim();
   if let Some(rest) = trimmed.strip_prefix("```") {
      let rest = rest.strip_prefix("yaml").unwrap_or(rest).trim_start_matches('\n');
      if let Some(end) = rest.rfind("```") {
         return rest[..end].trim().to_string();
      }
      return rest.trim().to_string();
   }
   trimmed.to_string()
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn strips_fenced_yaml() {
      let fenced = "```yaml\nversion: \"0.3\"\n```";
      assert_eq!(strip_code_fences(fenced), "version: \"0.3\"");
   }
}
