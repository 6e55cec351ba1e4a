//! End-to-end generation/update scenarios driven through scripted LLM
//! providers, with no network access and no real provider credentials.

use std::sync::Arc;

use saigen::{
   config::Priority,
   context::ContextBuilder,
   llm::{LlmError, manager::ProviderManager},
   merge::MergeStrategy,
   orchestrator::{GenerationRequest, Orchestrator},
   testing::{MockLlmProvider, ScriptedResponse},
};

const VALID_YAML: &str = r#"
version: "0.3"
metadata:
  name: nginx
  description: A web server
"#;

const INVALID_YAML: &str = "not: [valid, yaml structure\n  broken";

fn orchestrator_with(providers: Vec<(String, Arc<dyn saigen::llm::LlmProvider>, Priority)>) -> Arc<Orchestrator> {
   let manager = ProviderManager::from_providers(providers);
   let context_builder = ContextBuilder::new(None, None, 0, 0, 0.0);
   Arc::new(Orchestrator::new(manager, context_builder, None, 1))
}

#[tokio::test]
async fn happy_path_generates_valid_saidata() {
   let provider: Arc<dyn saigen::llm::LlmProvider> =
      Arc::new(MockLlmProvider::new("mock", vec![ScriptedResponse::Ok(VALID_YAML.to_string())]));
   let orchestrator = orchestrator_with(vec![("mock".to_string(), provider, Priority::High)]);

   let request = GenerationRequest::new("nginx", vec!["apt".to_string()]);
   let result = orchestrator.generate(request, None).await;

   assert!(result.success, "expected success, got errors: {:?}", result.validation_errors);
   let doc = result.saidata.expect("success implies saidata");
   assert_eq!(doc.metadata.name, "nginx");
   assert_eq!(result.llm_provider_used.as_deref(), Some("mock"));
}

#[tokio::test]
async fn retries_once_on_invalid_yaml_then_succeeds() {
   let provider: Arc<dyn saigen::llm::LlmProvider> = Arc::new(MockLlmProvider::new(
      "mock",
      vec![ScriptedResponse::Ok(INVALID_YAML.to_string()), ScriptedResponse::Ok(VALID_YAML.to_string())],
   ));
   let orchestrator = orchestrator_with(vec![("mock".to_string(), provider, Priority::High)]);

   let request = GenerationRequest::new("nginx", vec!["apt".to_string()]);
   let result = orchestrator.generate(request, None).await;

   assert!(result.success, "expected recovery on retry, got errors: {:?}", result.validation_errors);
   assert_eq!(result.saidata.expect("success implies saidata").metadata.name, "nginx");
}

#[tokio::test]
async fn gives_up_after_exhausting_the_single_retry() {
   let provider: Arc<dyn saigen::llm::LlmProvider> = Arc::new(MockLlmProvider::new(
      "mock",
      vec![ScriptedResponse::Ok(INVALID_YAML.to_string()), ScriptedResponse::Ok(INVALID_YAML.to_string())],
   ));
   let orchestrator = orchestrator_with(vec![("mock".to_string(), provider, Priority::High)]);

   let request = GenerationRequest::new("nginx", vec!["apt".to_string()]);
   let result = orchestrator.generate(request, None).await;

   assert!(!result.success);
   assert!(!result.validation_errors.is_empty());
}

#[tokio::test]
async fn falls_back_to_the_next_provider_when_the_first_rejects_the_request() {
   let primary: Arc<dyn saigen::llm::LlmProvider> =
      Arc::new(MockLlmProvider::new("primary", vec![ScriptedResponse::Err(LlmError::Authentication("denied".to_string()))]));
   let fallback: Arc<dyn saigen::llm::LlmProvider> =
      Arc::new(MockLlmProvider::new("fallback", vec![ScriptedResponse::Ok(VALID_YAML.to_string())]));
   let orchestrator = orchestrator_with(vec![
      ("primary".to_string(), primary, Priority::High),
      ("fallback".to_string(), fallback, Priority::Low),
   ]);

   let request = GenerationRequest::new("nginx", vec!["apt".to_string()]);
   let result = orchestrator.generate(request, None).await;

   assert!(result.success, "expected fallback to succeed, got errors: {:?}", result.validation_errors);
   assert_eq!(result.llm_provider_used.as_deref(), Some("fallback"));
}

#[tokio::test]
async fn batch_run_reports_partial_failure_without_aborting() {
   let provider: Arc<dyn saigen::llm::LlmProvider> = Arc::new(MockLlmProvider::new(
      "mock",
      vec![
         ScriptedResponse::Ok(VALID_YAML.to_string()),
         ScriptedResponse::Err(LlmError::Authentication("denied".to_string())),
         ScriptedResponse::Ok(VALID_YAML.to_string()),
      ],
   ));
   let orchestrator = orchestrator_with(vec![("mock".to_string(), provider, Priority::High)]);

   let request = saigen::batch::BatchRequest {
      software_list: vec!["nginx".to_string(), "redis".to_string(), "postgres".to_string()],
      target_providers: vec!["apt".to_string()],
      preferred_provider: None,
      output_directory: None,
      max_concurrent: 1,
      continue_on_error: true,
      force: true,
      log_dir: None,
   };

   let result = saigen::batch::run(orchestrator, request, None).await.expect("batch run should not error");

   // Regardless of which of the three software names lands on which scripted
   // response, exactly one of three must fail and two must succeed: the
   // mock's script is consumed in order under a shared lock no matter how
   // the batch tasks interleave.
   assert_eq!(result.total_requested, 3);
   assert_eq!(result.successful, 2);
   assert_eq!(result.failed, 1);
   assert_eq!(result.failed_software.len(), 1);
}

#[tokio::test]
async fn update_deduplicates_provider_overrides_identical_to_the_root_package() {
   let fresh_yaml = r#"
version: "0.3"
metadata:
  name: nginx
packages:
  - name: nginx
    package_name: nginx
providers:
  apt:
    packages:
      - name: nginx
        package_name: nginx
"#;
   let provider: Arc<dyn saigen::llm::LlmProvider> =
      Arc::new(MockLlmProvider::new("mock", vec![ScriptedResponse::Ok(fresh_yaml.to_string())]));
   let orchestrator = orchestrator_with(vec![("mock".to_string(), provider, Priority::High)]);

   let request = GenerationRequest::new("nginx", vec!["apt".to_string()]);
   let result = orchestrator.generate(request, None).await;

   assert!(result.success, "expected success, got errors: {:?}", result.validation_errors);
   let doc = result.saidata.expect("success implies saidata");
   // `apt`'s package override is identical to the root default, so
   // deduplication should have dropped it entirely.
   assert!(doc.providers.get("apt").is_none_or(|apt| apt.resources.packages.is_none()));
}

#[tokio::test]
async fn update_merges_fresh_generation_with_existing_document() {
   let mut existing = saigen::Saidata::new("nginx");
   existing.metadata.description = Some("hand-written description".to_string());

   let provider: Arc<dyn saigen::llm::LlmProvider> =
      Arc::new(MockLlmProvider::new("mock", vec![ScriptedResponse::Ok(VALID_YAML.to_string())]));
   let orchestrator = orchestrator_with(vec![("mock".to_string(), provider, Priority::High)]);

   let update_result =
      orchestrator.update(existing, vec!["apt".to_string()], MergeStrategy::Preserve, false, None).await;

   assert!(update_result.success);
   let merged = update_result.saidata.expect("success implies saidata");
   // `preserve` never overwrites an existing leaf, even with a freshly
   // generated description available.
   assert_eq!(merged.metadata.description.as_deref(), Some("hand-written description"));
}
