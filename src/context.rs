//! Assembles LLM input context from retrieval, samples, and heuristics.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{model::RepositoryPackage, model::Saidata, rag::RagIndexer};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationContext {
   pub software_name: String,
   pub target_providers: Vec<String>,
   #[serde(default)]
   pub user_hints: BTreeMap<String, serde_json::Value>,
   #[serde(default)]
   pub existing_saidata: Option<Saidata>,
   #[serde(default)]
   pub repository_data: Vec<RepositoryPackage>,
   #[serde(default)]
   pub similar_saidata: Vec<Saidata>,
   #[serde(default)]
   pub sample_saidata: Vec<Saidata>,

   // 0.3 enhancements
   #[serde(default)]
   pub likely_installation_methods: Vec<String>,
   #[serde(default)]
   pub security_metadata_template: Option<String>,
   #[serde(default)]
   pub compatibility_matrix_template: Option<String>,
   #[serde(default)]
   pub url_templating_examples: Vec<String>,
   #[serde(default)]
   pub installation_method_examples: Vec<String>,
   #[serde(default)]
   pub provider_enhancement_examples: Vec<String>,
   #[serde(default)]
   pub software_category: Option<String>,
}

impl GenerationContext {
   pub fn new(software_name: impl Into<String>, target_providers: Vec<String>) -> Self {
      Self { software_name: software_name.into(), target_providers, ..Default::default() }
   }

   pub fn has_repository_data(&self) -> bool {
      !self.repository_data.is_empty()
   }

   pub fn has_similar_saidata(&self) -> bool {
      !self.similar_saidata.is_empty()
   }

   pub fn has_sample_saidata(&self) -> bool {
      !self.sample_saidata.is_empty()
   }

   pub fn has_user_hints(&self) -> bool {
      !self.user_hints.is_empty()
   }

   pub fn has_existing_saidata(&self) -> bool {
      self.existing_saidata.is_some()
   }

   pub fn has_validation_feedback(&self) -> bool {
      self.user_hints.contains_key("validation_feedback")
   }
}

const SOURCE_INDICATORS: &[&str] = &["lib", "kernel", "driver", "compiler", "toolchain", "gcc", "llvm"];
const BINARY_INDICATORS: &[&str] = &["cli", "tool", "agent", "exporter", "binary", "static"];
const SCRIPT_INDICATORS: &[&str] = &["installer", "setup", "bootstrap", "init"];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
   ("web_server", &["nginx", "apache", "httpd", "caddy", "web"]),
   ("database", &["postgres", "mysql", "redis", "mongo", "sqlite", "database", "db"]),
   ("container", &["docker", "podman", "container", "kubernetes", "k8s"]),
   ("programming", &["python", "node", "rust", "golang", "ruby", "java", "compiler", "runtime"]),
];

/// Builds an enriched `GenerationContext`. RAG lookups and sample directories
/// are best-effort: any failure is swallowed and logged rather than aborting
/// context assembly.
pub struct ContextBuilder {
   indexer: Option<Arc<RagIndexer>>,
   sample_dir: Option<PathBuf>,
   max_packages: usize,
   max_saidata: usize,
   min_score: f32,
}

impl ContextBuilder {
   pub fn new(
      indexer: Option<Arc<RagIndexer>>,
      sample_dir: Option<PathBuf>,
      max_packages: usize,
      max_saidata: usize,
      min_score: f32,
   ) -> Self {
      Self { indexer, sample_dir, max_packages, max_saidata, min_score }
   }

   pub async fn build(&self, mut context: GenerationContext) -> GenerationContext {
      if let Some(indexer) = &self.indexer {
         match indexer.search_similar_packages(&context.software_name, self.max_packages, self.min_score).await {
            Ok(hits) => context.repository_data = hits,
            Err(e) => eprintln!("Warning: repository search failed: {e}"),
         }

         match indexer.find_similar_saidata(&context.software_name, self.max_saidata, self.min_score).await {
            Ok(hits) => context.similar_saidata = hits,
            Err(e) => eprintln!("Warning: similar saidata search failed: {e}"),
         }
      }

      if context.similar_saidata.len() < 3 {
         let needed = 3 - context.similar_saidata.len();
         if let Some(samples) = self.load_samples(needed) {
            context.sample_saidata = samples;
         }
      }

      context.software_category = Some(self.detect_category(&context));
      context.likely_installation_methods = self.detect_installation_methods(&context);
      context.security_metadata_template =
         Some(security_template(context.software_category.as_deref().unwrap_or("web_server")));
      context.compatibility_matrix_template = Some(compatibility_template(&context.target_providers));
      context.url_templating_examples = url_templating_examples();
      context.installation_method_examples = installation_method_examples(&context.likely_installation_methods);
      context.provider_enhancement_examples = provider_enhancement_examples(&context.target_providers);

      context
   }

   fn load_samples(&self, count: usize) -> Option<Vec<Saidata>> {
      let dir = self.sample_dir.as_ref()?;
      let entries = std::fs::read_dir(dir).ok()?;
      let mut out = Vec::new();
      for entry in entries.flatten() {
         if out.len() >= count {
            break;
         }
         if let Ok(contents) = std::fs::read_to_string(entry.path()) {
            if let Ok(doc) = serde_yaml::from_str::<Saidata>(&contents) {
               out.push(doc);
            }
         }
      }
      if out.is_empty() { None } else { Some(out) }
   }

   fn detect_category(&self, context: &GenerationContext) -> String {
      let haystack = context.software_name.to_lowercase();
      for (category, keywords) in CATEGORY_KEYWORDS {
         if keywords.iter().any(|k| haystack.contains(k)) {
            return (*category).to_string();
         }
      }
      for pkg in &context.repository_data {
         if let Some(cat) = &pkg.category {
            return cat.clone();
         }
      }
      "web_server".to_string()
   }

   fn detect_installation_methods(&self, context: &GenerationContext) -> Vec<String> {
      let mut haystack = context.software_name.to_lowercase();
      for pkg in &context.repository_data {
         haystack.push(' ');
         haystack.push_str(&pkg.name.to_lowercase());
         if let Some(d) = &pkg.description {
            haystack.push(' ');
            haystack.push_str(&d.to_lowercase());
         }
      }

      let mut methods = Vec::new();
      if SOURCE_INDICATORS.iter().any(|k| haystack.contains(k)) {
         methods.push("sources".to_string());
      }
      if BINARY_INDICATORS.iter().any(|k| haystack.contains(k)) {
         methods.push("binaries".to_string());
      }
      if SCRIPT_INDICATORS.iter().any(|k| haystack.contains(k)) {
         methods.push("scripts".to_string());
      }
      if methods.is_empty() {
         methods.push("sources".to_string());
      }
      methods
   }
}

fn security_template(category: &str) -> String {
   match category {
      "database" => "security:\n  security_contact: security@example.com\n  cve_exceptions: []".to_string(),
      "container" => "security:\n  sbom_url: https://example.com/sbom.json".to_string(),
      _ => "security:\n  vulnerability_disclosure: https://example.com/security".to_string(),
   }
}

fn compatibility_template(target_providers: &[String]) -> String {
   target_providers
      .iter()
      .map(|p| format!("- provider: {p}\n  supported: true"))
      .collect::<Vec<_>>()
      .join("\n")
}

/// Example URLs showing the `{{version}}`/`{{platform}}`/`{{architecture}}`
/// placeholders accepted by `binaries[].url` and `scripts[].url`.
fn url_templating_examples() -> Vec<String> {
   vec![
      "download_url: https://example.com/releases/{{version}}/app-{{platform}}-{{architecture}}.tar.gz".to_string(),
      "binaries[].url: https://github.com/org/app/releases/download/v{{version}}/app-{{platform}}-{{architecture}}"
         .to_string(),
   ]
}

fn installation_method_examples(methods: &[String]) -> Vec<String> {
   methods
      .iter()
      .map(|m| match m.as_str() {
         "sources" => "sources: build from a release tarball with ./configure && make && make install".to_string(),
         "binaries" => {
            "binaries: download a prebuilt platform/architecture archive and extract to install_path".to_string()
         },
         "scripts" => "scripts: run the vendor's install script, pinned to a checksum".to_string(),
         other => format!("{other}: no example available"),
      })
      .collect()
}

fn provider_enhancement_examples(target_providers: &[String]) -> Vec<String> {
   target_providers
      .iter()
      .map(|p| {
         format!(
            "{p}: override package_name under providers.{p} when it differs from the canonical name, e.g. packages: [{{name: app, package_name: app-{p}}}]"
         )
      })
      .collect()
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn always_selects_at_least_one_installation_method() {
      let builder = ContextBuilder::new(None, None, 5, 3, 0.3);
      let context = GenerationContext::new("frobnicate", vec!["apt".to_string()]);
      let built = builder.build(context).await;
      assert!(!built.likely_installation_methods.is_empty());
   }

   #[tokio::test]
   async fn detects_database_category() {
      let builder = ContextBuilder::new(None, None, 5, 3, 0.3);
      let context = GenerationContext::new("postgresql", vec!["apt".to_string()]);
      let built = builder.build(context).await;
      assert_eq!(built.software_category.as_deref(), Some("database"));
   }
}
