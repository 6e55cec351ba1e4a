use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Result, SaigenError};

/// Relative ordering used when the provider manager breaks ties between
/// providers that are otherwise equally eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
   Low,
   Medium,
   High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
   Openai,
   Anthropic,
   Ollama,
   Vllm,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
   pub kind:        Option<ProviderKind>,
   pub api_key:     Option<String>,
   pub api_base:    Option<String>,
   pub model:       String,
   pub max_tokens:  u32,
   pub temperature: f32,
   pub timeout_secs: u64,
   pub max_retries: u32,
   pub priority:    Priority,
   pub enabled:     bool,
}

impl Default for ProviderConfig {
   fn default() -> Self {
      Self {
         kind:         None,
         api_key:      None,
         api_base:     None,
         model:        String::new(),
         max_tokens:   4096,
         temperature:  0.1,
         timeout_secs: 120,
         max_retries:  3,
         priority:     Priority::Medium,
         enabled:      true,
      }
   }
}

impl Default for Priority {
   fn default() -> Self {
      Self::Medium
   }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSettings {
   pub enabled:            bool,
   pub index_dir:          PathBuf,
   pub sample_saidata_dir:  Option<PathBuf>,
   pub embedding_batch_size: usize,
   pub max_context_packages: usize,
   pub max_context_saidata:  usize,
   pub min_similarity_score: f32,
}

impl Default for RagSettings {
   fn default() -> Self {
      Self {
         enabled:              true,
         index_dir:            PathBuf::from(".saigen/rag-index"),
         sample_saidata_dir:   None,
         embedding_batch_size: 100,
         max_context_packages: 5,
         max_context_saidata:  3,
         min_similarity_score: 0.3,
      }
   }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlFilterSettings {
   pub enabled:          bool,
   pub timeout_secs:     u64,
   pub max_concurrent:   usize,
}

impl Default for UrlFilterSettings {
   fn default() -> Self {
      Self { enabled: true, timeout_secs: 5, max_concurrent: 10 }
   }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
   pub max_concurrent:    usize,
   pub continue_on_error: bool,
}

impl Default for BatchSettings {
   fn default() -> Self {
      Self { max_concurrent: 5, continue_on_error: true }
   }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SaigenConfig {
   /// Providers in configuration order; order is preserved for tie-breaking
   /// during provider selection (see `llm::manager`).
   pub providers: IndexMap<String, ProviderConfig>,

   pub default_provider: Option<String>,

   pub output_dir: PathBuf,

   pub log_dir: PathBuf,

   pub rag: RagSettings,

   pub url_filter: UrlFilterSettings,

   pub batch: BatchSettings,

   pub max_generation_retries: u32,
}

impl Default for SaigenConfig {
   fn default() -> Self {
      let mut providers = IndexMap::new();
      providers.insert(
         "openai".to_string(),
         ProviderConfig {
            kind: Some(ProviderKind::Openai),
            model: "gpt-4o-mini".to_string(),
            priority: Priority::High,
            ..ProviderConfig::default()
         },
      );
      providers.insert(
         "anthropic".to_string(),
         ProviderConfig {
            kind: Some(ProviderKind::Anthropic),
            model: "claude-haiku-4-5".to_string(),
            priority: Priority::Medium,
            ..ProviderConfig::default()
         },
      );
      providers.insert(
         "ollama".to_string(),
         ProviderConfig {
            kind: Some(ProviderKind::Ollama),
            api_base: Some("http://localhost:11434".to_string()),
            model: "llama3".to_string(),
            priority: Priority::Low,
            ..ProviderConfig::default()
         },
      );

      Self {
         providers,
         default_provider: None,
         output_dir: PathBuf::from("saidata"),
         log_dir: PathBuf::from(".saigen/logs"),
         rag: RagSettings::default(),
         url_filter: UrlFilterSettings::default(),
         batch: BatchSettings::default(),
         max_generation_retries: 1,
      }
   }
}

impl SaigenConfig {
   /// Load config, honoring `SAIGEN_CONFIG` for a custom file path.
   /// Falls back to `Default` if no config file is found.
   ///
   /// Environment overrides applied after file load:
   /// - `SAIGEN_<PROVIDER>_API_KEY` overrides that provider's `api_key`
   pub fn load() -> Result<Self> {
      let _ = dotenvy::dotenv();

      let config_path = if let Ok(custom_path) = std::env::var("SAIGEN_CONFIG") {
         PathBuf::from(custom_path)
      } else {
         Self::default_config_path().unwrap_or_default()
      };

      let mut config = if config_path.exists() {
         Self::from_file(&config_path)?
      } else {
         Self::default()
      };

      Self::apply_env_overrides(&mut config);
      Ok(config)
   }

   pub fn from_file(path: &Path) -> Result<Self> {
      let contents = std::fs::read_to_string(path)
         .map_err(|e| SaigenError::ConfigurationError(format!("failed to read config: {e}")))?;
      let mut config: Self = toml::from_str(&contents)
         .map_err(|e| SaigenError::ConfigurationError(format!("failed to parse config: {e}")))?;
      Self::apply_env_overrides(&mut config);
      Ok(config)
   }

   fn apply_env_overrides(config: &mut Self) {
      for (name, provider) in &mut config.providers {
         let env_key = format!("SAIGEN_{}_API_KEY", name.to_uppercase());
         if let Ok(key) = std::env::var(env_key) {
            provider.api_key = Some(key);
         }
      }
   }

   pub fn default_config_path() -> Result<PathBuf> {
      if let Ok(home) = std::env::var("HOME") {
         return Ok(PathBuf::from(home).join(".config/saigen/config.toml"));
      }
      if let Ok(home) = std::env::var("USERPROFILE") {
         return Ok(PathBuf::from(home).join(".config/saigen/config.toml"));
      }
      Err(SaigenError::ConfigurationError(
         "no home directory found (tried HOME and USERPROFILE)".to_string(),
      ))
   }
}
