//! Structured per-run generation log: one JSON document plus a companion
//! human-readable `.log` file, written incrementally as the run progresses.

use std::{
   io::Write,
   path::{Path, PathBuf},
};

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
   Started,
   Completed,
   Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStep {
   pub name: String,
   pub status: StepStatus,
   pub duration_secs: f64,
   #[serde(default)]
   pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmInteraction {
   pub provider: String,
   pub model: String,
   pub prompt: String,
   pub response: String,
   pub tokens_used: Option<u32>,
   pub cost_estimate: Option<f64>,
   pub duration_secs: f64,
   pub success: bool,
   #[serde(default)]
   pub error: Option<String>,
   #[serde(default)]
   pub retry_attempt: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataOperation {
   pub name: String,
   pub success: bool,
   #[serde(default)]
   pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerationLog {
   pub session_id: Uuid,
   pub software_name: String,
   pub started_at: String,
   pub ended_at: Option<String>,
   pub request_summary: serde_json::Value,
   pub context_summary: serde_json::Value,
   pub steps: Vec<ProcessStep>,
   pub llm_interactions: Vec<LlmInteraction>,
   pub data_operations: Vec<DataOperation>,
   pub result_summary: Option<serde_json::Value>,
   pub errors: Vec<String>,
   pub warnings: Vec<String>,
}

pub struct GenerationLogger {
   log: GenerationLog,
   json_path: PathBuf,
   text_path: PathBuf,
}

impl GenerationLogger {
   pub fn new(log_dir: &Path, software_name: &str, started_at: impl Into<String>) -> Result<Self> {
      std::fs::create_dir_all(log_dir)?;
      let session_id = Uuid::new_v4();
      let json_path = log_dir.join(format!("{session_id}.json"));
      let text_path = log_dir.join(format!("{session_id}.log"));

      let log = GenerationLog {
         session_id,
         software_name: software_name.to_string(),
         started_at: started_at.into(),
         ended_at: None,
         request_summary: serde_json::Value::Null,
         context_summary: serde_json::Value::Null,
         steps: Vec::new(),
         llm_interactions: Vec::new(),
         data_operations: Vec::new(),
         result_summary: None,
         errors: Vec::new(),
         warnings: Vec::new(),
      };

      let mut logger = Self { log, json_path, text_path };
      logger.write_text_line(&format!("=== generation session {session_id} for {software_name} ==="));
      logger.flush()?;
      Ok(logger)
   }

   pub fn set_request_summary(&mut self, summary: serde_json::Value) {
      self.log.request_summary = summary;
   }

   /// Projects a context down to counts and small summaries; raw embeddings
   /// and full document bodies never land in the log.
   pub fn set_context_summary(&mut self, context: &crate::context::GenerationContext) {
      self.log.context_summary = serde_json::json!({
         "repository_data_count": context.repository_data.len(),
         "similar_saidata_count": context.similar_saidata.len(),
         "sample_saidata_count": context.sample_saidata.len(),
         "software_category": context.software_category,
         "likely_installation_methods": context.likely_installation_methods,
      });
   }

   pub fn record_step(&mut self, name: &str, status: StepStatus, duration_secs: f64) {
      self.write_text_line(&format!("[{name}] {status:?} ({duration_secs:.2}s)"));
      self.log.steps.push(ProcessStep { name: name.to_string(), status, duration_secs, metadata: serde_json::Value::Null });
      let _ = self.flush();
   }

   pub fn record_llm_interaction(&mut self, interaction: LlmInteraction) {
      self.write_text_line(&format!(
         "[llm] provider={} model={} success={} retry={} tokens={:?}",
         interaction.provider, interaction.model, interaction.success, interaction.retry_attempt, interaction.tokens_used
      ));
      self.log.llm_interactions.push(interaction);
      let _ = self.flush();
   }

   pub fn record_data_operation(&mut self, name: &str, success: bool, detail: Option<String>) {
      self.write_text_line(&format!("[data] {name} success={success}"));
      self.log.data_operations.push(DataOperation { name: name.to_string(), success, detail });
      let _ = self.flush();
   }

   pub fn record_warning(&mut self, warning: impl Into<String>) {
      let warning = warning.into();
      self.write_text_line(&format!("[warn] {warning}"));
      self.log.warnings.push(warning);
      let _ = self.flush();
   }

   pub fn finish(&mut self, ended_at: impl Into<String>, result_summary: serde_json::Value, errors: Vec<String>) -> Result<()> {
      self.log.ended_at = Some(ended_at.into());
      self.log.result_summary = Some(result_summary);
      self.log.errors = errors;
      self.write_text_line("=== generation finished ===");
      self.flush()
   }

   fn write_text_line(&self, line: &str) {
      if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&self.text_path) {
         let _ = writeln!(file, "{line}");
      }
   }

   fn flush(&self) -> Result<()> {
      std::fs::write(&self.json_path, serde_json::to_vec_pretty(&self.log)?)?;
      Ok(())
   }
}
