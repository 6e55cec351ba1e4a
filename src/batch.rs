//! Bounded-concurrency batch generation over a list of software names.
//!
//! Mirrors [`Orchestrator`]'s single-request flow but fans out across a
//! `tokio::sync::Semaphore`-gated worker pool, writes successful results to a
//! hierarchical output layout, and reports progress via an mpsc channel.

use std::{
   path::{Path, PathBuf},
   sync::Arc,
   time::Instant,
};

use regex::Regex;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::{
   error::{Result, SaigenError},
   gen_log::GenerationLogger,
   orchestrator::{GenerationRequest, GenerationResult, Orchestrator},
};

static NAME_PATTERN: std::sync::LazyLock<Regex> =
   std::sync::LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

/// Parses the line-oriented software list format: `#`-prefixed comments,
/// `## Category` headers, an optional case-insensitive category filter, and
/// inline `#` comment stripping on name lines.
pub struct SoftwareListParser;

impl SoftwareListParser {
   pub fn parse_str(content: &str, category_filter: Option<&Regex>) -> Vec<String> {
      let mut names = Vec::new();
      let mut include_section = true;

      for raw_line in content.lines() {
         let line = raw_line.trim();
         if line.is_empty() {
            continue;
         }
         if let Some(category) = line.strip_prefix("##") {
            let category = category.trim();
            include_section = category_filter.is_none_or(|re| re.is_match(category));
            continue;
         }
         if line.starts_with('#') {
            continue;
         }
         if !include_section {
            continue;
         }
         let name = line.split('#').next().unwrap_or("").trim();
         if !name.is_empty() {
            names.push(name.to_string());
         }
      }
      names
   }

   pub fn parse_file(path: &Path, category_filter: Option<&Regex>) -> Result<Vec<String>> {
      let content = std::fs::read_to_string(path)?;
      Ok(Self::parse_str(&content, category_filter))
   }

   pub fn validate_names(names: Vec<String>) -> Vec<String> {
      names
         .into_iter()
         .filter(|n| {
            let ok = NAME_PATTERN.is_match(n);
            if !ok {
               eprintln!("skipping invalid software name: {n}");
            }
            ok
         })
         .collect()
   }
}

/// Computes `<output_dir>/<first_two_letters>/<name>/default.yaml`. Names
/// shorter than two characters are padded with trailing underscores so the
/// first path segment is always exactly two characters.
pub fn hierarchical_output_path(output_dir: &Path, name: &str) -> PathBuf {
   let mut prefix: String = name.chars().take(2).collect();
   while prefix.chars().count() < 2 {
      prefix.push('_');
   }
   output_dir.join(prefix).join(name).join("default.yaml")
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
   pub total: usize,
   pub completed: usize,
   pub successful: usize,
   pub failed: usize,
   pub elapsed_secs: f64,
   pub current_software: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchGenerationResult {
   pub total_requested: usize,
   pub successful: usize,
   pub failed: usize,
   pub results: Vec<GenerationResult>,
   pub failed_software: Vec<String>,
   pub total_time_secs: f64,
   pub average_time_per_item_secs: f64,
}

pub struct BatchRequest {
   pub software_list: Vec<String>,
   pub target_providers: Vec<String>,
   pub preferred_provider: Option<String>,
   pub output_directory: Option<PathBuf>,
   pub max_concurrent: usize,
   pub continue_on_error: bool,
   pub force: bool,
   pub log_dir: Option<PathBuf>,
}

/// Runs a batch of independent generation requests with bounded concurrency.
///
/// `progress_tx`, if given, receives one [`BatchProgress`] per completed item.
pub async fn run(
   orchestrator: Arc<Orchestrator>,
   mut request: BatchRequest,
   progress_tx: Option<tokio::sync::mpsc::Sender<BatchProgress>>,
) -> Result<BatchGenerationResult> {
   let start = Instant::now();
   request.max_concurrent = request.max_concurrent.clamp(1, 20);

   let valid = SoftwareListParser::validate_names(std::mem::take(&mut request.software_list));
   if valid.is_empty() {
      return Err(SaigenError::BatchProcessingError {
         software_name: String::new(),
         message: "no valid software names in list".to_string(),
      });
   }
   let total_requested = valid.len();

   let mut to_process = Vec::with_capacity(valid.len());
   for name in valid {
      if !request.force
         && let Some(dir) = &request.output_directory
         && hierarchical_output_path(dir, &name).exists()
      {
         continue;
      }
      to_process.push(name);
   }

   if to_process.is_empty() {
      return Ok(BatchGenerationResult {
         total_requested,
         successful: 0,
         failed: 0,
         results: vec![],
         failed_software: vec![],
         total_time_secs: start.elapsed().as_secs_f64(),
         average_time_per_item_secs: 0.0,
      });
   }

   let semaphore = Arc::new(Semaphore::new(request.max_concurrent));
   let total = to_process.len();
   let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
   let successful = Arc::new(std::sync::atomic::AtomicUsize::new(0));
   let failed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

   let mut handles = Vec::with_capacity(total);
   for (index, name) in to_process.iter().cloned().enumerate() {
      let semaphore = semaphore.clone();
      let orchestrator = orchestrator.clone();
      let target_providers = request.target_providers.clone();
      let preferred_provider = request.preferred_provider.clone();
      let output_directory = request.output_directory.clone();
      let log_dir = request.log_dir.clone();
      let progress_tx = progress_tx.clone();
      let completed = completed.clone();
      let successful = successful.clone();
      let failed = failed.clone();
      let batch_start = start;

      handles.push(tokio::spawn(async move {
         let _permit = semaphore.acquire_owned().await.ok();

         let mut logger = log_dir
            .as_deref()
            .and_then(|dir| GenerationLogger::new(dir, &name, chrono::Utc::now().to_rfc3339()).ok());

         let gen_request = GenerationRequest::new(name.clone(), target_providers);
         let gen_request = GenerationRequest { preferred_provider, ..gen_request };
         let result = orchestrator.generate(gen_request, logger.as_mut()).await;

         if result.success
            && let (Some(doc), Some(dir)) = (&result.saidata, &output_directory)
         {
            let path = hierarchical_output_path(dir, &name);
            if let Err(e) = write_atomic(&path, doc) {
               eprintln!("failed to write saidata for {name}: {e}");
            }
         }

         if result.success {
            successful.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
         } else {
            failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
         }
         let done = completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;

         if let Some(tx) = progress_tx {
            let _ = tx
               .send(BatchProgress {
                  total,
                  completed: done,
                  successful: successful.load(std::sync::atomic::Ordering::Relaxed),
                  failed: failed.load(std::sync::atomic::Ordering::Relaxed),
                  elapsed_secs: batch_start.elapsed().as_secs_f64(),
                  current_software: name.clone(),
               })
               .await;
         }

         (index, name, result)
      }));
   }

   let mut results: Vec<Option<GenerationResult>> = (0..total).map(|_| None).collect();
   let mut failed_software = Vec::new();

   if request.continue_on_error {
      for handle in handles {
         match handle.await {
            Ok((index, name, result)) => {
               if !result.success {
                  failed_software.push(name);
               }
               results[index] = Some(result);
            },
            Err(join_err) => {
               failed_software.push(format!("<join error: {join_err}>"));
            },
         }
      }
   } else {
      let mut handles = handles.into_iter();
      let mut abort_reason: Option<String> = None;
      for handle in handles.by_ref() {
         match handle.await {
            Ok((index, name, result)) => {
               if !result.success {
                  abort_reason = Some(name);
                  break;
               }
               results[index] = Some(result);
            },
            Err(join_err) => {
               abort_reason = Some(format!("<join error: {join_err}>"));
               break;
            },
         }
      }
      if let Some(failed_name) = abort_reason {
         // Abort whatever is still in flight; the write step only runs after
         // a task observes its own success, so an aborted task never leaves
         // a partial file on disk.
         for handle in handles {
            handle.abort();
         }
         return Err(SaigenError::BatchProcessingError {
            software_name: failed_name,
            message: "batch processing aborted on first failure".to_string(),
         });
      }
   }

   let results: Vec<GenerationResult> = results.into_iter().flatten().collect();
   let successful_count = results.iter().filter(|r| r.success).count();
   let failed_count = results.len() - successful_count;
   let total_time = start.elapsed().as_secs_f64();

   Ok(BatchGenerationResult {
      total_requested,
      successful: successful_count,
      failed: failed_count,
      results,
      failed_software,
      total_time_secs: total_time,
      average_time_per_item_secs: if total == 0 { 0.0 } else { total_time / total as f64 },
   })
}

fn write_atomic(path: &Path, doc: &crate::model::Saidata) -> Result<()> {
   if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
   }
   let yaml = serde_yaml::to_string(doc)?;
   let tmp_path = path.with_extension("yaml.tmp");
   std::fs::write(&tmp_path, yaml)?;
   std::fs::rename(&tmp_path, path)?;
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn parses_categories_and_inline_comments() {
      let content = "## Web Servers\nnginx # reverse proxy\napache\n## Databases\npostgres\n# comment\n";
      let names = SoftwareListParser::parse_str(content, None);
      assert_eq!(names, vec!["nginx", "apache", "postgres"]);
   }

   #[test]
   fn category_filter_restricts_to_matching_sections() {
      let content = "## Web Servers\nnginx\n## Databases\npostgres\n";
      let filter = Regex::new("(?i)database").unwrap();
      let names = SoftwareListParser::parse_str(content, Some(&filter));
      assert_eq!(names, vec!["postgres"]);
   }

   #[test]
   fn invalid_names_are_dropped() {
      let names = SoftwareListParser::validate_names(vec!["nginx".to_string(), "bad name!".to_string()]);
      assert_eq!(names, vec!["nginx"]);
   }

   #[test]
   fn hierarchical_path_pads_short_names() {
      let path = hierarchical_output_path(Path::new("/out"), "a");
      assert_eq!(path, Path::new("/out/a_/a/default.yaml"));
   }

   #[test]
   fn hierarchical_path_uses_first_two_letters() {
      let path = hierarchical_output_path(Path::new("/out"), "nginx");
      assert_eq!(path, Path::new("/out/ng/nginx/default.yaml"));
   }
}
