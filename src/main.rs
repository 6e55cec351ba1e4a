use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use saigen::{
   GenerationRequest, Orchestrator, Result, SaigenConfig, SaigenError,
   batch::{self, BatchRequest, SoftwareListParser},
   context::ContextBuilder,
   gen_log::GenerationLogger,
   llm::manager::ProviderManager,
   merge::MergeStrategy,
   model::Saidata,
   rag::RagIndexer,
   schema,
   url_filter::UrlFilter,
};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MergeStrategyArg {
   Preserve,
   Enhance,
   Replace,
}

impl From<MergeStrategyArg> for MergeStrategy {
   fn from(value: MergeStrategyArg) -> Self {
      match value {
         MergeStrategyArg::Preserve => MergeStrategy::Preserve,
         MergeStrategyArg::Enhance => MergeStrategy::Enhance,
         MergeStrategyArg::Replace => MergeStrategy::Replace,
      }
   }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate saidata package-description documents using LLM providers", long_about = None)]
struct Args {
   /// Path to config file (default: ~/.config/saigen/config.toml)
   #[arg(long, global = true)]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
   /// Generate a saidata document for a single piece of software
   Generate {
      software_name: String,
      /// Target providers, e.g. apt,dnf,brew
      #[arg(long, value_delimiter = ',', default_value = "apt,dnf,brew")]
      providers: Vec<String>,
      #[arg(long)]
      preferred_provider: Option<String>,
      /// Path to write the generated YAML (defaults to stdout)
      #[arg(long)]
      output: Option<PathBuf>,
      /// Existing saidata file to update rather than generate fresh
      #[arg(long)]
      existing: Option<PathBuf>,
   },
   /// Generate saidata for every name in a software list file
   Batch {
      list_file: PathBuf,
      #[arg(long, value_delimiter = ',', default_value = "apt,dnf,brew")]
      providers: Vec<String>,
      #[arg(long)]
      output_dir: PathBuf,
      #[arg(long, default_value_t = 5)]
      max_concurrent: usize,
      #[arg(long)]
      category_filter: Option<String>,
      #[arg(long)]
      force: bool,
      #[arg(long)]
      stop_on_error: bool,
   },
   /// Regenerate an existing saidata document and merge it with the result
   Update {
      /// Existing saidata file to update
      path: PathBuf,
      #[arg(long, value_delimiter = ',', default_value = "apt,dnf,brew")]
      providers: Vec<String>,
      #[arg(long, value_enum, default_value_t = MergeStrategyArg::Enhance)]
      strategy: MergeStrategyArg,
      /// Prompt on the terminal before resolving conflicts
      #[arg(long)]
      interactive: bool,
      /// Path to write the merged YAML (defaults to overwriting `path`)
      #[arg(long)]
      output: Option<PathBuf>,
   },
   /// Validate a saidata YAML file against the schema
   Validate { path: PathBuf },
   /// Rebuild the RAG index from a repository package dump or sample saidata directory
   Index {
      #[arg(long)]
      packages: Option<PathBuf>,
      #[arg(long)]
      sample_saidata_dir: Option<PathBuf>,
   },
}

fn load_config(args: &Args) -> Result<SaigenConfig> {
   if let Some(path) = &args.config { SaigenConfig::from_file(path) } else { SaigenConfig::load() }
}

fn build_orchestrator(config: &SaigenConfig) -> Result<Arc<Orchestrator>> {
   let provider_manager = ProviderManager::from_config(config)?;
   let indexer = if config.rag.enabled {
      Some(Arc::new(RagIndexer::new(config.rag.index_dir.clone())))
   } else {
      None
   };
   let context_builder = ContextBuilder::new(
      indexer,
      config.rag.sample_saidata_dir.clone(),
      config.rag.max_context_packages,
      config.rag.max_context_saidata,
      config.rag.min_similarity_score,
   );
   let url_filter =
      if config.url_filter.enabled { Some(UrlFilter::new(config.url_filter.timeout_secs, config.url_filter.max_concurrent)) } else { None };

   Ok(Arc::new(Orchestrator::new(provider_manager, context_builder, url_filter, config.max_generation_retries)))
}

#[tokio::main]
async fn main() -> Result<()> {
   let args = Args::parse();
   let config = load_config(&args)?;

   match args.command {
      Command::Generate { software_name, providers, preferred_provider, output, existing } => {
         let orchestrator = build_orchestrator(&config)?;

         let existing_saidata = match &existing {
            Some(path) => {
               let contents = std::fs::read_to_string(path)?;
               Some(serde_yaml::from_str::<Saidata>(&contents)?)
            },
            None => None,
         };
         let update_mode = existing_saidata.is_some();

         let mut request = GenerationRequest::new(software_name.clone(), providers);
         request.preferred_provider = preferred_provider;
         request.existing_saidata = existing_saidata;
         request.update_mode = update_mode;

         let mut logger = GenerationLogger::new(&config.log_dir, &software_name, chrono::Utc::now().to_rfc3339()).ok();
         let result = orchestrator.generate(request, logger.as_mut()).await;

         if !result.success {
            eprintln!("Generation failed: {}", result.validation_errors.join("; "));
            return Err(SaigenError::GenerationError("saidata generation failed".to_string()));
         }

         let yaml = serde_yaml::to_string(&result.saidata.expect("success implies saidata"))?;
         match output {
            Some(path) => {
               if let Some(parent) = path.parent() {
                  std::fs::create_dir_all(parent)?;
               }
               std::fs::write(&path, yaml)?;
               println!("Wrote {}", path.display());
            },
            None => println!("{yaml}"),
         }
         Ok(())
      },

      Command::Batch { list_file, providers, output_dir, max_concurrent, category_filter, force, stop_on_error } => {
         let orchestrator = build_orchestrator(&config)?;

         let filter_re = category_filter
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .map_err(|e| SaigenError::ConfigurationError(format!("invalid category filter: {e}")))?;
         let software_list = SoftwareListParser::parse_file(&list_file, filter_re.as_ref())?;
         println!("Parsed {} software packages from {}", software_list.len(), list_file.display());

         let request = BatchRequest {
            software_list,
            target_providers: providers,
            preferred_provider: None,
            output_directory: Some(output_dir),
            max_concurrent,
            continue_on_error: !stop_on_error,
            force,
            log_dir: Some(config.log_dir.clone()),
         };

         let (tx, mut rx) = tokio::sync::mpsc::channel(32);
         let progress_task = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
               println!(
                  "Progress: {}/{} ({} ok, {} failed) - {}",
                  progress.completed, progress.total, progress.successful, progress.failed, progress.current_software
               );
            }
         });

         let result = batch::run(orchestrator, request, Some(tx)).await?;
         let _ = progress_task.await;

         println!(
            "Batch complete: {}/{} successful, {} failed, {:.1}s total",
            result.successful, result.total_requested, result.failed, result.total_time_secs
         );
         if !result.failed_software.is_empty() {
            println!("Failed: {}", result.failed_software.join(", "));
         }
         Ok(())
      },

      Command::Update { path, providers, strategy, interactive, output } => {
         let orchestrator = build_orchestrator(&config)?;

         let contents = std::fs::read_to_string(&path)?;
         let existing: Saidata = serde_yaml::from_str(&contents)?;
         let software_name = existing.metadata.name.clone();

         let mut logger = GenerationLogger::new(&config.log_dir, &software_name, chrono::Utc::now().to_rfc3339()).ok();
         let result =
            orchestrator.update(existing, providers, strategy.into(), interactive, logger.as_mut()).await;

         if !result.success {
            eprintln!("Update failed: {}", result.validation_errors.join("; "));
            return Err(SaigenError::GenerationError("saidata update failed".to_string()));
         }

         if let Some(stats) = &result.stats {
            println!(
               "Merged: {} fields added, {} fields updated, {} conflicts resolved",
               stats.fields_added, stats.fields_updated, stats.conflicts_resolved
            );
         }

         let yaml = serde_yaml::to_string(&result.saidata.expect("success implies saidata"))?;
         let output_path = output.unwrap_or(path);
         if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
         }
         std::fs::write(&output_path, yaml)?;
         println!("Wrote {}", output_path.display());
         Ok(())
      },

      Command::Validate { path } => {
         let contents = std::fs::read_to_string(&path)?;
         let (validation, _) = schema::validate_yaml(&contents)?;
         if validation.is_valid() {
            println!("{} is valid", path.display());
            for warning in validation.warnings() {
               println!("  warning: {} ({})", warning.message, warning.path);
            }
            Ok(())
         } else {
            for error in validation.errors() {
               eprintln!("  error: {} ({})", error.message, error.path);
            }
            Err(SaigenError::ValidationFailedError { errors: validation.error_messages() })
         }
      },

      Command::Index { packages, sample_saidata_dir } => {
         let indexer = RagIndexer::new(config.rag.index_dir.clone());
         if let Some(path) = packages {
            let contents = std::fs::read_to_string(&path)?;
            let repo_packages: Vec<saigen::model::RepositoryPackage> = serde_json::from_str(&contents)?;
            let count = repo_packages.len();
            indexer.index_packages(repo_packages).await?;
            println!("Indexed {count} repository packages");
         }
         if let Some(dir) = sample_saidata_dir {
            let mut docs = Vec::new();
            for entry in std::fs::read_dir(&dir)?.flatten() {
               if let Ok(contents) = std::fs::read_to_string(entry.path()) {
                  if let Ok(doc) = serde_yaml::from_str::<Saidata>(&contents) {
                     docs.push((entry.path(), doc));
                  }
               }
            }
            let count = docs.len();
            indexer.index_saidata(docs).await?;
            println!("Indexed {count} sample saidata documents");
         }
         Ok(())
      },
   }
}
