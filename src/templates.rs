//! Prompt rendering: conditional sections over a `GenerationContext`,
//! rendered with Tera. Default section bodies ship embedded in the binary
//! and can be overridden by dropping same-named files into
//! `~/.saigen/prompts/<template>/<section>.md`.

use std::{
   path::PathBuf,
   sync::LazyLock,
};

use parking_lot::Mutex;
use rust_embed::RustEmbed;
use tera::{Context, Tera};

use crate::{
   context::GenerationContext,
   error::{Result, SaigenError},
   schema,
};

#[derive(RustEmbed)]
#[folder = "prompts/"]
struct Prompts;

static TERA: LazyLock<Mutex<Tera>> = LazyLock::new(|| Mutex::new(Tera::default()));

fn get_user_prompts_dir() -> Option<PathBuf> {
   std::env::var("HOME")
      .or_else(|_| std::env::var("USERPROFILE"))
      .ok()
      .map(|home| PathBuf::from(home).join(".saigen").join("prompts"))
}

/// Unpack embedded prompts to the user prompts directory so they can be
/// copied and edited; falls back to serving embedded content in-memory if no
/// home directory can be determined.
pub fn ensure_prompts_dir() -> Result<()> {
   let Some(user_dir) = get_user_prompts_dir() else {
      return Ok(());
   };

   for file in Prompts::iter() {
      let dest = user_dir.join(file.as_ref());
      if let Some(parent) = dest.parent() {
         std::fs::create_dir_all(parent)?;
      }
      let Some(embedded) = Prompts::get(file.as_ref()) else { continue };
      let should_write = match std::fs::read(&dest) {
         Ok(existing) => existing != embedded.data.as_ref(),
         Err(_) => true,
      };
      if should_write {
         std::fs::write(&dest, embedded.data.as_ref())?;
      }
   }
   Ok(())
}

fn load_section(template: &str, section: &str) -> Result<String> {
   if let Some(user_dir) = get_user_prompts_dir() {
      let path = user_dir.join(template).join(format!("{section}.md"));
      if path.exists() {
         return Ok(std::fs::read_to_string(path)?);
      }
   }

   let key = format!("{template}/{section}.md");
   Prompts::get(&key)
      .and_then(|f| std::str::from_utf8(f.data.as_ref()).ok().map(str::to_string))
      .ok_or_else(|| SaigenError::TemplateError(format!("section '{key}' not found")))
}

/// Rewrite `$name` placeholders into Tera's `{{ name }}` syntax. The source
/// section bodies are written with `$var` markers for readability; Tera does
/// the actual substitution.
fn to_tera_syntax(raw: &str) -> String {
   let mut out = String::with_capacity(raw.len());
   let mut chars = raw.char_indices().peekable();
   while let Some((_, c)) = chars.next() {
      if c == '$' && chars.peek().is_some_and(|(_, n)| n.is_alphabetic() || *n == '_') {
         let mut name = String::new();
         while let Some((_, n)) = chars.peek() {
            if n.is_alphanumeric() || *n == '_' {
               name.push(*n);
               chars.next();
            } else {
               break;
            }
         }
         out.push_str(&format!("{{{{ {name} | default(value=\"\") }}}}"));
      } else {
         out.push(c);
      }
   }
   out
}

fn render_section(template: &str, section: &str, context: &Context) -> Result<String> {
   let raw = load_section(template, section)?;
   let tera_src = to_tera_syntax(&raw);
   let mut tera = TERA.lock();
   let name = format!("{template}/{section}/{:x}", md5ish(&tera_src));
   if tera.get_template_names().all(|n| n != name) {
      tera
         .add_raw_template(&name, &tera_src)
         .map_err(|e| SaigenError::TemplateError(format!("failed to register '{name}': {e}")))?;
   }
   tera.render(&name, context).map_err(|e| SaigenError::TemplateError(format!("failed to render '{name}': {e}")))
}

/// Cheap non-cryptographic fingerprint used only to key the Tera template
/// cache by content, so repeated renders of the same section don't
/// re-register a template under the same name with different content.
fn md5ish(s: &str) -> u64 {
   use std::hash::{Hash, Hasher};
   let mut hasher = std::collections::hash_map::DefaultHasher::new();
   s.hash(&mut hasher);
   hasher.finish()
}

enum Condition {
   Always,
   HasRepositoryData,
   HasSimilarSaidata,
   HasSampleSaidata,
   HasUserHints,
   HasExistingSaidata,
   HasValidationFeedback,
}

impl Condition {
   fn evaluate(&self, context: &GenerationContext) -> bool {
      match self {
         Self::Always => true,
         Self::HasRepositoryData => context.has_repository_data(),
         Self::HasSimilarSaidata => context.has_similar_saidata(),
         Self::HasSampleSaidata => context.has_sample_saidata(),
         Self::HasUserHints => context.has_user_hints(),
         Self::HasExistingSaidata => context.has_existing_saidata(),
         Self::HasValidationFeedback => context.has_validation_feedback(),
      }
   }
}

struct SectionSpec {
   name: &'static str,
   required: bool,
   condition: Condition,
}

fn build_tera_context(context: &GenerationContext) -> Context {
   let mut ctx = Context::new();
   ctx.insert("software_name", &context.software_name);
   ctx.insert("target_providers", &context.target_providers.join(", "));
   ctx.insert("json_schema", schema_text());

   if context.has_repository_data() {
      ctx.insert("repository_context", &format_repository_context(context));
   }
   if context.has_similar_saidata() {
      ctx.insert("similar_saidata_examples", &format_saidata_summaries(&context.similar_saidata));
   }
   if context.has_sample_saidata() {
      ctx.insert("sample_saidata_examples", &format_saidata_summaries(&context.sample_saidata));
   }
   if context.has_user_hints() {
      ctx.insert("user_hints", &format_user_hints(context));
   }
   if let Some(existing) = &context.existing_saidata {
      if let Ok(yaml) = serde_yaml::to_string(existing) {
         ctx.insert("existing_saidata", &yaml);
      }
   }
   if let Some(feedback) = context.user_hints.get("validation_feedback") {
      ctx.insert("validation_feedback", &format_validation_feedback(feedback));
      if let Some(excerpt) = feedback.get("failed_yaml_excerpt").and_then(|v| v.as_str()) {
         ctx.insert("failed_yaml_excerpt", excerpt);
      }
   }

   if let Some(category) = &context.software_category {
      ctx.insert("software_category", category);
   }
   if !context.likely_installation_methods.is_empty() {
      ctx.insert("likely_installation_methods", &context.likely_installation_methods.join(", "));
   }
   if let Some(template) = &context.security_metadata_template {
      ctx.insert("security_metadata_template", template);
   }
   if let Some(template) = &context.compatibility_matrix_template {
      ctx.insert("compatibility_matrix_template", template);
   }
   if !context.url_templating_examples.is_empty() {
      ctx.insert("url_templating_examples", &context.url_templating_examples.join("\n"));
   }
   if !context.installation_method_examples.is_empty() {
      ctx.insert("installation_method_examples", &context.installation_method_examples.join("\n"));
   }
   if !context.provider_enhancement_examples.is_empty() {
      ctx.insert("provider_enhancement_examples", &context.provider_enhancement_examples.join("\n"));
   }
   ctx
}

fn schema_text() -> &'static str {
   schema::SCHEMA_JSON
}

fn format_repository_context(context: &GenerationContext) -> String {
   use std::collections::BTreeMap;
   let mut by_repo: BTreeMap<&str, Vec<&crate::model::RepositoryPackage>> = BTreeMap::new();
   for pkg in &context.repository_data {
      by_repo.entry(pkg.repository_name.as_str()).or_default().push(pkg);
   }

   let mut lines = Vec::new();
   let mut total = 0;
   'outer: for (repo, packages) in by_repo {
      for pkg in packages.iter().take(3) {
         if total >= 8 {
            break 'outer;
         }
         let version = pkg.version.as_deref().unwrap_or("unknown");
         let desc = pkg.description.as_deref().unwrap_or("");
         let homepage = pkg
            .homepage
            .as_deref()
            .map(|h| format!(" [Homepage: {h}]"))
            .unwrap_or_default();
         lines.push(format!("— {} (v{version}) [{repo}]: {desc}{homepage}", pkg.name));
         total += 1;
      }
   }
   lines.join("\n")
}

fn format_saidata_summaries(docs: &[crate::model::Saidata]) -> String {
   docs
      .iter()
      .map(|d| {
         let providers: Vec<&str> = d.providers.keys().map(String::as_str).collect();
         format!(
            "- {} ({}): providers={}",
            d.metadata.name,
            d.metadata.category.as_deref().unwrap_or("uncategorized"),
            providers.join(",")
         )
      })
      .collect::<Vec<_>>()
      .join("\n")
}

fn format_user_hints(context: &GenerationContext) -> String {
   context
      .user_hints
      .iter()
      .filter(|(k, _)| k.as_str() != "validation_feedback")
      .map(|(k, v)| format!("- {k}: {v}"))
      .collect::<Vec<_>>()
      .join("\n")
}

fn format_validation_feedback(feedback: &serde_json::Value) -> String {
   feedback
      .get("specific_errors")
      .and_then(|v| v.as_array())
      .map(|errors| {
         errors
            .iter()
            .filter_map(|e| e.as_str())
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
      })
      .unwrap_or_default()
}

fn render_template(template: &str, sections: &[SectionSpec], context: &GenerationContext) -> Result<String> {
   ensure_prompts_dir()?;
   let tera_context = build_tera_context(context);
   let mut out = String::new();
   for section in sections {
      if !section.condition.evaluate(context) {
         continue;
      }
      let rendered = render_section(template, section.name, &tera_context);
      match rendered {
         Ok(text) => {
            out.push_str(text.trim());
            out.push_str("\n\n");
         },
         Err(e) if section.required => return Err(e),
         Err(_) => {},
      }
   }
   Ok(out.trim_end().to_string())
}

pub fn render_generation_prompt(context: &GenerationContext) -> Result<String> {
   render_template(
      "generation",
      &[
         SectionSpec { name: "instructions", required: true, condition: Condition::Always },
         SectionSpec { name: "repository_context", required: false, condition: Condition::HasRepositoryData },
         SectionSpec { name: "similar_saidata", required: false, condition: Condition::HasSimilarSaidata },
         SectionSpec { name: "sample_saidata", required: false, condition: Condition::HasSampleSaidata },
         SectionSpec { name: "user_hints", required: false, condition: Condition::HasUserHints },
         SectionSpec { name: "enrichment", required: false, condition: Condition::Always },
         SectionSpec { name: "schema", required: true, condition: Condition::Always },
      ],
      context,
   )
}

pub fn render_update_prompt(context: &GenerationContext) -> Result<String> {
   render_template(
      "update",
      &[
         SectionSpec { name: "instructions", required: true, condition: Condition::Always },
         SectionSpec { name: "existing_saidata", required: false, condition: Condition::HasExistingSaidata },
         SectionSpec { name: "repository_context", required: false, condition: Condition::HasRepositoryData },
         SectionSpec { name: "enrichment", required: false, condition: Condition::Always },
         SectionSpec { name: "schema", required: true, condition: Condition::Always },
      ],
      context,
   )
}

pub fn render_retry_prompt(context: &GenerationContext) -> Result<String> {
   render_template(
      "retry",
      &[
         SectionSpec { name: "instructions", required: true, condition: Condition::Always },
         SectionSpec { name: "validation_feedback", required: true, condition: Condition::HasValidationFeedback },
         SectionSpec { name: "schema", required: true, condition: Condition::Always },
      ],
      context,
   )
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn generation_prompt_contains_software_name() {
      let context = GenerationContext::new("nginx", vec!["apt".to_string()]);
      let prompt = render_generation_prompt(&context).unwrap();
      assert!(prompt.contains("nginx"));
   }

   #[test]
   fn generation_prompt_includes_enrichment_examples() {
      let mut context = GenerationContext::new("nginx", vec!["apt".to_string()]);
      context.software_category = Some("web_server".to_string());
      context.likely_installation_methods = vec!["sources".to_string()];
      context.security_metadata_template = Some("security:\n  vulnerability_disclosure: https://example.com".to_string());
      context.compatibility_matrix_template = Some("- provider: apt\n  supported: true".to_string());
      context.url_templating_examples = vec!["download_url: https://example.com/{{version}}".to_string()];
      context.installation_method_examples =
         vec!["sources: build from a release tarball with ./configure && make && make install".to_string()];
      context.provider_enhancement_examples = vec!["apt: override package_name".to_string()];

      let prompt = render_generation_prompt(&context).unwrap();
      assert!(prompt.contains("web_server"));
      assert!(prompt.contains("{{version}}") || prompt.contains("version"));
      assert!(prompt.contains("override package_name"));
   }

   #[test]
   fn retry_prompt_requires_validation_feedback_section() {
      let mut context = GenerationContext::new("nginx", vec!["apt".to_string()]);
      context.user_hints.insert(
         "validation_feedback".to_string(),
         serde_json::json!({"specific_errors": ["version mismatch"], "failed_yaml_excerpt": "version: bad"}),
      );
      let prompt = render_retry_prompt(&context).unwrap();
      assert!(prompt.contains("version mismatch"));
   }
}
