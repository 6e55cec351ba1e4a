//! Three-way merge between an existing saidata document and a freshly
//! generated one.

use serde::Serialize;

use crate::model::{Package, ProviderConfig, Saidata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
   Preserve,
   Enhance,
   Replace,
}

/// Resolves a genuine conflict between an existing and a freshly generated
/// value during an interactive update. Only called when both sides have a
/// value and they differ.
pub trait ConflictPrompt {
   /// Returns `true` to keep the existing value, `false` to take the fresh one.
   fn confirm_keep_existing(&self, field: &str, existing: &str, fresh: &str) -> bool;
}

/// Prompts the operator on the terminal, colored via [`crate::style`].
pub struct TerminalConfirm;

impl ConflictPrompt for TerminalConfirm {
   fn confirm_keep_existing(&self, field: &str, existing: &str, fresh: &str) -> bool {
      crate::style::confirm_keep_existing(field, existing, fresh)
   }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
   pub fields_added: usize,
   pub fields_updated: usize,
   pub conflicts_resolved: usize,
}

fn merge_identity_vec<T: Clone, K: Eq + std::hash::Hash>(
   existing: &[T],
   fresh: &[T],
   key_of: impl Fn(&T) -> K,
   stats: &mut MergeStats,
) -> Vec<T> {
   // existing wins on overlap; fresh only contributes new keys
   let mut result: Vec<T> = existing.to_vec();
   let existing_keys: std::collections::HashSet<_> = existing.iter().map(&key_of).collect();
   for item in fresh {
      if !existing_keys.contains(&key_of(item)) {
         result.push(item.clone());
         stats.fields_added += 1;
      }
   }
   result
}

/// `preserve`: keep every existing leaf; only add keys absent from `existing`.
fn merge_preserve(existing: Saidata, fresh: &Saidata, stats: &mut MergeStats) -> Saidata {
   let mut merged = existing;

   macro_rules! merge_section {
      ($field:ident, $key:expr) => {
         merged.resources.$field = match (merged.resources.$field.take(), &fresh.resources.$field) {
            (Some(e), Some(f)) => Some(merge_identity_vec(&e, f, $key, stats)),
            (None, Some(f)) if !f.is_empty() => {
               stats.fields_added += f.len();
               Some(f.clone())
            },
            (e, _) => e,
         };
      };
   }

   merge_section!(packages, Package::identity_key);
   merge_section!(services, crate::model::Service::identity_key);
   merge_section!(files, crate::model::FileEntry::identity_key);
   merge_section!(directories, crate::model::Directory::identity_key);
   merge_section!(commands, crate::model::Command::identity_key);
   merge_section!(ports, crate::model::Port::identity_key);

   for (name, fresh_provider) in &fresh.providers {
      merged.providers.entry(name.clone()).or_insert_with(|| {
         stats.fields_added += 1;
         fresh_provider.clone()
      });
   }

   merged
}

/// `enhance`: preserve, plus description/tags/urls/security filling and
/// per-provider resource merging by identity key.
fn merge_enhance(
   existing: Saidata,
   fresh: &Saidata,
   stats: &mut MergeStats,
   prompt: Option<&dyn ConflictPrompt>,
) -> Saidata {
   let mut merged = merge_preserve(existing, fresh, stats);

   if let Some(fresh_desc) = &fresh.metadata.description {
      let replace = match &merged.metadata.description {
         Some(existing_desc) if fresh_desc.len() > existing_desc.len() => match prompt {
            Some(p) => !p.confirm_keep_existing("metadata.description", existing_desc, fresh_desc),
            None => true,
         },
         Some(_) => false,
         None => true,
      };
      if replace {
         merged.metadata.description = Some(fresh_desc.clone());
         stats.fields_updated += 1;
      }
   }

   let before = merged.metadata.tags.len();
   merged.metadata.tags.extend(fresh.metadata.tags.iter().cloned());
   if merged.metadata.tags.len() > before {
      stats.fields_added += merged.metadata.tags.len() - before;
   }

   for (key, value) in &fresh.metadata.urls {
      merged.metadata.urls.entry(key.clone()).or_insert_with(|| {
         stats.fields_added += 1;
         value.clone()
      });
   }

   if merged.metadata.security.security_contact.is_none() {
      merged.metadata.security.security_contact = fresh.metadata.security.security_contact.clone();
   }
   if merged.metadata.security.vulnerability_disclosure.is_none() {
      merged.metadata.security.vulnerability_disclosure = fresh.metadata.security.vulnerability_disclosure.clone();
   }
   if merged.metadata.security.sbom_url.is_none() {
      merged.metadata.security.sbom_url = fresh.metadata.security.sbom_url.clone();
   }

   for (name, fresh_provider) in &fresh.providers {
      match merged.providers.get_mut(name) {
         Some(existing_provider) => merge_provider_config(existing_provider, fresh_provider, stats),
         None => {
            merged.providers.insert(name.clone(), fresh_provider.clone());
            stats.fields_added += 1;
         },
      }
   }

   merged
}

fn merge_provider_config(existing: &mut ProviderConfig, fresh: &ProviderConfig, stats: &mut MergeStats) {
   macro_rules! merge_provider_section {
      ($field:ident, $key:expr) => {
         existing.resources.$field = match (existing.resources.$field.take(), &fresh.resources.$field) {
            (Some(e), Some(f)) => Some(merge_identity_vec(&e, f, $key, stats)),
            (None, Some(f)) if !f.is_empty() => {
               stats.fields_added += f.len();
               Some(f.clone())
            },
            (e, _) => e,
         };
      };
   }

   merge_provider_section!(packages, Package::identity_key);
   merge_provider_section!(services, crate::model::Service::identity_key);
   merge_provider_section!(files, crate::model::FileEntry::identity_key);
   merge_provider_section!(directories, crate::model::Directory::identity_key);
   merge_provider_section!(commands, crate::model::Command::identity_key);
   merge_provider_section!(ports, crate::model::Port::identity_key);
}

pub fn merge(
   existing: Saidata,
   fresh: &Saidata,
   strategy: MergeStrategy,
   prompt: Option<&dyn ConflictPrompt>,
) -> (Saidata, MergeStats) {
   let mut stats = MergeStats::default();
   let merged = match strategy {
      MergeStrategy::Preserve => merge_preserve(existing, fresh, &mut stats),
      MergeStrategy::Enhance => merge_enhance(existing, fresh, &mut stats, prompt),
      MergeStrategy::Replace => merge_replace(existing, fresh, &mut stats, prompt),
   };
   (merged, stats)
}

/// `replace`: take `fresh` wholesale. In interactive mode, enumerate the
/// top-level sections present (non-default) in both documents and let the
/// operator keep the existing value section by section.
fn merge_replace(existing: Saidata, fresh: &Saidata, stats: &mut MergeStats, prompt: Option<&dyn ConflictPrompt>) -> Saidata {
   let Some(prompt) = prompt else {
      stats.conflicts_resolved += 1;
      return fresh.clone();
   };

   let mut merged = fresh.clone();

   if existing.metadata != fresh.metadata {
      let existing_desc = existing.metadata.description.clone().unwrap_or_default();
      let fresh_desc = fresh.metadata.description.clone().unwrap_or_default();
      if prompt.confirm_keep_existing("metadata", &existing_desc, &fresh_desc) {
         merged.metadata = existing.metadata.clone();
      } else {
         stats.conflicts_resolved += 1;
      }
   }

   macro_rules! replace_section {
      ($field:ident, $label:expr) => {
         if existing.resources.$field.is_some() && existing.resources.$field != fresh.resources.$field {
            let existing_repr = format!("{:?}", existing.resources.$field);
            let fresh_repr = format!("{:?}", fresh.resources.$field);
            if prompt.confirm_keep_existing($label, &existing_repr, &fresh_repr) {
               merged.resources.$field = existing.resources.$field.clone();
            } else {
               stats.conflicts_resolved += 1;
            }
         }
      };
   }

   replace_section!(packages, "resources.packages");
   replace_section!(services, "resources.services");
   replace_section!(files, "resources.files");
   replace_section!(directories, "resources.directories");
   replace_section!(commands, "resources.commands");
   replace_section!(ports, "resources.ports");

   if !existing.providers.is_empty() && existing.providers != fresh.providers {
      let existing_repr = format!("{:?}", existing.providers);
      let fresh_repr = format!("{:?}", fresh.providers);
      if prompt.confirm_keep_existing("providers", &existing_repr, &fresh_repr) {
         merged.providers = existing.providers.clone();
      } else {
         stats.conflicts_resolved += 1;
      }
   }

   merged
}

#[cfg(test)]
mod tests {
   use super::*;

   fn doc_with_tag(name: &str, tag: &str) -> Saidata {
      let mut doc = Saidata::new(name);
      doc.metadata.tags.insert(tag.to_string());
      doc
   }

   #[test]
   fn merge_preserve_is_identity_on_matching_documents() {
      let existing = doc_with_tag("nginx", "web");
      let fresh = existing.clone();
      let (merged, _) = merge(existing.clone(), &fresh, MergeStrategy::Preserve, None);
      assert_eq!(merged, existing);
   }

   #[test]
   fn preserve_keeps_existing_leaves() {
      let mut existing = Saidata::new("nginx");
      existing.metadata.description = Some("old description".to_string());
      let mut fresh = Saidata::new("nginx");
      fresh.metadata.description = Some("new description".to_string());

      let (merged, _) = merge(existing, &fresh, MergeStrategy::Preserve, None);
      assert_eq!(merged.metadata.description.as_deref(), Some("old description"));
   }

   #[test]
   fn enhance_unions_tags() {
      let existing = doc_with_tag("nginx", "web");
      let fresh = doc_with_tag("nginx", "server");
      let (merged, _) = merge(existing, &fresh, MergeStrategy::Enhance, None);
      assert!(merged.metadata.tags.contains("web"));
      assert!(merged.metadata.tags.contains("server"));
   }

   struct AlwaysKeepExisting;
   impl ConflictPrompt for AlwaysKeepExisting {
      fn confirm_keep_existing(&self, _field: &str, _existing: &str, _fresh: &str) -> bool {
         true
      }
   }

   struct AlwaysTakeFresh;
   impl ConflictPrompt for AlwaysTakeFresh {
      fn confirm_keep_existing(&self, _field: &str, _existing: &str, _fresh: &str) -> bool {
         false
      }
   }

   #[test]
   fn enhance_prompts_before_replacing_longer_description() {
      let mut existing = Saidata::new("nginx");
      existing.metadata.description = Some("short".to_string());
      let mut fresh = Saidata::new("nginx");
      fresh.metadata.description = Some("a much longer description".to_string());

      let prompt = AlwaysKeepExisting;
      let (merged, _) = merge(existing, &fresh, MergeStrategy::Enhance, Some(&prompt));
      assert_eq!(merged.metadata.description.as_deref(), Some("short"));
   }

   #[test]
   fn replace_interactive_keeps_confirmed_sections() {
      let mut existing = Saidata::new("nginx");
      existing.metadata.description = Some("existing desc".to_string());
      let mut fresh = Saidata::new("nginx");
      fresh.metadata.description = Some("fresh desc".to_string());

      let prompt = AlwaysKeepExisting;
      let (merged, stats) = merge(existing, &fresh, MergeStrategy::Replace, Some(&prompt));
      assert_eq!(merged.metadata.description.as_deref(), Some("existing desc"));
      assert_eq!(stats.conflicts_resolved, 0);
   }

   #[test]
   fn replace_interactive_can_take_fresh_on_decline() {
      let mut existing = Saidata::new("nginx");
      existing.metadata.description = Some("existing desc".to_string());
      let mut fresh = Saidata::new("nginx");
      fresh.metadata.description = Some("fresh desc".to_string());

      let prompt = AlwaysTakeFresh;
      let (merged, stats) = merge(existing, &fresh, MergeStrategy::Replace, Some(&prompt));
      assert_eq!(merged.metadata.description.as_deref(), Some("fresh desc"));
      assert_eq!(stats.conflicts_resolved, 1);
   }

   #[test]
   fn replace_non_interactive_takes_fresh_wholesale() {
      let mut existing = Saidata::new("nginx");
      existing.metadata.description = Some("existing desc".to_string());
      let mut fresh = Saidata::new("nginx");
      fresh.metadata.description = Some("fresh desc".to_string());

      let (merged, stats) = merge(existing, &fresh, MergeStrategy::Replace, None);
      assert_eq!(merged.metadata.description.as_deref(), Some("fresh desc"));
      assert_eq!(stats.conflicts_resolved, 1);
   }
}
