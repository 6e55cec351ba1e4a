//! Removes per-provider resource overrides that are identical to the
//! corresponding top-level default.

use std::collections::HashMap;

use crate::model::{Command, Directory, FileEntry, Package, Port, Saidata, Service};

fn dedupe_vec<T, K: Eq + std::hash::Hash>(
   provider_items: Vec<T>,
   top_level_index: &HashMap<K, &T>,
   key_of: impl Fn(&T) -> K,
   equal_ignoring_identity: impl Fn(&T, &T) -> bool,
) -> Option<Vec<T>> {
   let kept: Vec<T> = provider_items
      .into_iter()
      .filter(|item| {
         let key = key_of(item);
         match top_level_index.get(&key) {
            Some(top_level) => !equal_ignoring_identity(item, top_level),
            None => true,
         }
      })
      .collect();
   if kept.is_empty() { None } else { Some(kept) }
}

fn index_by<T, K: Eq + std::hash::Hash>(items: &Option<Vec<T>>, key_of: impl Fn(&T) -> K) -> HashMap<K, &T> {
   items
      .as_ref()
      .map(|v| v.iter().map(|i| (key_of(i), i)).collect())
      .unwrap_or_default()
}

/// Prune every provider's resource sections against the root defaults.
/// Idempotent: running it twice produces the same result, and it never
/// changes the *effective* set of active records, since a dropped provider
/// record was, by construction, identical to the root default it would have
/// overridden.
pub fn deduplicate(mut doc: Saidata) -> Saidata {
   let package_index = index_by(&doc.resources.packages, Package::identity_key);
   let service_index = index_by(&doc.resources.services, Service::identity_key);
   let file_index = index_by(&doc.resources.files, FileEntry::identity_key);
   let directory_index = index_by(&doc.resources.directories, Directory::identity_key);
   let command_index = index_by(&doc.resources.commands, Command::identity_key);
   let port_index = index_by(&doc.resources.ports, Port::identity_key);

   for provider in doc.providers.values_mut() {
      if let Some(packages) = provider.resources.packages.take() {
         provider.resources.packages = dedupe_vec(packages, &package_index, Package::identity_key, packages_equal);
      }
      if let Some(services) = provider.resources.services.take() {
         provider.resources.services = dedupe_vec(services, &service_index, Service::identity_key, services_equal);
      }
      if let Some(files) = provider.resources.files.take() {
         provider.resources.files = dedupe_vec(files, &file_index, FileEntry::identity_key, files_equal);
      }
      if let Some(directories) = provider.resources.directories.take() {
         provider.resources.directories =
            dedupe_vec(directories, &directory_index, Directory::identity_key, directories_equal);
      }
      if let Some(commands) = provider.resources.commands.take() {
         provider.resources.commands = dedupe_vec(commands, &command_index, Command::identity_key, commands_equal);
      }
      if let Some(ports) = provider.resources.ports.take() {
         provider.resources.ports = dedupe_vec(ports, &port_index, Port::identity_key, ports_equal);
      }
   }

   doc
}

fn packages_equal(a: &Package, b: &Package) -> bool {
   a.version == b.version
      && a.alternatives == b.alternatives
      && a.install_options == b.install_options
      && a.repository == b.repository
      && a.checksum == b.checksum
      && a.signature == b.signature
      && a.download_url == b.download_url
}

fn services_equal(a: &Service, b: &Service) -> bool {
   a.service_type == b.service_type
      && a.enabled == b.enabled
      && a.config_files == b.config_files
      && a.start_command == b.start_command
      && a.stop_command == b.stop_command
}

fn files_equal(a: &FileEntry, b: &FileEntry) -> bool {
   a.file_type == b.file_type
      && a.owner == b.owner
      && a.group == b.group
      && a.mode == b.mode
      && a.backup == b.backup
      && a.template == b.template
}

fn directories_equal(a: &Directory, b: &Directory) -> bool {
   a.owner == b.owner && a.group == b.group && a.mode == b.mode && a.create == b.create
}

fn commands_equal(a: &Command, b: &Command) -> bool {
   a.shell_completion == b.shell_completion && a.man_page == b.man_page && a.description == b.description
}

fn ports_equal(a: &Port, b: &Port) -> bool {
   a.service == b.service && a.description == b.description
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::model::ProviderConfig;

   #[test]
   fn identical_provider_package_is_dropped() {
      let mut doc = Saidata::new("nginx");
      doc.resources.packages = Some(vec![Package {
         name: "nginx".into(),
         package_name: "nginx".into(),
         ..Default::default()
      }]);

      let mut apt = ProviderConfig::default();
      apt.resources.packages =
         Some(vec![Package { name: "nginx".into(), package_name: "nginx".into(), ..Default::default() }]);
      doc.providers.insert("apt".to_string(), apt);

      let mut dnf = ProviderConfig::default();
      dnf.resources.packages =
         Some(vec![Package { name: "nginx".into(), package_name: "httpd".into(), ..Default::default() }]);
      doc.providers.insert("dnf".to_string(), dnf);

      let deduped = deduplicate(doc);
      assert!(deduped.providers["apt"].resources.packages.is_none());
      assert_eq!(
         deduped.providers["dnf"].resources.packages.as_ref().unwrap()[0].package_name,
         "httpd"
      );
   }

   #[test]
   fn dedup_is_idempotent() {
      let mut doc = Saidata::new("nginx");
      doc.resources.packages = Some(vec![Package {
         name: "nginx".into(),
         package_name: "nginx".into(),
         ..Default::default()
      }]);
      let mut apt = ProviderConfig::default();
      apt.resources.packages =
         Some(vec![Package { name: "nginx".into(), package_name: "nginx".into(), ..Default::default() }]);
      doc.providers.insert("apt".to_string(), apt);

      let once = deduplicate(doc);
      let twice = deduplicate(once.clone());
      assert_eq!(once, twice);
   }
}
