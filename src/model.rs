//! Typed representation of the saidata document (schema version "0.3").
//!
//! Field order on `Saidata` mirrors the canonical on-disk section order so
//! that `serde_yaml` emits documents in a stable, human-reviewable layout.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "0.3";

fn is_default<T: Default + PartialEq>(v: &T) -> bool {
   *v == T::default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SecurityMetadata {
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub cve_exceptions: Vec<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub security_contact: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub vulnerability_disclosure: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub sbom_url: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub signing_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metadata {
   pub name: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub display_name: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub description: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub version: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub category: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub subcategory: Option<String>,
   #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
   pub tags: BTreeSet<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub license: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub language: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub maintainer: Option<String>,
   #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
   pub urls: BTreeMap<String, String>,
   #[serde(default, skip_serializing_if = "is_default")]
   pub security: SecurityMetadata,
}

macro_rules! identity_key {
   ($ty:ty, $key:ty, $f:expr) => {
      impl $ty {
         pub fn identity_key(&self) -> $key {
            $f(self)
         }
      }
   };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Package {
   pub name: String,
   pub package_name: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub version: Option<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub alternatives: Vec<String>,
   #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
   pub install_options: BTreeMap<String, String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub repository: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub checksum: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub signature: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub download_url: Option<String>,
}
identity_key!(Package, (String, String), |p: &Self| (p.name.clone(), p.package_name.clone()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
   Systemd,
   Launchd,
   WindowsService,
   Init,
   Supervisor,
   Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
   pub name: String,
   pub service_name: String,
   #[serde(rename = "type")]
   pub service_type: ServiceType,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub enabled: Option<bool>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub config_files: Vec<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub start_command: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub stop_command: Option<String>,
}
identity_key!(Service, (String, String), |s: &Self| (s.name.clone(), s.service_name.clone()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
   Config,
   Log,
   Data,
   Binary,
   Library,
   Documentation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
   pub name: String,
   pub path: String,
   #[serde(rename = "type")]
   pub file_type: FileType,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub owner: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub group: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub mode: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub backup: Option<bool>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub template: Option<bool>,
}
identity_key!(FileEntry, (String, String), |f: &Self| (f.name.clone(), f.path.clone()));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
   pub name: String,
   pub path: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub owner: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub group: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub mode: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub create: Option<bool>,
}
identity_key!(Directory, (String, String), |d: &Self| (d.name.clone(), d.path.clone()));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
   pub name: String,
   pub path: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub shell_completion: Option<bool>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub man_page: Option<bool>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub description: Option<String>,
}
identity_key!(Command, (String, String), |c: &Self| (c.name.clone(), c.path.clone()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
   Tcp,
   Udp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
   pub port: u32,
   pub protocol: Protocol,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub service: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub description: Option<String>,
}
identity_key!(Port, (u32, Protocol), |p: &Self| (p.port, p.protocol));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
   Autotools,
   Cmake,
   Make,
   Meson,
   Ninja,
   Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
   pub name: String,
   pub url: String,
   pub build_system: BuildSystem,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub configure_args: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub build_args: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub install_args: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub prerequisites: Vec<String>,
   #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
   pub environment: BTreeMap<String, String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub install_prefix: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub checksum: Option<String>,
}
identity_key!(Source, String, |s: &Self| s.name.clone());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
   Zip,
   #[serde(rename = "tar.gz")]
   TarGz,
   None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ArchiveSpec {
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub format: Option<ArchiveFormat>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub strip_prefix: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub extract_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binary {
   pub name: String,
   /// May contain `{{version}}`, `{{platform}}`, `{{architecture}}` placeholders.
   pub url: String,
   #[serde(default = "default_install_path")]
   pub install_path: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub executable: Option<String>,
   #[serde(default, skip_serializing_if = "is_default")]
   pub archive: ArchiveSpec,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub permissions: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub checksum: Option<String>,
}
identity_key!(Binary, String, |b: &Self| b.name.clone());

fn default_install_path() -> String {
   "/usr/local/bin".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
   pub name: String,
   /// Should use https.
   pub url: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub interpreter: Option<String>,
   /// Seconds, must be in 1..=3600.
   #[serde(default = "default_script_timeout")]
   pub timeout: u32,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub arguments: Vec<String>,
   #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
   pub environment: BTreeMap<String, String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub working_dir: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub checksum: Option<String>,
}
identity_key!(Script, String, |s: &Self| s.name.clone());

fn default_script_timeout() -> u32 {
   300
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceSet {
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub packages: Option<Vec<Package>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub services: Option<Vec<Service>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub files: Option<Vec<FileEntry>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub directories: Option<Vec<Directory>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub commands: Option<Vec<Command>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub ports: Option<Vec<Port>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub containers: Option<Vec<serde_yaml::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
   #[serde(flatten)]
   pub resources: ResourceSet,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub prerequisites: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub build_commands: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub package_sources: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub repositories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityEntry {
   pub provider: String,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub platform: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub architecture: Vec<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub os_version: Vec<String>,
   #[serde(default)]
   pub supported: bool,
   #[serde(default)]
   pub tested: bool,
   #[serde(default)]
   pub recommended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Compatibility {
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub matrix: Vec<CompatibilityEntry>,
   #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
   pub versions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saidata {
   pub version: String,
   pub metadata: Metadata,
   #[serde(flatten)]
   pub resources: ResourceSet,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub sources: Option<Vec<Source>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub binaries: Option<Vec<Binary>>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub scripts: Option<Vec<Script>>,
   #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
   pub providers: BTreeMap<String, ProviderConfig>,
   #[serde(default, skip_serializing_if = "is_default")]
   pub compatibility: Compatibility,
}

impl Saidata {
   pub fn new(name: impl Into<String>) -> Self {
      Self {
         version: SCHEMA_VERSION.to_string(),
         metadata: Metadata { name: name.into(), ..Metadata::default() },
         resources: ResourceSet::default(),
         sources: None,
         binaries: None,
         scripts: None,
         providers: BTreeMap::new(),
         compatibility: Compatibility::default(),
      }
   }

   pub fn is_current_version(&self) -> bool {
      self.version == SCHEMA_VERSION
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPackage {
   pub name: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub version: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub description: Option<String>,
   pub repository_name: String,
   pub platform: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub category: Option<String>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub tags: Vec<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub homepage: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub maintainer: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub license: Option<String>,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub last_updated: Option<String>,
}

impl RepositoryPackage {
   pub fn identity_key(&self) -> (String, String) {
      (self.name.clone(), self.repository_name.clone())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn new_saidata_is_current_version() {
      let doc = Saidata::new("nginx");
      assert!(doc.is_current_version());
      assert_eq!(doc.metadata.name, "nginx");
   }

   #[test]
   fn package_identity_key_is_name_and_package_name() {
      let p = Package { name: "nginx".into(), package_name: "nginx".into(), ..Package::default() };
      assert_eq!(p.identity_key(), ("nginx".to_string(), "nginx".to_string()));
   }

   #[test]
   fn empty_resource_sections_are_omitted_on_serialize() {
      let doc = Saidata::new("redis");
      let yaml = serde_yaml::to_string(&doc).unwrap();
      assert!(!yaml.contains("packages:"));
      assert!(!yaml.contains("providers:"));
   }
}
