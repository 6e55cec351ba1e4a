//! Structural JSON Schema validation plus model-level invariant checks.
//!
//! Validation runs in two phases: (1) the embedded draft 2020-12 schema
//! catches structural mistakes (wrong types, unknown enum values, missing
//! required fields) before the document is even deserialized into
//! `model::Saidata`; (2) once deserialized, invariants that are awkward to
//! express in JSON Schema (checksum format, port/timeout ranges) are checked
//! directly against the typed model.

use std::sync::LazyLock;

use jsonschema::Validator;
use regex::Regex;
use serde::Serialize;

use crate::model::{Saidata, SCHEMA_VERSION};

pub const SCHEMA_JSON: &str = include_str!("../schema/saidata-0.3.json");

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| {
   let schema: serde_json::Value =
      serde_json::from_str(SCHEMA_JSON).expect("embedded schema is valid JSON");
   jsonschema::validator_for(&schema).expect("embedded schema compiles")
});

static CHECKSUM_RE: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"^[a-z0-9]+:[0-9a-f]+$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
   Error,
   Warning,
   Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
   pub path: String,
   pub message: String,
   pub severity: Severity,
   pub code: String,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub suggestion: Option<String>,
}

impl ValidationIssue {
   fn error(path: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
      Self { path: path.into(), message: message.into(), severity: Severity::Error, code: code.to_string(), suggestion: None }
   }

   fn warning(path: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
      Self { path: path.into(), message: message.into(), severity: Severity::Warning, code: code.to_string(), suggestion: None }
   }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
   pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
   pub fn is_valid(&self) -> bool {
      !self.issues.iter().any(|i| i.severity == Severity::Error)
   }

   pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
      self.issues.iter().filter(|i| i.severity == Severity::Error)
   }

   pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
      self.issues.iter().filter(|i| i.severity == Severity::Warning)
   }

   pub fn error_messages(&self) -> Vec<String> {
      self.errors().map(|e| format!("{}: {}", e.path, e.message)).collect()
   }
}

/// Phase 1: validate raw YAML/JSON text against the structural schema before
/// attempting to deserialize it into the typed model.
pub fn validate_structural(value: &serde_json::Value) -> ValidationResult {
   let mut result = ValidationResult::default();
   for error in SCHEMA.iter_errors(value) {
      result.issues.push(ValidationIssue::error(
         error.instance_path.to_string(),
         "schema",
         error.to_string(),
      ));
   }
   result
}

/// Phase 2: invariants over the typed model that are either impractical or
/// impossible to express as JSON Schema constraints.
pub fn validate_model(doc: &Saidata) -> ValidationResult {
   let mut result = ValidationResult::default();

   if doc.version != SCHEMA_VERSION {
      result.issues.push(ValidationIssue::error(
         "/version",
         "version_mismatch",
         format!("expected version '{SCHEMA_VERSION}', got '{}'", doc.version),
      ));
   }

   if doc.metadata.name.trim().is_empty() {
      result.issues.push(ValidationIssue::error("/metadata/name", "empty_name", "metadata.name must not be empty"));
   }

   if let Some(packages) = &doc.resources.packages {
      for (i, p) in packages.iter().enumerate() {
         if let Some(checksum) = &p.checksum {
            check_checksum(&mut result, &format!("/packages/{i}/checksum"), checksum);
         }
      }
   }

   if let Some(ports) = &doc.resources.ports {
      for (i, p) in ports.iter().enumerate() {
         if p.port == 0 || p.port > 65535 {
            result.issues.push(ValidationIssue::error(
               format!("/ports/{i}/port"),
               "port_out_of_range",
               format!("port {} is out of range 1..=65535", p.port),
            ));
         }
      }
   }

   if let Some(sources) = &doc.sources {
      for (i, s) in sources.iter().enumerate() {
         if let Some(checksum) = &s.checksum {
            check_checksum(&mut result, &format!("/sources/{i}/checksum"), checksum);
         }
      }
   }

   if let Some(binaries) = &doc.binaries {
      for (i, b) in binaries.iter().enumerate() {
         if let Some(checksum) = &b.checksum {
            check_checksum(&mut result, &format!("/binaries/{i}/checksum"), checksum);
         }
      }
   }

   if let Some(scripts) = &doc.scripts {
      for (i, s) in scripts.iter().enumerate() {
         if let Some(checksum) = &s.checksum {
            check_checksum(&mut result, &format!("/scripts/{i}/checksum"), checksum);
         }
         if s.timeout < 1 || s.timeout > 3600 {
            result.issues.push(ValidationIssue::error(
               format!("/scripts/{i}/timeout"),
               "timeout_out_of_range",
               format!("timeout {} is out of range 1..=3600", s.timeout),
            ));
         }
         if !s.url.starts_with("https://") {
            result.issues.push(ValidationIssue::warning(
               format!("/scripts/{i}/url"),
               "insecure_script_url",
               "script URL should use https",
            ));
         }
      }
   }

   result
}

fn check_checksum(result: &mut ValidationResult, path: &str, checksum: &str) {
   if !CHECKSUM_RE.is_match(checksum) {
      result.issues.push(ValidationIssue::error(
         path.to_string(),
         "invalid_checksum",
         format!("checksum '{checksum}' does not match '<algo>:<hex>'"),
      ));
   }
}

/// Run both validation phases against already-deserialized YAML text.
pub fn validate_yaml(raw: &str) -> crate::error::Result<(ValidationResult, Option<Saidata>)> {
   let json_value: serde_json::Value = serde_yaml::from_str::<serde_yaml::Value>(raw)
      .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
      .map_err(crate::error::SaigenError::YamlError)?;

   let structural = validate_structural(&json_value);
   if !structural.is_valid() {
      return Ok((structural, None));
   }

   match serde_yaml::from_str::<Saidata>(raw) {
      Ok(doc) => {
         let mut model_result = validate_model(&doc);
         model_result.issues.extend(structural.issues);
         Ok((model_result, Some(doc)))
      },
      Err(e) => {
         let mut result = structural;
         result.issues.push(ValidationIssue::error("/", "deserialize_failed", e.to_string()));
         Ok((result, None))
      },
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn valid_document_passes() {
      let doc = crate::model::Saidata::new("nginx");
      let yaml = serde_yaml::to_string(&doc).unwrap();
      let (result, parsed) = validate_yaml(&yaml).unwrap();
      assert!(result.is_valid(), "{:?}", result.issues);
      assert!(parsed.is_some());
   }

   #[test]
   fn wrong_version_fails() {
      let mut doc = crate::model::Saidata::new("nginx");
      doc.version = "invalid-version".to_string();
      let yaml = serde_yaml::to_string(&doc).unwrap();
      let (result, _) = validate_yaml(&yaml).unwrap();
      assert!(!result.is_valid());
   }

   #[test]
   fn bad_checksum_is_rejected() {
      let mut doc = crate::model::Saidata::new("nginx");
      doc.resources.packages = Some(vec![crate::model::Package {
         name: "nginx".into(),
         package_name: "nginx".into(),
         checksum: Some("not-a-checksum".into()),
         ..Default::default()
      }]);
      let result = validate_model(&doc);
      assert!(!result.is_valid());
   }
}
