//! Concurrent URL reachability filter.
//!
//! Removes URLs that don't resolve to a 2xx/3xx response. Never fails the
//! caller: any internal error leaves the document unchanged.

use std::{sync::Arc, time::Duration};

use tokio::sync::Semaphore;

use crate::model::Saidata;

enum UrlLocation {
   MetadataUrl(String),
   VulnerabilityDisclosure,
   SbomUrl,
   SigningKey,
}

pub struct UrlFilter {
   client: reqwest::Client,
   timeout: Duration,
   max_concurrent: usize,
}

impl UrlFilter {
   pub fn new(timeout_secs: u64, max_concurrent: usize) -> Self {
      Self {
         client: reqwest::Client::new(),
         timeout: Duration::from_secs(timeout_secs),
         max_concurrent,
      }
   }

   async fn is_reachable(&self, url: &str) -> bool {
      let head = self.client.head(url).timeout(self.timeout).send().await;
      let status = match head {
         Ok(resp) => Some(resp.status()),
         Err(_) => None,
      };

      let status = match status {
         Some(s) if s == reqwest::StatusCode::METHOD_NOT_ALLOWED => {
            self.client.get(url).timeout(self.timeout).send().await.ok().map(|r| r.status())
         },
         other => other,
      };

      status.is_some_and(|s| s.is_success() || s.is_redirection())
   }

   /// Filter unreachable URLs out of the document. URLs containing a
   /// templating placeholder (`{{...}}`) are left untouched and never
   /// probed, since they aren't concrete addresses yet.
   ///
   /// Scans `metadata.urls` (this covers `homepage` along with `source`,
   /// `documentation`, and any other URL the generator filed there) plus
   /// the three security disclosure URLs, which live in dedicated fields
   /// rather than the map.
   pub async fn filter(&self, mut doc: Saidata) -> Saidata {
      let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));

      let mut candidates: Vec<(UrlLocation, String)> = doc
         .metadata
         .urls
         .iter()
         .map(|(k, v)| (UrlLocation::MetadataUrl(k.clone()), v.clone()))
         .collect();
      if let Some(url) = &doc.metadata.security.vulnerability_disclosure {
         candidates.push((UrlLocation::VulnerabilityDisclosure, url.clone()));
      }
      if let Some(url) = &doc.metadata.security.sbom_url {
         candidates.push((UrlLocation::SbomUrl, url.clone()));
      }
      if let Some(url) = &doc.metadata.security.signing_key {
         candidates.push((UrlLocation::SigningKey, url.clone()));
      }

      let mut handles = Vec::new();
      for (location, url) in candidates {
         if url.contains("{{") {
            continue;
         }
         let semaphore = semaphore.clone();
         let client_self = self.clone_probe();
         handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.ok();
            let reachable = client_self.is_reachable(&url).await;
            (location, reachable)
         }));
      }

      for handle in handles {
         if let Ok((location, reachable)) = handle.await {
            if reachable {
               continue;
            }
            match location {
               UrlLocation::MetadataUrl(key) => {
                  doc.metadata.urls.remove(&key);
               },
               UrlLocation::VulnerabilityDisclosure => {
                  doc.metadata.security.vulnerability_disclosure = None;
               },
               UrlLocation::SbomUrl => {
                  doc.metadata.security.sbom_url = None;
               },
               UrlLocation::SigningKey => {
                  doc.metadata.security.signing_key = None;
               },
            }
         }
      }

      doc
   }

   fn clone_probe(&self) -> Self {
      Self { client: self.client.clone(), timeout: self.timeout, max_concurrent: self.max_concurrent }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn templated_urls_are_never_touched() {
      let filter = UrlFilter::new(1, 2);
      let mut doc = Saidata::new("nginx");
      doc.metadata.urls.insert("download".to_string(), "https://example.com/{{version}}/bin".to_string());
      let filtered = filter.filter(doc).await;
      assert!(filtered.metadata.urls.contains_key("download"));
   }

   #[tokio::test]
   async fn unreachable_security_urls_are_cleared() {
      let filter = UrlFilter::new(1, 2);
      let mut doc = Saidata::new("nginx");
      doc.metadata.security.vulnerability_disclosure = Some("https://example.invalid/disclosure".to_string());
      doc.metadata.security.sbom_url = Some("https://example.invalid/sbom".to_string());
      doc.metadata.security.signing_key = Some("https://example.invalid/key".to_string());
      let filtered = filter.filter(doc).await;
      assert!(filtered.metadata.security.vulnerability_disclosure.is_none());
      assert!(filtered.metadata.security.sbom_url.is_none());
      assert!(filtered.metadata.security.signing_key.is_none());
   }
}
