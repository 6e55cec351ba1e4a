//! Brute-force flat vector index over repository packages and saidata
//! documents.
//!
//! No approximate-nearest-neighbor crate is available in this corpus, so the
//! index is exactly what a `faiss.IndexFlatIP` already is under the hood: a
//! linear scan over L2-normalized vectors scored by dot product. At the
//! scale this system operates at (tens of thousands of packages, not
//! billions) a flat scan is not a compromise.

use std::{
   path::{Path, PathBuf},
   sync::Arc,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::embedder::{Embed, HashingEmbedder, dot, normalize};
use crate::{
   error::{Result, SaigenError},
   model::{RepositoryPackage, Saidata},
};

const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SaidataMetaEntry {
   name: String,
   path: PathBuf,
}

#[derive(Default, Serialize, Deserialize)]
struct VectorStore<M> {
   vectors: Vec<Vec<f32>>,
   metadata: Vec<M>,
}

impl<M> VectorStore<M> {
   fn search(&self, query: &[f32], limit: usize, min_score: f32) -> Vec<(usize, f32)> {
      let mut scored: Vec<(usize, f32)> =
         self.vectors.iter().enumerate().map(|(i, v)| (i, dot(query, v))).collect();
      scored.sort_by(|a, b| b.1.total_cmp(&a.1));
      scored.into_iter().filter(|(_, score)| *score >= min_score).take(limit).collect()
   }
}

#[derive(Serialize, Deserialize)]
struct ModelInfo {
   model_name: String,
   dimensions: usize,
   last_updated: Option<String>,
}

pub struct RagIndexer {
   index_dir: PathBuf,
   embedder: Arc<dyn Embed>,
   packages: RwLock<VectorStore<RepositoryPackage>>,
   saidata: RwLock<VectorStore<SaidataMetaEntry>>,
}

impl RagIndexer {
   pub fn new(index_dir: impl Into<PathBuf>) -> Self {
      Self::with_embedder(index_dir, Arc::new(HashingEmbedder::default()))
   }

   pub fn with_embedder(index_dir: impl Into<PathBuf>, embedder: Arc<dyn Embed>) -> Self {
      let index_dir = index_dir.into();
      let packages = load_store(&index_dir.join("packages")).unwrap_or_default();
      let saidata = load_store(&index_dir.join("saidata")).unwrap_or_default();
      Self { index_dir, embedder, packages: RwLock::new(packages), saidata: RwLock::new(saidata) }
   }

   fn package_text(pkg: &RepositoryPackage) -> String {
      format!(
         "{} {} category: {} tags: {} maintainer: {} repository: {} platform: {}",
         pkg.name,
         pkg.description.as_deref().unwrap_or_default(),
         pkg.category.as_deref().unwrap_or_default(),
         pkg.tags.join(", "),
         pkg.maintainer.as_deref().unwrap_or_default(),
         pkg.repository_name,
         pkg.platform,
      )
   }

   fn saidata_text(doc: &Saidata) -> String {
      let providers: Vec<&str> = doc.providers.keys().map(String::as_str).collect();
      let package_names: Vec<String> = doc
         .providers
         .values()
         .filter_map(|p| p.resources.packages.as_ref())
         .flatten()
         .map(|p| p.package_name.clone())
         .collect();
      format!(
         "{} {} {} category: {} subcategory: {} tags: {} language: {} providers: {} {}",
         doc.metadata.name,
         doc.metadata.display_name.as_deref().unwrap_or_default(),
         doc.metadata.description.as_deref().unwrap_or_default(),
         doc.metadata.category.as_deref().unwrap_or_default(),
         doc.metadata.subcategory.as_deref().unwrap_or_default(),
         doc.metadata.tags.iter().cloned().collect::<Vec<_>>().join(", "),
         doc.metadata.language.as_deref().unwrap_or_default(),
         providers.join(", "),
         package_names.join(", "),
      )
   }

   /// Build (or extend) the package index from a batch of repository
   /// packages. CPU-bound embedding work runs on a blocking thread so the
   /// async runtime is never stalled.
   pub async fn index_packages(&self, packages: Vec<RepositoryPackage>) -> Result<()> {
      let embedder = self.embedder.clone();
      let chunks: Vec<Vec<RepositoryPackage>> =
         packages.chunks(BATCH_SIZE).map(<[RepositoryPackage]>::to_vec).collect();

      let mut all_vectors = Vec::new();
      let mut all_meta = Vec::new();
      for chunk in chunks {
         let embedder = embedder.clone();
         let (vectors, meta) = tokio::task::spawn_blocking(move || {
            let texts: Vec<String> = chunk.iter().map(Self::package_text).collect();
            let mut vectors = embedder.embed_batch(&texts);
            for v in &mut vectors {
               normalize(v);
            }
            (vectors, chunk)
         })
         .await
         .map_err(|e| SaigenError::RagError(format!("embedding task panicked: {e}")))?;
         all_vectors.extend(vectors);
         all_meta.extend(meta);
      }

      let mut store = self.packages.write();
      store.vectors.extend(all_vectors);
      store.metadata.extend(all_meta);
      drop(store);
      self.persist_packages()
   }

   pub async fn index_saidata(&self, docs: Vec<(PathBuf, Saidata)>) -> Result<()> {
      let embedder = self.embedder.clone();
      let chunks: Vec<Vec<(PathBuf, Saidata)>> =
         docs.chunks(BATCH_SIZE).map(<[(PathBuf, Saidata)]>::to_vec).collect();

      let mut all_vectors = Vec::new();
      let mut all_meta = Vec::new();
      for chunk in chunks {
         let embedder = embedder.clone();
         let (vectors, meta) = tokio::task::spawn_blocking(move || {
            let texts: Vec<String> = chunk.iter().map(|(_, d)| Self::saidata_text(d)).collect();
            let mut vectors = embedder.embed_batch(&texts);
            for v in &mut vectors {
               normalize(v);
            }
            let meta: Vec<SaidataMetaEntry> = chunk
               .into_iter()
               .map(|(path, d)| SaidataMetaEntry { name: d.metadata.name, path })
               .collect();
            (vectors, meta)
         })
         .await
         .map_err(|e| SaigenError::RagError(format!("embedding task panicked: {e}")))?;
         all_vectors.extend(vectors);
         all_meta.extend(meta);
      }

      let mut store = self.saidata.write();
      store.vectors.extend(all_vectors);
      store.metadata.extend(all_meta);
      drop(store);
      self.persist_saidata()
   }

   pub async fn search_similar_packages(
      &self,
      query: &str,
      limit: usize,
      min_score: f32,
   ) -> Result<Vec<RepositoryPackage>> {
      let embedder = self.embedder.clone();
      let query = query.to_string();
      let mut query_vec =
         tokio::task::spawn_blocking(move || embedder.embed_batch(&[query])[0].clone())
            .await
            .map_err(|e| SaigenError::RagError(format!("embedding task panicked: {e}")))?;
      normalize(&mut query_vec);

      let store = self.packages.read();
      let hits = store.search(&query_vec, limit * 2, min_score);
      Ok(hits.into_iter().take(limit).map(|(i, _)| store.metadata[i].clone()).collect())
   }

   pub async fn find_similar_saidata(
      &self,
      software_name: &str,
      limit: usize,
      min_score: f32,
   ) -> Result<Vec<Saidata>> {
      let embedder = self.embedder.clone();
      let query = format!("{software_name} software application");
      let mut query_vec =
         tokio::task::spawn_blocking(move || embedder.embed_batch(&[query])[0].clone())
            .await
            .map_err(|e| SaigenError::RagError(format!("embedding task panicked: {e}")))?;
      normalize(&mut query_vec);

      let store = self.saidata.read();
      let hits = store.search(&query_vec, limit * 2, min_score);
      let mut out = Vec::new();
      for (i, _) in hits.into_iter().take(limit) {
         let path = &store.metadata[i].path;
         if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(doc) = serde_yaml::from_str::<Saidata>(&contents) {
               out.push(doc);
            }
         }
      }
      Ok(out)
   }

   pub fn rebuild_clear(&self) -> Result<()> {
      self.packages.write().vectors.clear();
      self.packages.write().metadata.clear();
      self.saidata.write().vectors.clear();
      self.saidata.write().metadata.clear();
      self.persist_packages()?;
      self.persist_saidata()
   }

   pub fn stats(&self) -> (usize, usize) {
      (self.packages.read().vectors.len(), self.saidata.read().vectors.len())
   }

   fn persist_packages(&self) -> Result<()> {
      std::fs::create_dir_all(&self.index_dir)?;
      let store = self.packages.read();
      write_store(&self.index_dir.join("packages"), &store)?;
      self.write_model_info()
   }

   fn persist_saidata(&self) -> Result<()> {
      std::fs::create_dir_all(&self.index_dir)?;
      let store = self.saidata.read();
      write_store(&self.index_dir.join("saidata"), &store)?;
      self.write_model_info()
   }

   fn write_model_info(&self) -> Result<()> {
      let info = ModelInfo {
         model_name: self.embedder.model_name().to_string(),
         dimensions: self.embedder.dimensions(),
         last_updated: None,
      };
      let path = self.index_dir.join("model_info.json");
      std::fs::write(path, serde_json::to_vec_pretty(&info)?)?;
      Ok(())
   }
}

fn load_store<M: serde::de::DeserializeOwned>(prefix: &Path) -> Option<VectorStore<M>> {
   let vec_path = prefix.with_extension("vec.json");
   let meta_path = prefix.with_extension("meta.json");
   let vectors: Vec<Vec<f32>> = serde_json::from_slice(&std::fs::read(vec_path).ok()?).ok()?;
   let metadata: Vec<M> = serde_json::from_slice(&std::fs::read(meta_path).ok()?).ok()?;
   Some(VectorStore { vectors, metadata })
}

fn write_store<M: Serialize>(prefix: &Path, store: &VectorStore<M>) -> Result<()> {
   std::fs::write(prefix.with_extension("vec.json"), serde_json::to_vec(&store.vectors)?)?;
   std::fs::write(prefix.with_extension("meta.json"), serde_json::to_vec(&store.metadata)?)?;
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;

   fn pkg(name: &str, description: &str) -> RepositoryPackage {
      RepositoryPackage {
         name: name.to_string(),
         version: None,
         description: Some(description.to_string()),
         repository_name: "test-repo".to_string(),
         platform: "linux".to_string(),
         category: None,
         tags: vec![],
         homepage: None,
         maintainer: None,
         license: None,
         last_updated: None,
      }
   }

   #[tokio::test]
   async fn search_returns_closest_package_first() {
      let dir = tempdir();
      let indexer = RagIndexer::new(&dir);
      indexer
         .index_packages(vec![
            pkg("nginx", "high performance web server"),
            pkg("postgresql", "object-relational database system"),
         ])
         .await
         .unwrap();

      let hits = indexer.search_similar_packages("web server http", 1, 0.0).await.unwrap();
      assert_eq!(hits.len(), 1);
      assert_eq!(hits[0].name, "nginx");
   }

   fn tempdir() -> PathBuf {
      let mut p = std::env::temp_dir();
      p.push(format!("saigen-rag-test-{:?}", std::thread::current().id()));
      p
   }
}
