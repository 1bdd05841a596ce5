//! Artifact persistence under the output directory.
//!
//! ```text
//! <root>/items/<item_id>.json
//! <root>/logs/log-<session_id>-<YYYYmmddHHMMSS>.json
//! <root>/images/<image_id>.<png|jpg|gif|webp>
//! <root>/extractions/<stem>-<YYYYmmddHHMMSS>.json
//! ```

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use vigen_core::{GenerationLog, Question};

/// Errors writing or reading artifacts.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes pipeline and extraction artifacts as pretty JSON.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn items_dir(&self) -> PathBuf {
        self.root.join("items")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn extractions_dir(&self) -> PathBuf {
        self.root.join("extractions")
    }

    pub async fn save_question(&self, question: &Question) -> Result<PathBuf, StoreError> {
        let path = self.items_dir().join(format!("{}.json", question.item_id));
        write_json(&path, question).await?;
        tracing::debug!(item_id = %question.item_id, path = %path.display(), "Saved item");
        Ok(path)
    }

    pub async fn load_question(&self, item_id: &str) -> Result<Question, StoreError> {
        let path = self.items_dir().join(format!("{}.json", item_id));
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn save_log(&self, log: &GenerationLog) -> Result<PathBuf, StoreError> {
        let path = self
            .logs_dir()
            .join(format!("log-{}-{}.json", log.session_id, timestamp()));
        write_json(&path, log).await?;
        Ok(path)
    }

    /// Write raw image bytes to `images/<image_id>.<extension>`.
    pub async fn save_image(&self, image_id: &str, extension: &str, data: &[u8]) -> Result<PathBuf, StoreError> {
        let dir = self.images_dir();
        create_dir(&dir).await?;
        let path = dir.join(format!("{}.{}", image_id, extension));
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Write an extraction run, named after the source document's stem.
    pub async fn save_extraction<T: Serialize>(&self, source: &str, run: &T) -> Result<PathBuf, StoreError> {
        let stem = Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("extraction");
        let path = self
            .extractions_dir()
            .join(format!("{}-{}.json", stem, timestamp()));
        write_json(&path, run).await?;
        Ok(path)
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

async fn create_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        create_dir(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}
