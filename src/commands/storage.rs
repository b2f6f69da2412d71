use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::sanitize_id;
use crate::workspace::{CodeFile, Workspace};

/// What gets persisted for one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub name: String,
    pub files: Vec<CodeFile>,
}

impl ProjectSnapshot {
    pub fn from_workspace(name: impl Into<String>, workspace: &Workspace) -> Self {
        Self {
            name: name.into(),
            files: workspace.files().to_vec(),
        }
    }

    pub fn into_workspace(self) -> Workspace {
        Workspace::from_files(self.files)
    }
}

/// Load/save boundary for projects. Saves replace the whole project.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<ProjectSnapshot>>;
    async fn save(&self, id: &str, snapshot: &ProjectSnapshot) -> Result<()>;
    async fn list(&self) -> Result<Vec<String>>;
}

/// One pretty-printed JSON file per project under a root directory.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_id(id)))
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn load(&self, id: &str) -> Result<Option<ProjectSnapshot>> {
        let path = self.path_for(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, id: &str, snapshot: &ProjectSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&tmp, json).await?;
        // Rename is atomic on the same filesystem: readers see old or new, never half.
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(project = id, files = snapshot.files.len(), "project saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
