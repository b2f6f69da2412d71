use serde::{Deserialize, Serialize};

use crate::blocks::ParsedBlock;
use crate::error::{ForgeError, Result};
use crate::util::extension_of;

/// File kind, keyed by extension. Composition dispatches on this tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    Html,
    Css,
    JavaScript,
    Other(String),
}

impl Language {
    /// Parse a language tag as written after a code fence or stored on disk.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Language::Html,
            "css" => Language::Css,
            "javascript" | "js" | "mjs" => Language::JavaScript,
            other => Language::Other(other.to_string()),
        }
    }

    /// The extension wins when it names a known kind, otherwise the block's tag.
    pub fn for_file(name: &str, tag: &str) -> Self {
        match extension_of(name).map(|ext| Language::from_tag(&ext)) {
            Some(Language::Other(ext)) if tag.trim().is_empty() => Language::Other(ext),
            Some(Language::Other(_)) | None => Language::from_tag(tag),
            Some(known) => known,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Language::Html => "html",
            Language::Css => "css",
            Language::JavaScript => "javascript",
            Language::Other(tag) => tag,
        }
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        Language::from_tag(&tag)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    pub name: String,
    pub content: String,
    pub language: Language,
}

impl CodeFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let language = Language::for_file(&name, "");
        Self {
            name,
            content: content.into(),
            language,
        }
    }
}

/// Outcome of reconciling one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
}

/// Ordered, name-unique collection of files plus the active-file pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Workspace {
    files: Vec<CodeFile>,
    active: Option<String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored files. Later duplicates overwrite earlier ones;
    /// the first file becomes active.
    pub fn from_files(files: Vec<CodeFile>) -> Self {
        let mut workspace = Self::new();
        for file in files {
            workspace.upsert(file);
        }
        workspace.active = workspace.files.first().map(|f| f.name.clone());
        workspace
    }

    pub fn files(&self) -> &[CodeFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<CodeFile> {
        self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CodeFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_file(&self) -> Option<&CodeFile> {
        self.active.as_deref().and_then(|name| self.get(name))
    }

    /// Reconcile one parsed block: update in place by exact name, else append.
    /// The active pointer follows the write.
    pub fn apply(&mut self, block: ParsedBlock) -> Applied {
        let language = Language::for_file(&block.name, &block.language);
        let name = block.name.clone();
        let applied = self.upsert(CodeFile {
            name: block.name,
            content: block.content,
            language,
        });
        self.active = Some(name);
        applied
    }

    fn upsert(&mut self, file: CodeFile) -> Applied {
        if let Some(existing) = self.files.iter_mut().find(|f| f.name == file.name) {
            existing.content = file.content;
            existing.language = file.language;
            Applied::Updated
        } else {
            self.files.push(file);
            Applied::Created
        }
    }

    /// User-initiated "add file". Refuses to touch an existing name.
    pub fn add_file(&mut self, name: &str, content: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ForgeError::Custom("File name cannot be empty".into()));
        }
        if self.get(name).is_some() {
            tracing::warn!(file = name, "refusing to add duplicate file");
            return Err(ForgeError::DuplicateFile(name.to_string()));
        }
        self.files.push(CodeFile::new(name, content));
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Delete a file. If it was active, the first remaining file becomes active.
    pub fn remove_file(&mut self, name: &str) -> Result<CodeFile> {
        let index = self
            .files
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| ForgeError::FileNotFound(name.to_string()))?;
        let removed = self.files.remove(index);
        if self.active.as_deref() == Some(name) {
            self.active = self.files.first().map(|f| f.name.clone());
        }
        Ok(removed)
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if self.get(name).is_none() {
            return Err(ForgeError::FileNotFound(name.to_string()));
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Replace the active file's content (a direct user edit).
    /// Returns whether the content actually changed.
    pub fn edit_active(&mut self, content: &str) -> Result<bool> {
        let name = self
            .active
            .clone()
            .ok_or_else(|| ForgeError::Custom("No file is open".into()))?;
        let file = self
            .files
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or(ForgeError::FileNotFound(name))?;
        if file.content == content {
            return Ok(false);
        }
        file.content = content.to_string();
        Ok(true)
    }
}
