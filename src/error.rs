/// All errors surfaced by the code-generation core and its boundaries.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend responded with HTTP {0}")]
    Status(u16),

    #[error("A file named \"{0}\" already exists")]
    DuplicateFile(String),

    #[error("No file named \"{0}\"")]
    FileNotFound(String),

    #[error("No entry document to preview (add an index.html)")]
    NoEntryDocument,

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
