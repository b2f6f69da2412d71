use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use zip::write::SimpleFileOptions;

use crate::error::{ForgeError, Result};
use crate::workspace::{CodeFile, Workspace};

/// Pack every file into a zip archive, one entry per file, in workspace order.
pub fn export_archive(workspace: &Workspace) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for file in workspace.files() {
        zip.start_file(file.name.as_str(), options)?;
        zip.write_all(file.content.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Rebuild a workspace from an archive produced by [`export_archive`] (or any
/// zip of text files). Directory entries are skipped.
pub fn import_archive(bytes: &[u8]) -> Result<Workspace> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut files = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        files.push(CodeFile::new(name, String::from_utf8_lossy(&raw)));
    }
    Ok(Workspace::from_files(files))
}

/// Write the archive to disk. Zip work is sync, so it runs on the blocking pool.
pub async fn export_to_path(workspace: Workspace, path: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let bytes = export_archive(&workspace)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(path)
    })
    .await
    .map_err(|e| ForgeError::Custom(e.to_string()))?
}
