//! Composes one self-contained HTML document out of a workspace.
//!
//! This is text substitution, not HTML parsing: only `<link ... href="x.css">`
//! and `<script ... src="x.js"></script>` shapes are recognised. Irregular
//! markup that does not match is left as is. Tag and attribute names match
//! in any case; file names match exactly.

use regex::{NoExpand, Regex};

use crate::error::{ForgeError, Result};
use crate::util::extension_of;
use crate::workspace::{CodeFile, Workspace};

pub const ENTRY_DOCUMENT: &str = "index.html";

/// Compose the preview for the workspace's entry document.
pub fn compose(workspace: &Workspace) -> Result<String> {
    let entry = entry_document(workspace).ok_or(ForgeError::NoEntryDocument)?;
    let mut html = entry.content.clone();

    for file in workspace.files() {
        if file.name == entry.name {
            continue;
        }
        html = match extension_of(&file.name).as_deref() {
            Some("css") => inline_stylesheet(&html, file)?,
            Some("js") => inline_script(&html, file)?,
            _ => continue,
        };
    }
    Ok(html)
}

/// `index.html` if present, else the active file.
pub fn entry_document(workspace: &Workspace) -> Option<&CodeFile> {
    workspace
        .get(ENTRY_DOCUMENT)
        .or_else(|| workspace.active_file())
}

fn inline_stylesheet(html: &str, file: &CodeFile) -> Result<String> {
    let pattern = format!(
        r#"(?i)<link\b[^>]*?\bhref\s*=\s*["'](?:\./)?(?-i:{})["'][^>]*>"#,
        regex::escape(&file.name)
    );
    let replacement = format!("<style>\n{}\n</style>", file.content);
    substitute(html, &pattern, &replacement)
}

fn inline_script(html: &str, file: &CodeFile) -> Result<String> {
    let pattern = format!(
        r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["'](?:\./)?(?-i:{})["'][^>]*>\s*</script\s*>"#,
        regex::escape(&file.name)
    );
    let replacement = format!("<script>\n{}\n</script>", file.content);
    substitute(html, &pattern, &replacement)
}

fn substitute(html: &str, pattern: &str, replacement: &str) -> Result<String> {
    let re = Regex::new(pattern).map_err(|e| ForgeError::Custom(e.to_string()))?;
    Ok(re.replace_all(html, NoExpand(replacement)).into_owned())
}
