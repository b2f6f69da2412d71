use crate::commands::storage::{ProjectSnapshot, ProjectStore};
use crate::error::Result;
use crate::templates;
use crate::workspace::CodeFile;

/// A new project: an entry page already linked to a stylesheet and a script.
pub fn create_project(project_name: &str) -> ProjectSnapshot {
    ProjectSnapshot {
        name: project_name.to_string(),
        files: vec![
            CodeFile::new("index.html", templates::index_html(project_name)),
            CodeFile::new("style.css", templates::style_css()),
            CodeFile::new("script.js", templates::script_js()),
        ],
    }
}

/// Load a project, or create and persist the starter one if it does not exist.
pub async fn open_or_create(
    store: &dyn ProjectStore,
    id: &str,
    project_name: &str,
) -> Result<ProjectSnapshot> {
    if let Some(snapshot) = store.load(id).await? {
        tracing::info!(project = id, files = snapshot.files.len(), "project loaded");
        return Ok(snapshot);
    }
    let snapshot = create_project(project_name);
    store.save(id, &snapshot).await?;
    tracing::info!(project = id, "project created from starter template");
    Ok(snapshot)
}
