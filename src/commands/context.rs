use crate::workspace::Workspace;

/// Renders every file as a fenced section the model can read back.
///
/// The fences use the same `lang:name` shape the model is expected to answer
/// with, so it sees its own output format.
pub fn files_context(workspace: &Workspace) -> String {
    let mut out = String::new();
    for file in workspace.files() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "```{}:{}\n{}\n```\n",
            file.language.as_str(),
            file.name,
            file.content.trim_end_matches('\n')
        ));
    }
    out
}

/// Name of the file the user is looking at, or an empty string.
pub fn current_file(workspace: &Workspace) -> String {
    workspace.active_name().unwrap_or_default().to_string()
}
