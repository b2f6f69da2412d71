use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};

pub mod backend;
pub mod blocks;
pub mod commands;
pub mod error;
mod host;
pub mod preview;
pub mod session;
pub mod stream;
mod templates;
pub mod util;
pub mod workspace;

pub use error::{ForgeError, Result};
pub use session::{ActionStatus, Session, SessionEvent, SessionSettings};
pub use workspace::{CodeFile, Workspace};

use backend::{HttpBackend, ModelBackend};
use commands::config::{self, ProjectEntry};
use commands::logs::{unix_timestamp, TranscriptLogger};
use commands::project;
use commands::storage::{JsonFileStore, ProjectSnapshot, ProjectStore};
use host::{Command, PreviewFile};

/// What the terminal host was asked to open.
#[derive(Clone, Debug)]
pub struct HostOptions {
    pub project: String,
    /// Print session events as JSON lines instead of text.
    pub json: bool,
}

type SharedWorkspace = Arc<Mutex<Workspace>>;
type SharedPreview = Arc<Mutex<PreviewFile>>;

/// Run an interactive session on stdin/stdout until `:quit` or end of input.
pub async fn run(options: HostOptions) -> anyhow::Result<()> {
    let config = config::load_config();
    let data_dir = config.data_dir();
    let id = util::sanitize_id(&options.project);

    let store = JsonFileStore::new(data_dir.join("projects"));
    let snapshot = project::open_or_create(&store, &id, &options.project).await?;
    let project_name = snapshot.name.clone();

    let entry = ProjectEntry {
        id: id.clone(),
        name: project_name.clone(),
        updated_at: unix_timestamp(),
    };
    if let Err(e) = config::save_project_entry(&config::config_path(), entry) {
        tracing::warn!(error = %e, "could not record project in config");
    }

    let transcript = TranscriptLogger::open(&data_dir.join("logs").join(&id), &project_name).await;

    let backend: Arc<dyn ModelBackend> =
        Arc::new(HttpBackend::new(config.endpoint.clone(), config.api_key.clone()));
    let (mut session, events) = Session::new(
        snapshot.into_workspace(),
        backend,
        config.session_settings(),
    );
    if let Some(logger) = &transcript {
        session = session.with_transcript(logger.sender());
    }
    tracing::info!(project = %id, endpoint = %config.endpoint, "session started");

    let workspace = session.workspace();
    let preview: SharedPreview = Arc::new(Mutex::new(PreviewFile::new(
        data_dir.join("previews").join(format!("{id}.html")),
    )));
    refresh_preview(&workspace, &preview).await;

    let printer = tokio::spawn(print_events(
        events,
        workspace.clone(),
        preview.clone(),
        options.json,
    ));

    let out = Output { json: options.json };
    out.say(&format!(
        "{project_name} ({} files). Type :help for commands.",
        workspace.lock().await.len()
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match host::parse_command(&line) {
            Command::Quit => break,
            Command::Empty => {}
            Command::Prompt(prompt) => session.submit(prompt).await,
            Command::Cancel => session.cancel().await,
            Command::Help => out.say(host::HELP),
            Command::Files => out.say(&host::render_files(&*workspace.lock().await)),
            Command::Open(name) => {
                if let Err(e) = edit_workspace(&workspace, &preview, |ws| ws.set_active(&name)).await {
                    out.fail(&e);
                }
            }
            Command::Add(name) => {
                match edit_workspace(&workspace, &preview, |ws| ws.add_file(&name, "")).await {
                    Ok(()) => out.say(&format!("added {name}")),
                    Err(e) => out.fail(&e),
                }
            }
            Command::Remove(name) => {
                match edit_workspace(&workspace, &preview, |ws| ws.remove_file(&name)).await {
                    Ok(_) => out.say(&format!("removed {name}")),
                    Err(e) => out.fail(&e),
                }
            }
            Command::Edit => {
                let Some(content) = read_edit_body(&mut lines).await? else {
                    break;
                };
                match edit_workspace(&workspace, &preview, |ws| ws.edit_active(&content)).await {
                    Ok(true) => {}
                    Ok(false) => out.say("no changes"),
                    Err(e) => out.fail(&e),
                }
            }
            Command::Save => {
                let snapshot = ProjectSnapshot::from_workspace(&project_name, &*workspace.lock().await);
                match store.save(&id, &snapshot).await {
                    Ok(()) => out.say(&format!("saved {} files", snapshot.files.len())),
                    Err(e) => out.fail(&e),
                }
            }
            Command::Export(path) => {
                let copy = workspace.lock().await.clone();
                match commands::export::export_to_path(copy, util::expand_tilde(&path)).await {
                    Ok(written) => out.say(&format!("exported to {}", written.display())),
                    Err(e) => out.fail(&e),
                }
            }
            Command::Preview => {
                refresh_preview(&workspace, &preview).await;
                out.say(&preview.lock().await.path().display().to_string());
            }
            Command::Unknown(text) => out.say(&format!("unknown command: {text} (try :help)")),
        }
    }

    session.cancel().await;
    drop(session);
    let _ = printer.await;
    if let Some(logger) = transcript {
        logger.close().await;
    }
    Ok(())
}

/// Command feedback. Goes to stderr in JSON mode so stdout stays one event per line.
struct Output {
    json: bool,
}

impl Output {
    fn say(&self, text: &str) {
        if self.json {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    fn fail(&self, err: &ForgeError) {
        eprintln!("error: {err}");
    }
}

/// Lines after `:edit` up to a lone `.`. `None` when input ends first.
async fn read_edit_body(lines: &mut Lines<BufReader<Stdin>>) -> std::io::Result<Option<String>> {
    let mut body = String::new();
    while let Some(line) = lines.next_line().await? {
        if line == "." {
            return Ok(Some(body));
        }
        body.push_str(&line);
        body.push('\n');
    }
    Ok(None)
}

/// Apply a user edit and, when it succeeds, recompose the preview.
async fn edit_workspace<T>(
    workspace: &SharedWorkspace,
    preview: &SharedPreview,
    edit: impl FnOnce(&mut Workspace) -> Result<T>,
) -> Result<T> {
    let result = edit(&mut *workspace.lock().await)?;
    refresh_preview(workspace, preview).await;
    Ok(result)
}

async fn refresh_preview(workspace: &SharedWorkspace, preview: &SharedPreview) {
    let snapshot = workspace.lock().await.clone();
    match preview.lock().await.refresh(&snapshot).await {
        Ok(true) => tracing::debug!("preview rewritten"),
        Ok(false) => {}
        Err(e) if host::is_empty_preview(&e) => tracing::debug!("nothing to preview"),
        Err(e) => tracing::warn!(error = %e, "preview write failed"),
    }
}

async fn print_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    workspace: SharedWorkspace,
    preview: SharedPreview,
    json: bool,
) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "cannot encode event"),
            }
        } else if let Some(line) = host::render_event(&event) {
            println!("{line}");
        }

        if matches!(event, SessionEvent::FileWritten { .. }) {
            refresh_preview(&workspace, &preview).await;
        }
    }
}
