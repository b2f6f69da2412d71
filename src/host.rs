//! Terminal host: line commands, event rendering and the on-disk preview.

use std::path::PathBuf;

use crate::error::{ForgeError, Result};
use crate::preview;
use crate::session::{ActionStatus, SessionEvent};
use crate::workspace::Workspace;

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Files,
    Open(String),
    Add(String),
    Remove(String),
    Edit,
    Save,
    Export(String),
    Preview,
    Cancel,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Prompt(line.to_string());
    };

    let (verb, arg) = match rest.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim().to_string()),
        None => (rest, String::new()),
    };
    match (verb, arg.is_empty()) {
        ("files" | "ls", _) => Command::Files,
        ("open", false) => Command::Open(arg),
        ("add", false) => Command::Add(arg),
        ("rm", false) => Command::Remove(arg),
        ("edit", _) => Command::Edit,
        ("save", _) => Command::Save,
        ("export", false) => Command::Export(arg),
        ("preview", _) => Command::Preview,
        ("cancel", _) => Command::Cancel,
        ("help" | "h", _) => Command::Help,
        ("quit" | "q" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

pub const HELP: &str = "\
Type a request to send it to the assistant, or a command:
  :files            list files (* marks the open one)
  :open <name>      switch the open file
  :add <name>       create an empty file
  :rm <name>        delete a file
  :edit             replace the open file with the lines that follow, end with a lone '.'
  :save             save the project
  :export <path>    write the project as a .zip
  :preview          rewrite the preview file and print its path
  :cancel           stop the assistant
  :quit";

/// Human-readable line for an event, or `None` when it has nothing to show.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Status { status } => Some(match status {
            ActionStatus::Thinking => "… thinking".to_string(),
            ActionStatus::Reading => "… reading".to_string(),
            ActionStatus::Editing { file } => format!("✎ editing {file}"),
            ActionStatus::Done => "✓ done".to_string(),
        }),
        SessionEvent::FileWritten { name, created } => Some(format!(
            "  {} {name}",
            if *created { "created" } else { "updated" }
        )),
        SessionEvent::TurnCommitted { turn } => Some(format!("assistant> {}", turn.content)),
        SessionEvent::Idle | SessionEvent::Delta { .. } => None,
    }
}

pub fn render_files(workspace: &Workspace) -> String {
    let active = workspace.active_name();
    workspace
        .files()
        .iter()
        .map(|f| {
            let marker = if Some(f.name.as_str()) == active { "*" } else { " " };
            format!("{marker} {} ({}, {} bytes)", f.name, f.language.as_str(), f.content.len())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The composed document on disk, rewritten only when it changes.
pub struct PreviewFile {
    path: PathBuf,
    last: Option<String>,
}

impl PreviewFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, last: None }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Recompose and write. Returns whether the file was rewritten.
    /// A workspace with no entry document is reported, never written.
    pub async fn refresh(&mut self, workspace: &Workspace) -> Result<bool> {
        let html = preview::compose(workspace)?;
        if self.last.as_deref() == Some(html.as_str()) {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, &html).await?;
        self.last = Some(html);
        Ok(true)
    }
}

/// Whether an error from [`PreviewFile::refresh`] just means "nothing to show".
pub fn is_empty_preview(err: &ForgeError) -> bool {
    matches!(err, ForgeError::NoEntryDocument)
}
