use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MAX_ROTATED_SESSIONS: usize = 10;

/// Per-project transcript writer for `<logs>/latest.log`.
///
/// `log()` only pushes into a channel; a background task owns the file, so
/// session code never waits on disk I/O.
pub struct TranscriptLogger {
    tx: mpsc::UnboundedSender<String>,
    writer: JoinHandle<()>,
}

impl TranscriptLogger {
    /// Open the transcript in `logs_dir`, rotating the previous `latest.log`
    /// to `session-{unix}.log` and pruning old rotations.
    ///
    /// Returns `None` when the directory or file cannot be opened; a missing
    /// transcript never blocks a session.
    pub async fn open(logs_dir: &Path, project_name: &str) -> Option<Self> {
        if let Err(e) = tokio::fs::create_dir_all(logs_dir).await {
            tracing::warn!(dir = %logs_dir.display(), error = %e, "cannot create logs directory");
            return None;
        }

        let latest = logs_dir.join("latest.log");
        if tokio::fs::try_exists(&latest).await.unwrap_or(false) {
            let rotated = logs_dir.join(format!("session-{}.log", unix_timestamp()));
            let _ = tokio::fs::rename(&latest, &rotated).await;
        }
        prune_rotated(logs_dir, MAX_ROTATED_SESSIONS).await;

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&latest)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(file = %latest.display(), error = %e, "cannot open transcript");
                return None;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(writer_task(file, rx));
        let _ = tx.send(format!(
            "=== {project_name} — {} ===\n\n",
            format_timestamp(unix_timestamp())
        ));

        Some(Self { tx, writer })
    }

    pub fn log(&self, prefix: &str, line: &str) {
        send_log(&self.tx, prefix, line);
    }

    /// Sender for components that log on their own (the session).
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }

    /// Stop accepting lines and wait for the footer to hit disk.
    /// Other senders still alive keep the writer open until they drop.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.writer.await;
    }
}

/// Format one transcript line and push it through a sender.
pub fn send_log(tx: &mpsc::UnboundedSender<String>, prefix: &str, line: &str) {
    let ts = format_timestamp(unix_timestamp());
    let _ = tx.send(format!("[{ts}] [{prefix}] {line}\n"));
}

async fn writer_task(file: tokio::fs::File, mut rx: mpsc::UnboundedReceiver<String>) {
    use tokio::io::AsyncWriteExt;
    let mut writer = tokio::io::BufWriter::new(file);

    while let Some(line) = rx.recv().await {
        let _ = writer.write_all(line.as_bytes()).await;
        let _ = writer.flush().await;
    }

    let footer = format!(
        "\n=== closed — {} ===\n",
        format_timestamp(unix_timestamp())
    );
    let _ = writer.write_all(footer.as_bytes()).await;
    let _ = writer.flush().await;
}

pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Unix seconds → `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_timestamp(secs: u64) -> String {
    let (sec, min, hour) = (secs % 60, (secs / 60) % 60, (secs / 3600) % 24);
    let mut days = secs / 86_400;

    let mut year = 1970u64;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if days < len {
            break;
        }
        days -= len;
        year += 1;
    }

    let mut month = 1;
    for (i, len) in [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31].into_iter().enumerate() {
        let len = if i == 1 && is_leap(year) { len + 1 } else { len };
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }

    format!("{year:04}-{month:02}-{:02}T{hour:02}:{min:02}:{sec:02}Z", days + 1)
}

fn is_leap(y: u64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Keep only the newest `keep` rotated transcripts.
async fn prune_rotated(logs_dir: &Path, keep: usize) {
    let mut entries = match tokio::fs::read_dir(logs_dir).await {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut rotated: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("session-") && name.ends_with(".log") {
            rotated.push(entry.path());
        }
    }

    // Timestamps are fixed-width for the foreseeable future, so name order is age order.
    rotated.sort();
    let excess = rotated.len().saturating_sub(keep);
    for oldest in rotated.drain(..excess) {
        let _ = tokio::fs::remove_file(oldest).await;
    }
}
