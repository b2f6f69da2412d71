//! One conversational coding session: drives a turn from user prompt to
//! reconciled workspace, publishing every phase change as a [`SessionEvent`].
//!
//! Each turn runs as a single spawned task. A turn is identified by a
//! generation number; starting a new turn (or cancelling) bumps the counter and
//! aborts the old task, and every side effect re-checks the generation first so
//! a stale continuation can never write into the next turn.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

use crate::backend::{ChatRequest, ModelBackend};
use crate::blocks::{BlockTracker, ParsedBlock};
use crate::commands::context;
use crate::commands::logs::send_log;
use crate::error::Result;
use crate::stream::{StreamEvent, StreamReader};
use crate::workspace::{Applied, Workspace};

/// Assistant message committed when the backend cannot be reached.
pub const TRANSPORT_ERROR_MESSAGE: &str =
    "Sorry, I couldn't reach the assistant. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The phase shown to the user while a turn is in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ActionStatus {
    Thinking,
    Reading,
    Editing { file: String },
    Done,
}

/// Everything a host needs to render a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum SessionEvent {
    Status { status: ActionStatus },
    /// `Done` expired; nothing is in flight.
    Idle,
    Delta { text: String },
    FileWritten { name: String, created: bool },
    TurnCommitted { turn: ConversationTurn },
}

#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Pause before each block is written, so multi-file edits are visible.
    pub pacing: Duration,
    /// How long `Done` stays up before the session reports idle.
    pub done_linger: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(350),
            done_linger: Duration::from_millis(1500),
        }
    }
}

/// State shared between the session handle and its turn tasks.
#[derive(Clone)]
pub struct SessionContext {
    workspace: Arc<Mutex<Workspace>>,
    history: Arc<Mutex<Vec<ConversationTurn>>>,
    status: Arc<Mutex<Option<ActionStatus>>>,
    generation: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<SessionEvent>,
    transcript: Option<mpsc::UnboundedSender<String>>,
    settings: SessionSettings,
}

impl SessionContext {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn log(&self, prefix: &str, line: &str) {
        if let Some(tx) = &self.transcript {
            send_log(tx, prefix, line);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate whatever turn is running. Taken under the workspace lock so
    /// no stale write can interleave with the bump.
    async fn next_generation(&self) -> u64 {
        let _guard = self.workspace.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Default)]
struct TurnHandles {
    abort: Option<AbortHandle>,
    join: Option<JoinHandle<()>>,
}

/// Host-facing handle for a coding session.
pub struct Session {
    ctx: SessionContext,
    backend: Arc<dyn ModelBackend>,
    turn: Mutex<TurnHandles>,
}

impl Session {
    pub fn new(
        workspace: Workspace,
        backend: Arc<dyn ModelBackend>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext {
            workspace: Arc::new(Mutex::new(workspace)),
            history: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            events: tx,
            transcript: None,
            settings,
        };
        let session = Self {
            ctx,
            backend,
            turn: Mutex::new(TurnHandles::default()),
        };
        (session, rx)
    }

    /// Mirror turns and file writes into a transcript log.
    pub fn with_transcript(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.ctx.transcript = Some(tx);
        self
    }

    pub fn workspace(&self) -> Arc<Mutex<Workspace>> {
        self.ctx.workspace.clone()
    }

    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.ctx.history.lock().await.clone()
    }

    /// `None` when idle.
    pub async fn status(&self) -> Option<ActionStatus> {
        self.ctx.status.lock().await.clone()
    }

    /// Start a new turn, cancelling any turn still in flight.
    pub async fn submit(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let mut handles = self.turn.lock().await;

        let generation = self.ctx.next_generation().await;
        if let Some(abort) = handles.abort.take() {
            if !abort.is_finished() {
                tracing::info!(generation, "new prompt cancels in-flight turn");
            }
            abort.abort();
        }

        self.ctx.log("user", &prompt);
        self.ctx
            .history
            .lock()
            .await
            .push(ConversationTurn::user(prompt));

        let ctx = self.ctx.clone();
        let backend = self.backend.clone();
        let join = tokio::spawn(async move {
            Turn::new(ctx, generation).run(backend.as_ref()).await;
        });
        handles.abort = Some(join.abort_handle());
        handles.join = Some(join);
    }

    /// Abort the in-flight turn without committing anything from it.
    pub async fn cancel(&self) {
        let mut handles = self.turn.lock().await;
        let generation = self.ctx.next_generation().await;
        if let Some(abort) = handles.abort.take() {
            abort.abort();
        }
        handles.join = None;

        let mut status = self.ctx.status.lock().await;
        if status.take().is_some() {
            tracing::info!(generation, "turn cancelled");
            self.ctx.emit(SessionEvent::Idle);
        }
    }

    /// Wait for the most recently submitted turn to finish (or be aborted).
    pub async fn join(&self) {
        let join = self.turn.lock().await.join.take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    /// Synchronous teardown for drop paths that cannot await.
    pub fn kill_sync(&self) {
        self.ctx.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut handles) = self.turn.try_lock() {
            if let Some(abort) = handles.abort.take() {
                abort.abort();
            }
            handles.join = None;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill_sync();
    }
}

/// Per-turn state: the growing response and what has been parsed from it.
struct Turn {
    ctx: SessionContext,
    generation: u64,
    buffer: String,
    tracker: BlockTracker,
    completed: Vec<ParsedBlock>,
}

impl Turn {
    fn new(ctx: SessionContext, generation: u64) -> Self {
        Self {
            ctx,
            generation,
            buffer: String::new(),
            tracker: BlockTracker::new(),
            completed: Vec::new(),
        }
    }

    fn is_current(&self) -> bool {
        self.ctx.is_current(self.generation)
    }

    async fn run(mut self, backend: &dyn ModelBackend) {
        tracing::info!(generation = self.generation, "turn started");
        self.set_status(Some(ActionStatus::Thinking)).await;

        match self.stream(backend).await {
            Ok(()) => self.apply_and_commit().await,
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    async fn set_status(&self, next: Option<ActionStatus>) {
        let mut status = self.ctx.status.lock().await;
        if !self.is_current() {
            return;
        }
        *status = next.clone();
        match next {
            Some(status) => self.ctx.emit(SessionEvent::Status { status }),
            None => self.ctx.emit(SessionEvent::Idle),
        }
    }

    async fn request(&self) -> ChatRequest {
        let messages = self.ctx.history.lock().await.clone();
        let workspace = self.ctx.workspace.lock().await;
        ChatRequest {
            messages,
            files_context: context::files_context(&workspace),
            current_file: context::current_file(&workspace),
        }
    }

    /// Read the body to its end, feeding the block tracker as text arrives.
    async fn stream(&mut self, backend: &dyn ModelBackend) -> Result<()> {
        let request = self.request().await;
        let mut body = backend.open(&request).await?;
        let mut reader = StreamReader::new();
        let mut reading = false;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            if !reading {
                reading = true;
                self.set_status(Some(ActionStatus::Reading)).await;
            }
            if self.absorb(reader.feed(&chunk)).await {
                return Ok(());
            }
        }

        self.absorb(reader.finish()).await;
        Ok(())
    }

    /// Returns true once the end-of-stream sentinel has been seen.
    async fn absorb(&mut self, events: Vec<StreamEvent>) -> bool {
        let mut ended = false;
        let mut grew = false;
        for event in events {
            match event {
                StreamEvent::Delta { text } => {
                    self.buffer.push_str(&text);
                    if self.is_current() {
                        self.ctx.emit(SessionEvent::Delta { text });
                    }
                    grew = true;
                }
                StreamEvent::End => {
                    ended = true;
                    break;
                }
            }
        }

        if grew {
            let observation = self.tracker.observe(&self.buffer);
            for file in observation.opened {
                self.set_status(Some(ActionStatus::Editing { file })).await;
            }
            self.completed.extend(observation.completed);
        }
        ended
    }

    async fn apply_and_commit(mut self) {
        let rest = self.tracker.finish(&self.buffer);
        self.completed.extend(rest);
        let blocks = std::mem::take(&mut self.completed);
        tracing::info!(
            generation = self.generation,
            blocks = blocks.len(),
            bytes = self.buffer.len(),
            "stream finished"
        );

        for block in blocks {
            if !self.is_current() {
                return;
            }
            self.set_status(Some(ActionStatus::Editing {
                file: block.name.clone(),
            }))
            .await;
            tokio::time::sleep(self.ctx.settings.pacing).await;

            let name = block.name.clone();
            let applied = {
                let mut workspace = self.ctx.workspace.lock().await;
                if !self.is_current() {
                    return;
                }
                workspace.apply(block)
            };
            let created = applied == Applied::Created;
            tracing::debug!(file = %name, created, "file written");
            self.ctx.log("file", &format!("{} {name}", if created { "created" } else { "updated" }));
            self.ctx.emit(SessionEvent::FileWritten { name, created });
        }

        let prose = self.tracker.prose(&self.buffer);
        if !self.commit(ConversationTurn::assistant(prose)).await {
            return;
        }
        self.set_status(Some(ActionStatus::Done)).await;
        tokio::time::sleep(self.ctx.settings.done_linger).await;
        self.set_status(None).await;
    }

    async fn fail(self, detail: String) {
        tracing::warn!(generation = self.generation, error = %detail, "turn failed");
        if !self.commit(ConversationTurn::assistant(TRANSPORT_ERROR_MESSAGE)).await {
            return;
        }
        self.set_status(None).await;
    }

    /// Freeze the assistant turn into history, unless this turn went stale.
    async fn commit(&self, turn: ConversationTurn) -> bool {
        let mut history = self.ctx.history.lock().await;
        if !self.is_current() {
            return false;
        }
        self.ctx.log("assistant", &turn.content);
        history.push(turn.clone());
        drop(history);
        self.ctx.emit(SessionEvent::TurnCommitted { turn });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ByteStream;
    use crate::error::ForgeError;
    use crate::preview;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    enum Script {
        Body {
            chunks: Vec<Vec<u8>>,
            delay: Duration,
            hang: bool,
        },
        Fail(u16),
    }

    struct ScriptedBackend {
        scripts: std::sync::Mutex<VecDeque<Script>>,
    }

    impl ScriptedBackend {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: std::sync::Mutex::new(scripts.into()),
            })
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        async fn open(&self, _request: &ChatRequest) -> Result<ByteStream> {
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(Script::Body {
                    chunks,
                    delay,
                    hang,
                }) => {
                    let body = futures_util::stream::iter(chunks).then(move |chunk| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, ForgeError>(chunk)
                    });
                    if hang {
                        Ok(body.chain(futures_util::stream::pending()).boxed())
                    } else {
                        Ok(body.boxed())
                    }
                }
                Some(Script::Fail(status)) => Err(ForgeError::Status(status)),
                None => Err(ForgeError::Custom("no script left".into())),
            }
        }
    }

    /// SSE body carrying `parts` as deltas, re-split into odd-sized chunks.
    fn sse(parts: &[&str], done: bool) -> Vec<Vec<u8>> {
        let mut body = String::new();
        for part in parts {
            let payload = serde_json::json!({"choices": [{"delta": {"content": part}}]});
            body.push_str(&format!("data: {payload}\n\n"));
        }
        if done {
            body.push_str("data: [DONE]\n\n");
        }
        body.into_bytes().chunks(7).map(|c| c.to_vec()).collect()
    }

    fn body(chunks: Vec<Vec<u8>>) -> Script {
        Script::Body {
            chunks,
            delay: Duration::ZERO,
            hang: false,
        }
    }

    fn fast() -> SessionSettings {
        SessionSettings {
            pacing: Duration::from_millis(1),
            done_linger: Duration::from_millis(1),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn statuses(events: &[SessionEvent]) -> Vec<ActionStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Status { status } => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    fn editing(file: &str) -> ActionStatus {
        ActionStatus::Editing { file: file.into() }
    }

    #[tokio::test]
    async fn test_full_turn_updates_workspace_and_history() {
        let backend = ScriptedBackend::new(vec![body(sse(
            &[
                "Here is a page.\n```css:style.css\nh1 { color: red; }\n```\n",
                "```html:index.html\n<link href=\"style.css\">\n<h1>Hi</h1>\n```\nEnjoy",
            ],
            true,
        ))]);
        let (session, mut rx) = Session::new(Workspace::new(), backend, fast());

        session.submit("make a page").await;
        session.join().await;

        let events = drain(&mut rx);
        assert_eq!(
            statuses(&events),
            vec![
                ActionStatus::Thinking,
                ActionStatus::Reading,
                editing("style.css"),
                editing("index.html"),
                editing("style.css"),
                editing("index.html"),
                ActionStatus::Done,
            ]
        );
        assert_eq!(events.last(), Some(&SessionEvent::Idle));
        assert!(events.contains(&SessionEvent::FileWritten {
            name: "style.css".into(),
            created: true
        }));

        let workspace = session.workspace();
        let workspace = workspace.lock().await;
        assert_eq!(workspace.len(), 2);
        assert_eq!(workspace.active_name(), Some("index.html"));
        let html = preview::compose(&workspace).unwrap();
        assert!(html.contains("<style>\nh1 { color: red; }\n</style>"));
        assert!(!html.contains("<link"));

        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationTurn::user("make a page"));
        assert_eq!(
            history[1],
            ConversationTurn::assistant(
                "Here is a page.\n✅ updated: style.css\n✅ updated: index.html\nEnjoy"
            )
        );
        assert_eq!(session.status().await, None);
    }

    #[tokio::test]
    async fn test_transport_failure_is_one_message_and_retryable() {
        let backend = ScriptedBackend::new(vec![
            Script::Fail(502),
            body(sse(&["second try"], true)),
        ]);
        let (session, mut rx) = Session::new(Workspace::new(), backend, fast());

        session.submit("hello").await;
        session.join().await;
        let events = drain(&mut rx);
        assert_eq!(statuses(&events), vec![ActionStatus::Thinking]);
        assert_eq!(events.last(), Some(&SessionEvent::Idle));
        let shown: Vec<String> = events.iter().filter_map(crate::host::render_event).collect();
        assert_eq!(
            shown,
            vec![
                "… thinking".to_string(),
                format!("assistant> {TRANSPORT_ERROR_MESSAGE}"),
            ]
        );
        assert_eq!(session.status().await, None);

        let history = session.history().await;
        assert_eq!(
            history.last(),
            Some(&ConversationTurn::assistant(TRANSPORT_ERROR_MESSAGE))
        );

        session.submit("hello again").await;
        session.join().await;
        let history = session.history().await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[3], ConversationTurn::assistant("second try"));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let mut chunks = vec![b"data: {not json\n\n".to_vec()];
        chunks.extend(sse(&["ok"], true));
        let backend = ScriptedBackend::new(vec![body(chunks)]);
        let (session, _rx) = Session::new(Workspace::new(), backend, fast());

        session.submit("hi").await;
        session.join().await;
        let history = session.history().await;
        assert_eq!(history[1], ConversationTurn::assistant("ok"));
    }

    #[tokio::test]
    async fn test_unterminated_fence_writes_nothing() {
        let backend = ScriptedBackend::new(vec![body(sse(&["Starting\n```html\n<h1>"], true))]);
        let (session, mut rx) = Session::new(Workspace::new(), backend, fast());

        session.submit("go").await;
        session.join().await;
        assert!(session.workspace().lock().await.is_empty());
        let history = session.history().await;
        assert_eq!(history[1].content, "Starting\n```html\n<h1>");
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SessionEvent::FileWritten { .. })));
    }

    #[tokio::test]
    async fn test_stream_without_done_sentinel_still_completes() {
        let backend = ScriptedBackend::new(vec![body(sse(&["```css:a.css\np{}\n```"], false))]);
        let (session, _rx) = Session::new(Workspace::new(), backend, fast());
        session.submit("go").await;
        session.join().await;
        assert!(session.workspace().lock().await.get("a.css").is_some());
    }

    #[tokio::test]
    async fn test_new_turn_stops_pending_writes_of_previous_turn() {
        let backend = ScriptedBackend::new(vec![
            body(sse(&["```css:a.css\na{}\n```\n```css:b.css\nb{}\n```\n"], true)),
            body(sse(&["```css:c.css\nc{}\n```\n"], true)),
        ]);
        let settings = SessionSettings {
            pacing: Duration::from_millis(200),
            done_linger: Duration::from_millis(1),
        };
        let (session, mut rx) = Session::new(Workspace::new(), backend, settings);

        session.submit("first").await;
        let wait_first_write = async {
            while let Some(event) = rx.recv().await {
                if matches!(&event, SessionEvent::FileWritten { name, .. } if name == "a.css") {
                    break;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait_first_write)
            .await
            .expect("first file never written");

        // b.css is now waiting out its pacing delay.
        session.submit("second").await;
        session.join().await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        let workspace = session.workspace();
        let workspace = workspace.lock().await;
        assert!(workspace.get("a.css").is_some());
        assert!(workspace.get("b.css").is_none());
        assert!(workspace.get("c.css").is_some());

        let history = session.history().await;
        let roles: Vec<Role> = history.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User, Role::Assistant]);
        assert_eq!(history[2].content, "✅ updated: c.css");
    }

    #[tokio::test]
    async fn test_cancel_discards_partial_turn() {
        let backend = ScriptedBackend::new(vec![Script::Body {
            chunks: sse(&["```html:index.html\n<h1>"], false),
            delay: Duration::ZERO,
            hang: true,
        }]);
        let (session, mut rx) = Session::new(Workspace::new(), backend, fast());

        session.submit("build").await;
        let wait_editing = async {
            while let Some(event) = rx.recv().await {
                if event == (SessionEvent::Status { status: editing("index.html") }) {
                    break;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait_editing)
            .await
            .expect("provisional editing status never seen");

        session.cancel().await;
        session.join().await;
        assert_eq!(session.status().await, None);
        assert_eq!(session.history().await.len(), 1);
        assert!(session.workspace().lock().await.is_empty());
        assert!(drain(&mut rx).contains(&SessionEvent::Idle));
    }

    #[tokio::test]
    async fn test_stale_turn_emits_no_deltas() {
        let backend = ScriptedBackend::new(vec![]);
        let (session, mut rx) = Session::new(Workspace::new(), backend, fast());

        let generation = session.ctx.next_generation().await;
        let mut live = Turn::new(session.ctx.clone(), generation);
        live.absorb(vec![StreamEvent::Delta { text: "on time".into() }]).await;
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::Delta { text: "on time".into() }]
        );

        session.ctx.next_generation().await;
        let mut stale = Turn::new(session.ctx.clone(), generation);
        stale
            .absorb(vec![StreamEvent::Delta {
                text: "late\n```css:a.css\n".into(),
            }])
            .await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.status().await, None);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = SessionEvent::Status {
            status: editing("index.html"),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "event": "status",
                "data": {"status": {"kind": "editing", "file": "index.html"}}
            })
        );
        assert_eq!(
            serde_json::to_value(SessionEvent::Idle).unwrap(),
            serde_json::json!({"event": "idle"})
        );
    }
}
