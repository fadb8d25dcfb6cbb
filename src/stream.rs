use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type SessionId = u64;

/// What a log stream follows: a container, optionally reached through a
/// host container, or a whole compose project.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StreamTarget {
    pub id: String,
    pub name: String,
    pub host: Option<String>,
    pub project: Option<String>,
}

impl StreamTarget {
    pub fn label(&self) -> String {
        match (&self.project, &self.host) {
            (Some(project), _) => format!("project {project}"),
            (None, Some(host)) => format!("{}@{host}", self.name),
            (None, None) => self.name.clone(),
        }
    }
}

/// Program and arguments of a long-running follow process.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl StreamCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct StreamBuffer {
    lines: Vec<String>,
    done: bool,
    spawn_error: Option<String>,
}

/// Non-blocking snapshot of a session past a read cursor.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StreamChunk {
    pub lines: Vec<String>,
    pub next: usize,
    /// The process finished and every line has been handed out.
    pub done: bool,
    pub spawn_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamSession {
    id: SessionId,
    target: StreamTarget,
    buffer: Arc<Mutex<StreamBuffer>>,
    cancel: CancellationToken,
}

impl StreamSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn poll(&self, from: usize) -> StreamChunk {
        let buffer = self.buffer.lock();
        let from = from.min(buffer.lines.len());
        let lines = buffer.lines[from..].to_vec();
        StreamChunk {
            next: buffer.lines.len(),
            lines,
            done: buffer.done,
            spawn_error: buffer.spawn_error.clone(),
        }
    }

    /// Fire-and-forget; the waiter task kills the process.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.buffer.lock().done
    }
}

/// Owner of the single live log stream.
#[derive(Debug, Default)]
pub struct StreamEngine {
    active: Option<StreamSession>,
    next_id: SessionId,
}

impl StreamEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any running session, then spawns `command` in the background.
    /// Never waits on the previous process or on the spawn itself.
    pub fn start(&mut self, command: StreamCommand, target: StreamTarget) -> StreamSession {
        self.cancel();

        self.next_id += 1;
        let session = StreamSession {
            id: self.next_id,
            target,
            buffer: Arc::new(Mutex::new(StreamBuffer::default())),
            cancel: CancellationToken::new(),
        };
        info!(
            session = session.id,
            stream = %session.target.label(),
            program = %command.program,
            "starting log stream"
        );

        tokio::spawn(run_session(
            command,
            session.id,
            Arc::clone(&session.buffer),
            session.cancel.clone(),
        ));
        self.active = Some(session.clone());
        session
    }

    pub fn cancel(&mut self) -> Option<SessionId> {
        let session = self.active.take()?;
        debug!(session = session.id, "cancelling log stream");
        session.cancel();
        Some(session.id)
    }

    pub fn active(&self) -> Option<&StreamSession> {
        self.active.as_ref()
    }
}

async fn run_session(
    command: StreamCommand,
    session: SessionId,
    buffer: Arc<Mutex<StreamBuffer>>,
    cancel: CancellationToken,
) {
    let spawned = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(error) => {
            warn!(session, "log stream spawn failed: {error}");
            let mut buffer = buffer.lock();
            buffer.spawn_error = Some(format!("failed to start {}: {error}", command.program));
            buffer.done = true;
            return;
        }
    };

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(drain(stdout, "stdout", Arc::clone(&buffer), cancel.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(drain(stderr, "stderr", Arc::clone(&buffer), cancel.clone())));
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Err(error) = child.start_kill() {
                debug!(session, "kill after cancel failed: {error}");
            }
            let _ = child.wait().await;
            None
        }
        status = child.wait() => Some(status),
    };

    for reader in readers {
        let _ = reader.await;
    }

    let mut buffer = buffer.lock();
    match status {
        Some(Ok(status)) if !status.success() => {
            buffer.lines.push(format!("[ERROR: process exited with {status}]"));
        }
        Some(Err(error)) => {
            buffer.lines.push(format!("[ERROR: waiting for process: {error}]"));
        }
        _ => {}
    }
    buffer.done = true;
    debug!(session, lines = buffer.lines.len(), "log stream finished");
}

async fn drain<R>(
    reader: R,
    channel: &'static str,
    buffer: Arc<Mutex<StreamBuffer>>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut bytes = Vec::with_capacity(256);
    loop {
        bytes.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read_until(b'\n', &mut bytes) => read,
        };
        match read {
            Ok(0) => return,
            Ok(_) => buffer.lock().lines.push(decode_line(&bytes)),
            Err(error) => {
                buffer
                    .lock()
                    .lines
                    .push(format!("[ERROR: reading {channel}: {error}]"));
                return;
            }
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Follower output, tagged with the session it was read from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StreamEvent {
    Lines {
        session: SessionId,
        lines: Vec<String>,
        done: bool,
    },
    Failed {
        session: SessionId,
        error: String,
    },
}

/// Polls `session` every `every` until it is cancelled or drained. An event
/// is sent only when there are new lines or the session finished.
pub fn spawn_follower<M, F>(
    session: StreamSession,
    every: Duration,
    tx: UnboundedSender<M>,
    wrap: F,
) -> JoinHandle<()>
where
    M: Send + 'static,
    F: Fn(StreamEvent) -> M + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancel = session.cancel.clone();
        let mut cursor = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let chunk = session.poll(cursor);
            if let Some(error) = chunk.spawn_error {
                let _ = tx.send(wrap(StreamEvent::Failed {
                    session: session.id,
                    error,
                }));
                break;
            }

            cursor = chunk.next;
            if chunk.lines.is_empty() && !chunk.done {
                continue;
            }
            let event = StreamEvent::Lines {
                session: session.id,
                lines: chunk.lines,
                done: chunk.done,
            };
            if tx.send(wrap(event)).is_err() || chunk.done {
                break;
            }
        }
        debug!(session = session.id, "log follower stopped");
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::{StreamChunk, StreamCommand, StreamEngine, StreamEvent, StreamSession, StreamTarget, decode_line, spawn_follower};
    use tokio::sync::mpsc;
    use tokio::time::{Duration, Instant, sleep, timeout};

    fn sh(script: &str) -> StreamCommand {
        StreamCommand::new("sh", ["-c", script])
    }

    fn target(id: &str) -> StreamTarget {
        StreamTarget {
            id: id.to_string(),
            name: id.to_string(),
            ..StreamTarget::default()
        }
    }

    async fn drained(session: &StreamSession) -> StreamChunk {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let chunk = session.poll(0);
            if chunk.done || Instant::now() > deadline {
                return chunk;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn collects_both_output_channels() {
        let mut engine = StreamEngine::new();
        let session = engine.start(sh("echo out-1; echo err-1 1>&2; echo out-2"), target("a"));

        let chunk = drained(&session).await;
        assert!(chunk.done);
        assert_eq!(chunk.spawn_error, None);
        assert_eq!(chunk.lines.len(), 3);
        let stdout = chunk
            .lines
            .iter()
            .filter(|line| line.starts_with("out"))
            .collect::<Vec<_>>();
        assert_eq!(stdout, vec!["out-1", "out-2"]);
        assert!(chunk.lines.contains(&"err-1".to_string()));
    }

    #[tokio::test]
    async fn failed_exit_is_annotated_in_band() {
        let mut engine = StreamEngine::new();
        let session = engine.start(sh("echo partial; exit 3"), target("a"));

        let chunk = drained(&session).await;
        assert_eq!(chunk.lines.first().map(String::as_str), Some("partial"));
        assert!(
            chunk.lines.last().is_some_and(|line| line.starts_with("[ERROR: process exited")),
            "{:?}",
            chunk.lines
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded_on_session() {
        let mut engine = StreamEngine::new();
        let session = engine.start(
            StreamCommand::new("/nonexistent/berth-missing-binary", Vec::<String>::new()),
            target("a"),
        );

        let chunk = drained(&session).await;
        assert!(chunk.done);
        assert!(chunk.lines.is_empty());
        assert!(chunk.spawn_error.is_some_and(|error| error.contains("failed to start")));
    }

    #[tokio::test]
    async fn starting_a_new_stream_replaces_the_old_one() {
        let mut engine = StreamEngine::new();
        let first = engine.start(sh("echo from-a; sleep 30"), target("a"));
        let second = engine.start(sh("echo from-b"), target("b"));

        assert!(first.is_cancelled());
        assert_ne!(first.id(), second.id());
        assert_eq!(engine.active().map(StreamSession::id), Some(second.id()));
        assert_eq!(engine.active().map(|session| session.target().id.clone()), Some("b".to_string()));

        let chunk = drained(&second).await;
        assert_eq!(chunk.lines, vec!["from-b"]);
        assert!(drained(&first).await.done, "cancelled process should be reaped");
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let mut engine = StreamEngine::new();
        let session = engine.start(sh("sleep 30"), target("a"));
        assert_eq!(engine.cancel(), Some(session.id()));
        assert_eq!(engine.cancel(), None);
        session.cancel();
        assert!(drained(&session).await.done);
    }

    #[tokio::test]
    async fn poll_returns_only_lines_past_cursor() {
        let mut engine = StreamEngine::new();
        let session = engine.start(sh("printf 'a\\r\\nb\\nc'"), target("a"));
        drained(&session).await;

        let chunk = session.poll(1);
        assert_eq!(chunk.lines, vec!["b", "c"]);
        assert_eq!(chunk.next, 3);
        assert!(session.poll(99).lines.is_empty());
    }

    #[tokio::test]
    async fn follower_emits_until_done() {
        let mut engine = StreamEngine::new();
        let session = engine.start(sh("echo one; sleep 0.1; echo two"), target("a"));
        let id = session.id();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_follower(session, Duration::from_millis(10), tx, |event| event);

        let mut lines = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
            match event {
                StreamEvent::Lines { session, lines: batch, done } => {
                    assert_eq!(session, id);
                    lines.extend(batch);
                    if done {
                        break;
                    }
                }
                StreamEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
            }
        }
        assert_eq!(lines, vec!["one", "two"]);
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn follower_reports_spawn_failure() {
        let mut engine = StreamEngine::new();
        let session = engine.start(
            StreamCommand::new("/nonexistent/berth-missing-binary", Vec::<String>::new()),
            target("a"),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_follower(session, Duration::from_millis(5), tx, |event| event);

        let event = timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, StreamEvent::Failed { .. }));
    }

    #[test]
    fn decode_strips_line_endings_and_replaces_bad_bytes() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"dos\r\n"), "dos");
        assert_eq!(decode_line(b"tail"), "tail");
        assert_eq!(decode_line(b"bad \xff\n"), "bad \u{fffd}");
    }
}
