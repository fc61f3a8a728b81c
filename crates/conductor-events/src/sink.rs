//! Flight-recorder sinks: every appended event mirrored as one JSON line.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use conductor_protocol::EventEnvelope;
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

/// External line sink. Failures are the sink's own business: `record` must
/// never fail the dispatch that produced the event, and must not block on IO.
#[async_trait]
pub trait LineSink: Send + Sync {
    fn record(&self, event: &EventEnvelope);

    /// Wait until every line recorded so far has reached its destination.
    async fn flush(&self) {}
}

pub const DEFAULT_RECORDER_LINES: usize = 5000;

type LineCallback = Box<dyn Fn(&str) + Send + Sync>;

/// In-memory bounded JSONL recorder with an optional per-line callback.
pub struct JsonlRecorder {
    lines: Mutex<VecDeque<String>>,
    max_lines: usize,
    on_line: Option<LineCallback>,
}

impl Default for JsonlRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_RECORDER_LINES)
    }
}

impl JsonlRecorder {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            max_lines: max_lines.max(1),
            on_line: None,
        }
    }

    pub fn on_line(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_line = Some(Box::new(callback));
        self
    }

    /// The newest `limit` lines, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(limit);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

#[async_trait]
impl LineSink for JsonlRecorder {
    fn record(&self, event: &EventEnvelope) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, event_id = %event.event_id, "failed serializing event for recorder");
                return;
            }
        };
        {
            let mut lines = self.lines.lock();
            lines.push_back(line.clone());
            while lines.len() > self.max_lines {
                lines.pop_front();
            }
        }
        if let Some(callback) = &self.on_line {
            callback(&line);
        }
    }
}

enum TraceCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON line per event to a file, creating parent directories on
/// first write.
///
/// `record` only queues the line. File IO happens on a writer task owned by
/// the sink, started on the first call made inside a tokio runtime; lines
/// recorded before that stay queued. Use [`LineSink::flush`] before reading
/// the file back.
pub struct JsonlFileSink {
    path: PathBuf,
    sender: mpsc::UnboundedSender<TraceCommand>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<TraceCommand>>>,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            path: path.into(),
            sender,
            pending: Mutex::new(Some(receiver)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn start_writer(&self) {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        if let Some(receiver) = pending.take() {
            handle.spawn(write_trace(self.path.clone(), receiver));
            debug!(path = ?self.path, "trace writer started");
        }
    }
}

#[async_trait]
impl LineSink for JsonlFileSink {
    fn record(&self, event: &EventEnvelope) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, event_id = %event.event_id, "failed serializing event for trace file");
                return;
            }
        };
        if self.sender.send(TraceCommand::Line(line)).is_err() {
            warn!(path = ?self.path, "trace writer stopped; event not mirrored");
            return;
        }
        self.start_writer();
    }

    async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.sender.send(TraceCommand::Flush(done)).is_err() {
            return;
        }
        self.start_writer();
        if flushed.await.is_err() {
            warn!(path = ?self.path, "trace writer stopped before flushing");
        }
    }
}

async fn write_trace(path: PathBuf, mut commands: mpsc::UnboundedReceiver<TraceCommand>) {
    let mut file = None;
    while let Some(command) = commands.recv().await {
        match command {
            TraceCommand::Line(line) => match append_line(&path, &mut file, &line).await {
                Ok(()) => debug!("event mirrored to trace file"),
                Err(error) => {
                    warn!(error = %format!("{error:#}"), ?path, "failed mirroring event to trace file");
                    file = None;
                }
            },
            TraceCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn append_line(path: &Path, file: &mut Option<fs::File>, line: &str) -> Result<()> {
    if file.is_none() {
        *file = Some(open_trace(path).await?);
    }
    if let Some(file) = file.as_mut() {
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
    }
    Ok(())
}

async fn open_trace(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create trace dir {parent:?}"))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed opening trace file {path:?}"))
}

/// Read a JSONL trace back into envelopes. Blank lines are skipped; a missing
/// file is an empty trace.
#[instrument(skip_all, fields(path = ?path.as_ref()))]
pub async fn load_trace(path: impl AsRef<Path>) -> Result<Vec<EventEnvelope>> {
    let path = path.as_ref();
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path)
        .await
        .with_context(|| format!("failed opening trace file {path:?}"))?;
    let mut reader = BufReader::new(file).lines();
    let mut out = Vec::new();
    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: EventEnvelope = serde_json::from_str(&line)
            .with_context(|| format!("failed parsing event line in {path:?}"))?;
        out.push(event);
    }
    debug!(count = out.len(), "trace loaded");
    Ok(out)
}
