use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use braid_core::error::Result;
use braid_core::traits::ObservabilitySink;
use braid_core::types::TaskSpan;

/// Logs every span through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn emit(&self, span: TaskSpan) {
        let elapsed_ms = span.elapsed_ms();
        if span.success {
            info!(
                task_id = %span.task_id,
                kind = %span.kind,
                process_id = %span.process_id,
                instance_id = %span.instance_id,
                elapsed_ms,
                "Task span"
            );
        } else {
            warn!(
                task_id = %span.task_id,
                kind = %span.kind,
                process_id = %span.process_id,
                instance_id = %span.instance_id,
                elapsed_ms,
                error = span.error.as_deref().unwrap_or("unknown"),
                "Task span (failed)"
            );
        }
    }
}

/// JSONL span logger.
///
/// Writes one JSON object per line and flushes after each, so a crash
/// mid-run leaves every earlier span intact. Write failures are logged and
/// swallowed.
pub struct JsonlSpanSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSpanSink {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Span log opened");

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObservabilitySink for JsonlSpanSink {
    fn emit(&self, span: TaskSpan) {
        let json = match serde_json::to_string(&span) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize span");
                return;
            }
        };

        let Ok(mut writer) = self.writer.lock() else {
            error!(path = %self.path.display(), "Span log lock poisoned");
            return;
        };
        if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
            error!(error = %e, path = %self.path.display(), "Failed to write span");
        }
    }
}

/// Forwards each span to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ObservabilitySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ObservabilitySink for FanoutSink {
    fn emit(&self, span: TaskSpan) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(span.clone());
            }
            last.emit(span);
        }
    }
}
