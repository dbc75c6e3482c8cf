use std::sync::{Arc, Mutex};
use std::time::Duration;

use glbtrace_core::config::Config;
use glbtrace_core::error::{GlbError, Result};
use glbtrace_core::model::span::Span;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::otlp::encode::encode_spans;
use crate::otlp::export::Exporter;

const EXPORT_ATTEMPTS: u32 = 3;
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Where finished spans go. `emit` must not block: implementations either
/// accept the span for later delivery or refuse it with
/// [`GlbError::SinkUnavailable`].
pub trait SpanSink: Send + Sync {
    fn emit(&self, span: Span) -> Result<()>;
}

impl<S: SpanSink + ?Sized> SpanSink for Arc<S> {
    fn emit(&self, span: Span) -> Result<()> {
        (**self).emit(span)
    }
}

/// Keeps every emitted span in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    spans: Arc<Mutex<Vec<Span>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<Span> {
        self.spans
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

impl SpanSink for MemorySink {
    fn emit(&self, span: Span) -> Result<()> {
        self.spans
            .lock()
            .map_err(|_| GlbError::SinkUnavailable("memory sink poisoned".to_string()))?
            .push(span);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub scope_name: String,
    pub retry_backoff: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            batch_size: 512,
            flush_interval: Duration::from_secs(1),
            scope_name: glbtrace_core::config::DEFAULT_LIBRARY_NAME.to_string(),
            retry_backoff: Duration::from_millis(30),
        }
    }
}

impl From<&Config> for SinkConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            queue_capacity: cfg.sink_queue_capacity,
            batch_size: cfg.sink_batch_size,
            flush_interval: cfg.sink_flush_interval,
            scope_name: cfg.library_name.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
enum SinkMsg {
    Span(Span),
    Flush(oneshot::Sender<()>),
}

/// Buffers spans on a bounded queue and exports them as OTLP batches from a
/// background task.
#[derive(Clone)]
pub struct OtlpSink {
    tx: mpsc::Sender<SinkMsg>,
}

/// Owns the export task. [`SinkHandle::close`] drains and exports whatever is
/// still queued; dropping the handle asks the task to do the same without
/// waiting for it.
pub struct SinkHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl OtlpSink {
    pub fn start(cfg: SinkConfig, exporter: Box<dyn Exporter>) -> (Self, SinkHandle) {
        let (tx, rx) = mpsc::channel(cfg.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_export_worker(exporter, rx, shutdown_rx, cfg));
        (
            Self { tx },
            SinkHandle {
                shutdown,
                task: Some(task),
            },
        )
    }

    /// Exports everything queued before this call.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SinkMsg::Flush(ack_tx))
            .await
            .map_err(|_| GlbError::SinkUnavailable("sink closed".to_string()))?;
        ack_rx
            .await
            .map_err(|_| GlbError::SinkUnavailable("sink stopped before flushing".to_string()))
    }
}

impl SpanSink for OtlpSink {
    fn emit(&self, span: Span) -> Result<()> {
        self.tx.try_send(SinkMsg::Span(span)).map_err(|e| match e {
            TrySendError::Full(_) => GlbError::SinkUnavailable("export queue full".to_string()),
            TrySendError::Closed(_) => GlbError::SinkUnavailable("sink closed".to_string()),
        })
    }
}

impl SinkHandle {
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = ?e, "span export task did not shut down cleanly");
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run_export_worker(
    exporter: Box<dyn Exporter>,
    mut rx: mpsc::Receiver<SinkMsg>,
    mut shutdown: watch::Receiver<bool>,
    cfg: SinkConfig,
) {
    let mut ticker = tokio::time::interval(cfg.flush_interval.max(MIN_FLUSH_INTERVAL));
    let mut buffer = Vec::new();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(SinkMsg::Span(span)) => {
                    buffer.push(span);
                    if buffer.len() >= cfg.batch_size {
                        export_batch(exporter.as_ref(), &cfg, &mut buffer).await;
                    }
                }
                Some(SinkMsg::Flush(ack)) => {
                    export_batch(exporter.as_ref(), &cfg, &mut buffer).await;
                    let _ = ack.send(());
                }
                None => break,
            },
            _ = ticker.tick() => {
                export_batch(exporter.as_ref(), &cfg, &mut buffer).await;
            }
            _ = shutdown.changed() => break,
        }
    }

    rx.close();
    let mut acks = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        match msg {
            SinkMsg::Span(span) => buffer.push(span),
            SinkMsg::Flush(ack) => acks.push(ack),
        }
    }
    for chunk in std::mem::take(&mut buffer).chunks(cfg.batch_size.max(1)) {
        let mut batch = chunk.to_vec();
        export_batch(exporter.as_ref(), &cfg, &mut batch).await;
    }
    for ack in acks {
        let _ = ack.send(());
    }
    debug!("span export task stopped");
}

async fn export_batch(exporter: &dyn Exporter, cfg: &SinkConfig, buffer: &mut Vec<Span>) {
    if buffer.is_empty() {
        return;
    }
    let count = buffer.len();
    let request = encode_spans(buffer, &cfg.scope_name);
    buffer.clear();

    for attempt in 0..EXPORT_ATTEMPTS {
        match exporter.export(request.clone()).await {
            Ok(()) => {
                debug!(count, "span batch exported");
                return;
            }
            Err(e) => {
                debug!(error = %e, attempt, "span export attempt failed");
                if attempt + 1 < EXPORT_ATTEMPTS {
                    tokio::time::sleep(cfg.retry_backoff * (attempt + 1)).await;
                }
            }
        }
    }
    warn!(count, "dropping span batch after failed export retries");
}
