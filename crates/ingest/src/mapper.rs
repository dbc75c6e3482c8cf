use std::sync::Arc;

use glbtrace_core::config::{Config, DEFAULT_LIBRARY_NAME};
use glbtrace_core::error::{GlbError, Result};
use glbtrace_core::ids::{SpanId, TraceId};
use glbtrace_core::model::record::LogRecord;
use glbtrace_core::model::span::{Attributes, Span};
use glbtrace_core::time::Latency;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::pubsub::envelope::decode_envelope;
use crate::sink::SpanSink;

#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// Reported as `library.name` on every span.
    pub library_name: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
        }
    }
}

impl From<&Config> for MapperConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            library_name: cfg.library_name.clone(),
        }
    }
}

/// Turns load balancer request logs into spans and hands them to a sink.
///
/// Holds no per-message state, so one mapper can serve any number of
/// concurrent deliveries.
#[derive(Clone)]
pub struct SpanMapper {
    cfg: MapperConfig,
    sink: Arc<dyn SpanSink>,
}

impl SpanMapper {
    pub fn new(cfg: MapperConfig, sink: Arc<dyn SpanSink>) -> Self {
        Self { cfg, sink }
    }

    /// Full path for one push delivery: unwrap the envelope, then map and
    /// emit its payload.
    pub fn process_push(&self, body: &[u8]) -> Result<()> {
        let payload = decode_envelope(body)?;
        self.map_and_emit(&payload)
    }

    /// Maps raw log record bytes and emits the span. Nothing is emitted unless
    /// every field needed for the span checks out.
    pub fn map_and_emit(&self, payload: &[u8]) -> Result<()> {
        let span = self.map_bytes(payload)?;
        self.sink.emit(span)
    }

    pub fn map_bytes(&self, payload: &[u8]) -> Result<Span> {
        let record = LogRecord::from_slice(payload)
            .map_err(|e| GlbError::MalformedRecord(e.to_string()))?;
        tracing::debug!(?record, "parsed request log");
        self.build_span(&record)
    }

    pub fn build_span(&self, record: &LogRecord) -> Result<Span> {
        build_span(record, &self.cfg.library_name)
    }
}

pub fn build_span(record: &LogRecord, library_name: &str) -> Result<Span> {
    let req = &record.http_request;
    let labels = &record.resource.labels;

    let path = request_path(&req.request_url)?;

    let latency = Latency::parse(&req.latency)?;
    let start_ts = latency.start_before(record.timestamp)?;
    let span_id = SpanId::parse_decimal(&record.span_id)?;
    let trace_id = TraceId::from_resource_path(&record.trace)?;

    let name = format!("{} {}", req.request_method, path);

    let mut attributes = Attributes::new();
    attributes.insert("name".into(), name.clone().into());
    attributes.insert("service.name".into(), labels.service_name.clone().into());
    attributes.insert("duration_ms".into(), latency.as_millis_f64().into());
    attributes.insert("library.name".into(), library_name.into());

    attributes.insert("trace.span_id".into(), span_id.to_hex().into());
    attributes.insert("trace.trace_id".into(), trace_id.as_str().into());

    attributes.insert("http.client_ip".into(), req.remote_ip.clone().into());
    attributes.insert("http.path".into(), path.as_str().into());
    attributes.insert("http.url".into(), req.request_url.clone().into());
    attributes.insert("http.status_code".into(), req.status.into());
    attributes.insert("http.user_agent".into(), req.user_agent.clone().into());

    attributes.insert(
        "cloudrun.service_name".into(),
        labels.service_name.clone().into(),
    );
    attributes.insert("cloudrun.location".into(), labels.location.clone().into());
    attributes.insert(
        "cloudrun.project_id".into(),
        labels.project_id.clone().into(),
    );
    attributes.insert(
        "cloudrun.revision_name".into(),
        labels.revision_name.clone().into(),
    );

    Ok(Span {
        trace_id: trace_id.into_string(),
        span_id: span_id.value(),
        name,
        start_ts,
        end_ts: record.timestamp,
        attributes,
    })
}

/// Resolves relative request URLs for validation only.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Path of a request URL as it was logged: percent-decoded, dot segments
/// kept, empty when the URL has none. Relative references are accepted.
pub fn request_path(raw: &str) -> Result<String> {
    match Url::parse(raw) {
        Ok(_) => {}
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(RELATIVE_BASE)
                .and_then(|base| base.join(raw))
                .map_err(|e| bad_url(raw, e))?;
        }
        Err(e) => return Err(bad_url(raw, e)),
    }

    let encoded = raw_path(raw);
    if !has_valid_escapes(encoded) {
        return Err(bad_url(raw, "invalid percent escape in path"));
    }
    Ok(percent_decode_str(encoded).decode_utf8_lossy().into_owned())
}

fn bad_url(raw: &str, err: impl std::fmt::Display) -> GlbError {
    GlbError::BadUrl(format!("{raw:?}: {err}"))
}

/// Undecoded path slice: after scheme and authority, before query and fragment.
fn raw_path(raw: &str) -> &str {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let mut rest = &raw[..end];
    if let Some(colon) = scheme_end(rest) {
        rest = &rest[colon + 1..];
        // `mailto:x` style URLs have no hierarchical path.
        if !rest.starts_with('/') {
            return "";
        }
    }
    match rest.strip_prefix("//") {
        Some(after_authority) => after_authority
            .find('/')
            .map_or("", |slash| &after_authority[slash..]),
        None => rest,
    }
}

fn scheme_end(s: &str) -> Option<usize> {
    let colon = s.find(':')?;
    let mut chars = s[..colon].chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(colon)
}

fn has_valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3);
            if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
