use serde::{Deserialize, Serialize};

use crate::error::{GlbError, Result};

/// Trace id carried in the `trace` field of a log entry, i.e. the last part of
/// `projects/<project>/traces/<trace-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(u64);

impl TraceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_resource_path(input: &str) -> Result<Self> {
        let segment = input.split('/').nth(3).unwrap_or_default();
        if segment.is_empty() {
            return Err(GlbError::BadTraceId(format!(
                "expected <prefix>/<prefix>/<prefix>/<trace-id>, got {input:?}"
            )));
        }
        Ok(Self(segment.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Bytes for the OTLP wire format: the id read as hex and left-padded to
    /// 16 bytes. Ids that are not hex (or longer than 32 digits) have no wire
    /// form.
    pub fn to_otlp_bytes(&self) -> Option<Vec<u8>> {
        let hex = self.0.as_str();
        if hex.len() > 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let padded = format!("{hex:0>32}");
        (0..32)
            .step_by(2)
            .map(|i| u8::from_str_radix(&padded[i..i + 2], 16).ok())
            .collect()
    }
}

impl SpanId {
    /// Accepts plain ASCII digits only; signs, whitespace and overflow are
    /// rejected.
    pub fn parse_decimal(input: &str) -> Result<Self> {
        if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GlbError::BadSpanId(format!(
                "expected unsigned decimal, got {input:?}"
            )));
        }
        input
            .parse::<u64>()
            .map(Self)
            .map_err(|e| GlbError::BadSpanId(format!("{input:?}: {e}")))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn to_hex(self) -> String {
        format!("{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trace_segment() {
        let trace = TraceId::from_resource_path("projects/p/traces/abc123").unwrap();
        assert_eq!(trace.as_str(), "abc123");

        let trace = TraceId::from_resource_path("projects/p/traces/abc/extra").unwrap();
        assert_eq!(trace.as_str(), "abc");
    }

    #[test]
    fn rejects_short_or_empty_trace() {
        assert!(matches!(
            TraceId::from_resource_path("projects/p"),
            Err(GlbError::BadTraceId(_))
        ));
        assert!(TraceId::from_resource_path("projects/p/traces/").is_err());
        assert!(TraceId::from_resource_path("").is_err());
    }

    #[test]
    fn span_id_hex_encoding() {
        assert_eq!(SpanId::parse_decimal("0").unwrap().to_hex(), "0");
        assert_eq!(SpanId::parse_decimal("255").unwrap().to_hex(), "ff");
        assert_eq!(
            SpanId::parse_decimal("18446744073709551615")
                .unwrap()
                .to_hex(),
            "ffffffffffffffff"
        );
    }

    #[test]
    fn rejects_bad_span_ids() {
        for bad in ["", "-1", "+1", " 1", "1a", "18446744073709551616"] {
            assert!(
                matches!(SpanId::parse_decimal(bad), Err(GlbError::BadSpanId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn trace_id_wire_bytes() {
        let trace = TraceId::from_resource_path(
            "projects/p/traces/4bf92f3577b34da6a3ce929d0e0e4736",
        )
        .unwrap();
        let bytes = trace.to_otlp_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 0x4b);
        assert_eq!(bytes[15], 0x36);

        let short = TraceId::from_resource_path("projects/p/traces/abc123").unwrap();
        let bytes = short.to_otlp_bytes().unwrap();
        assert!(bytes[..13].iter().all(|b| *b == 0));
        assert_eq!(&bytes[13..], &[0xab, 0xc1, 0x23]);
    }

    #[test]
    fn non_hex_trace_id_has_no_wire_form() {
        let trace = TraceId::from_resource_path("projects/p/traces/not-hex").unwrap();
        assert!(trace.to_otlp_bytes().is_none());
    }
}
