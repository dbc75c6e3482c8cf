use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use glbtrace_core::ids::TraceId;
use glbtrace_core::model::span::{AttrValue, Span};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::span::SpanKind;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;
use opentelemetry_proto::tonic::trace::v1::{
    ResourceSpans, ScopeSpans, Span as OtlpSpan, Status,
};

/// Groups spans by `service.name` into one export request.
pub fn encode_spans(spans: &[Span], scope_name: &str) -> ExportTraceServiceRequest {
    let mut by_service: BTreeMap<&str, Vec<OtlpSpan>> = BTreeMap::new();
    for span in spans {
        by_service
            .entry(span.service_name())
            .or_default()
            .push(encode_span(span));
    }

    let resource_spans = by_service
        .into_iter()
        .map(|(service, spans)| ResourceSpans {
            resource: Some(Resource {
                attributes: vec![kv("service.name", &AttrValue::from(service))],
                dropped_attributes_count: 0,
                entity_refs: vec![],
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: scope_name.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    attributes: vec![],
                    dropped_attributes_count: 0,
                }),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        })
        .collect();

    ExportTraceServiceRequest { resource_spans }
}

pub fn encode_span(span: &Span) -> OtlpSpan {
    let trace_id = TraceId::new(span.trace_id.as_str())
        .to_otlp_bytes()
        .unwrap_or_else(|| {
            tracing::debug!(trace_id = %span.trace_id, "trace id is not hex; exporting without one");
            Vec::new()
        });

    let status = match span.status_code() {
        Some(code) if code >= 500 => Some(Status {
            message: format!("HTTP {code}"),
            code: StatusCode::Error as i32,
        }),
        _ => None,
    };

    OtlpSpan {
        trace_id,
        span_id: span.span_id.to_be_bytes().to_vec(),
        name: span.name.clone(),
        kind: SpanKind::Server as i32,
        start_time_unix_nano: unix_nanos(span.start_ts),
        end_time_unix_nano: unix_nanos(span.end_ts),
        attributes: span
            .attributes
            .iter()
            .filter(|(key, _)| key.as_str() != "name")
            .map(|(key, value)| kv(key, value))
            .collect(),
        status,
        ..Default::default()
    }
}

fn kv(key: &str, value: &AttrValue) -> KeyValue {
    let value = match value {
        AttrValue::Str(s) => Value::StringValue(s.clone()),
        AttrValue::Int(i) => Value::IntValue(*i),
        AttrValue::Float(f) => Value::DoubleValue(*f),
        AttrValue::Bool(b) => Value::BoolValue(*b),
    };
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue { value: Some(value) }),
    }
}

fn unix_nanos(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or_default()
}
