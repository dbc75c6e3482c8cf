use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{TimeZone, Utc};
use glbtrace_core::model::record::{
    EntryLabels, HttpRequest, LogRecord, MonitoredResource, ResourceLabels,
};

/// A Cloud Run request log as the load balancer writes it.
pub fn sample_record() -> LogRecord {
    LogRecord {
        http_request: HttpRequest {
            latency: "0.123s".to_string(),
            protocol: "HTTP/1.1".to_string(),
            remote_ip: "203.0.113.7".to_string(),
            request_method: "GET".to_string(),
            request_size: "512".to_string(),
            request_url: "https://orders.example.com/api/orders?page=2".to_string(),
            response_size: "2048".to_string(),
            server_ip: "10.8.0.3".to_string(),
            status: 200,
            user_agent: "curl/8.4.0".to_string(),
        },
        insert_id: "65f1c2a3000b1e2f".to_string(),
        labels: EntryLabels {
            instance_id: "00c61b117c".to_string(),
        },
        log_name: "projects/shop-prod/logs/run.googleapis.com%2Frequests".to_string(),
        receive_timestamp: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 1).unwrap()),
        resource: MonitoredResource {
            labels: ResourceLabels {
                configuration_name: "orders".to_string(),
                location: "europe-west1".to_string(),
                project_id: "shop-prod".to_string(),
                revision_name: "orders-00042-abc".to_string(),
                service_name: "orders".to_string(),
            },
            resource_type: "cloud_run_revision".to_string(),
        },
        severity: "INFO".to_string(),
        span_id: "12345".to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        trace: "projects/shop-prod/traces/4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
        trace_sampled: true,
    }
}

pub fn sample_record_json(record: &LogRecord) -> String {
    serde_json::to_string(record).unwrap()
}

/// Wraps a payload the way a Pub/Sub push subscription delivers it.
pub fn push_envelope(payload: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "message": {
            "data": STANDARD_NO_PAD.encode(payload),
            "messageId": "1234567890",
            "publishTime": "2026-02-01T00:00:02Z",
        },
        "subscription": "projects/shop-prod/subscriptions/glb-requests",
    }))
    .unwrap()
}
