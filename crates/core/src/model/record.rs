use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Cloud Logging entry written by the load balancer for one request.
///
/// Unknown keys are ignored and absent strings default to empty, but a key
/// present with the wrong JSON type fails the whole parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub http_request: HttpRequest,
    #[serde(default)]
    pub insert_id: String,
    #[serde(default)]
    pub labels: EntryLabels,
    #[serde(default)]
    pub log_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource: MonitoredResource,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub span_id: String,
    /// End of the request.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub trace: String,
    #[serde(default)]
    pub trace_sampled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default)]
    pub latency: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub remote_ip: String,
    #[serde(default)]
    pub request_method: String,
    #[serde(default)]
    pub request_size: String,
    #[serde(default)]
    pub request_url: String,
    #[serde(default)]
    pub response_size: String,
    #[serde(default)]
    pub server_ip: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryLabels {
    #[serde(default)]
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitoredResource {
    #[serde(default)]
    pub labels: ResourceLabels,
    #[serde(default, rename = "type")]
    pub resource_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceLabels {
    #[serde(default)]
    pub configuration_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub revision_name: String,
    #[serde(default)]
    pub service_name: String,
}

impl LogRecord {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_cloud_logging_entry() {
        let raw = r#"{
            "httpRequest": {
                "latency": "0.123s",
                "remoteIp": "10.0.0.1",
                "requestMethod": "GET",
                "requestUrl": "https://svc.example.com/a",
                "status": 200,
                "userAgent": "curl/8.0"
            },
            "resource": {
                "labels": {"service_name": "api", "location": "europe-west1"},
                "type": "cloud_run_revision"
            },
            "spanId": "42",
            "timestamp": "2024-01-01T00:00:10Z",
            "trace": "projects/p/traces/abc",
            "someFutureField": {"nested": true}
        }"#;

        let record = LogRecord::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(record.http_request.request_method, "GET");
        assert_eq!(record.http_request.status, 200);
        assert_eq!(record.resource.labels.service_name, "api");
        assert_eq!(record.resource.resource_type, "cloud_run_revision");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap()
        );
        assert_eq!(record.insert_id, "");
    }

    #[test]
    fn rejects_type_mismatch() {
        let raw = r#"{"timestamp": "2024-01-01T00:00:10Z", "httpRequest": {"status": "200"}}"#;
        assert!(LogRecord::from_slice(raw.as_bytes()).is_err());

        let raw = r#"{"timestamp": "2024-01-01T00:00:10Z", "spanId": 42}"#;
        assert!(LogRecord::from_slice(raw.as_bytes()).is_err());
    }

    #[test]
    fn requires_timestamp() {
        assert!(LogRecord::from_slice(br#"{"spanId": "1"}"#).is_err());
        assert!(LogRecord::from_slice(b"").is_err());
    }
}
