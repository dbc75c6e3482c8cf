use std::io::Write;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use glbtrace_core::config::Config;
use glbtrace_core::error::{GlbError, Result};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use prost::Message;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tonic::codec::CompressionEncoding;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::Channel;

/// Sends one OTLP trace request. A single attempt; retrying is up to the
/// caller.
#[tonic::async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, request: ExportTraceServiceRequest) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub endpoint: String,
    pub protocol: ExportProtocol,
    pub compression: ExportCompression,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportCompression {
    None,
    Gzip,
}

impl ExportProtocol {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "grpc" => Self::Grpc,
            _ => Self::HttpProtobuf,
        }
    }
}

impl ExportCompression {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Self::Gzip,
            _ => Self::None,
        }
    }
}

impl From<&Config> for ExportConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            endpoint: cfg.sink_endpoint.clone(),
            protocol: ExportProtocol::parse(&cfg.sink_protocol),
            compression: ExportCompression::parse(&cfg.sink_compression),
            headers: cfg.export_headers(),
            timeout: cfg.sink_timeout,
        }
    }
}

/// Must be called from within a tokio runtime; the gRPC channel connects
/// lazily on first export.
pub fn build_exporter(cfg: &ExportConfig) -> Result<Box<dyn Exporter>> {
    match cfg.protocol {
        ExportProtocol::Grpc => Ok(Box::new(GrpcExporter::new(cfg)?)),
        ExportProtocol::HttpProtobuf => Ok(Box::new(HttpExporter::new(cfg)?)),
    }
}

pub struct GrpcExporter {
    client: TraceServiceClient<Channel>,
    metadata: MetadataMap,
    timeout: Duration,
}

impl GrpcExporter {
    pub fn new(cfg: &ExportConfig) -> Result<Self> {
        let endpoint = normalize_grpc_endpoint(&cfg.endpoint);
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| GlbError::Config(format!("invalid gRPC sink endpoint: {e}")))?
            .connect_lazy();
        let client = match cfg.compression {
            ExportCompression::Gzip => TraceServiceClient::new(channel)
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip),
            ExportCompression::None => TraceServiceClient::new(channel),
        };
        Ok(Self {
            client,
            metadata: build_grpc_metadata(&cfg.headers),
            timeout: cfg.timeout,
        })
    }
}

#[tonic::async_trait]
impl Exporter for GrpcExporter {
    async fn export(&self, request: ExportTraceServiceRequest) -> Result<()> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(request);
        request.set_timeout(self.timeout);
        *request.metadata_mut() = self.metadata.clone();
        client
            .export(request)
            .await
            .map(|_| ())
            .map_err(|status| GlbError::Ingest(format!("gRPC export failed: {status}")))
    }
}

pub struct HttpExporter {
    client: Client,
    url: String,
    headers: HeaderMap,
    compression: ExportCompression,
}

impl HttpExporter {
    pub fn new(cfg: &ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| GlbError::Config(format!("failed to build sink http client: {e}")))?;
        Ok(Self {
            client,
            url: traces_url(&cfg.endpoint),
            headers: build_http_headers(&cfg.headers),
            compression: cfg.compression,
        })
    }
}

#[tonic::async_trait]
impl Exporter for HttpExporter {
    async fn export(&self, request: ExportTraceServiceRequest) -> Result<()> {
        let (body, content_encoding) =
            maybe_compress_http_body(request.encode_to_vec(), self.compression)
                .map_err(|e| GlbError::Io(format!("failed to compress export body: {e}")))?;

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/x-protobuf")
            .headers(self.headers.clone());
        if let Some(encoding) = content_encoding {
            req = req.header("content-encoding", encoding);
        }
        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| GlbError::Ingest(format!("http export to {} failed: {e}", self.url)))?;
        if !resp.status().is_success() {
            return Err(GlbError::Ingest(format!(
                "http export to {} returned {}",
                self.url,
                resp.status()
            )));
        }
        Ok(())
    }
}

fn normalize_grpc_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

fn traces_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.ends_with("/v1/traces") {
        endpoint.to_string()
    } else {
        format!("{endpoint}/v1/traces")
    }
}

fn build_grpc_metadata(headers: &[(String, String)]) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (k, v) in headers {
        let key = MetadataKey::<Ascii>::from_bytes(k.as_bytes());
        let value = MetadataValue::try_from(v.as_str());
        match (key, value) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid sink gRPC header");
            }
        }
    }
    metadata
}

fn build_http_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::try_from(k.as_str());
        let value = HeaderValue::try_from(v.as_str());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid sink HTTP header");
            }
        }
    }
    out
}

fn maybe_compress_http_body(
    body: Vec<u8>,
    compression: ExportCompression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        ExportCompression::None => Ok((body, None)),
        ExportCompression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;
            Ok((compressed, Some("gzip")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn protocol_and_compression_parse_variants() {
        assert_eq!(ExportProtocol::parse("grpc"), ExportProtocol::Grpc);
        assert_eq!(ExportProtocol::parse("GRPC"), ExportProtocol::Grpc);
        assert_eq!(
            ExportProtocol::parse("http/protobuf"),
            ExportProtocol::HttpProtobuf
        );
        assert_eq!(ExportCompression::parse("gzip"), ExportCompression::Gzip);
        assert_eq!(
            ExportCompression::parse("unexpected"),
            ExportCompression::None
        );
    }

    #[test]
    fn traces_url_appends_signal_path_once() {
        assert_eq!(
            traces_url("https://api.honeycomb.io"),
            "https://api.honeycomb.io/v1/traces"
        );
        assert_eq!(
            traces_url("https://api.honeycomb.io/"),
            "https://api.honeycomb.io/v1/traces"
        );
        assert_eq!(
            traces_url("http://collector:4318/v1/traces"),
            "http://collector:4318/v1/traces"
        );
    }

    #[test]
    fn grpc_endpoint_gets_scheme() {
        assert_eq!(normalize_grpc_endpoint("collector:4317"), "http://collector:4317");
        assert_eq!(
            normalize_grpc_endpoint("https://collector:4317"),
            "https://collector:4317"
        );
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let headers = build_http_headers(&[
            ("x-honeycomb-team".into(), "key".into()),
            ("bad header".into(), "v".into()),
        ]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-honeycomb-team"], "key");
    }

    #[test]
    fn gzip_body_round_trips() {
        let (body, encoding) =
            maybe_compress_http_body(b"payload".to_vec(), ExportCompression::Gzip).unwrap();
        assert_eq!(encoding, Some("gzip"));
        let mut out = String::new();
        GzDecoder::new(body.as_slice()).read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");
    }

    #[test]
    fn export_config_carries_credentials() {
        let cfg = Config {
            api_key: Some("key".into()),
            dataset: Some("glb".into()),
            sink_protocol: "grpc".into(),
            ..Config::default()
        };
        let export = ExportConfig::from(&cfg);
        assert_eq!(export.protocol, ExportProtocol::Grpc);
        assert_eq!(export.headers.len(), 2);
    }
}
