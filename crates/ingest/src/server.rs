use std::future::Future;
use std::net::SocketAddr;

use glbtrace_core::error::{GlbError, Result};

use crate::mapper::SpanMapper;
use crate::pubsub::http;

/// Serves the push endpoint until `shutdown` resolves.
pub async fn run_push_server<F>(addr: SocketAddr, mapper: SpanMapper, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GlbError::Io(format!("failed to bind {addr}: {e}")))?;
    serve(listener, mapper, shutdown).await
}

pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    mapper: SpanMapper,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, path = http::PUSH_PATH, "listening for push messages");
    }
    axum::serve(listener, http::router(mapper))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GlbError::Ingest(format!("HTTP server failed: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use testkit::{push_envelope, sample_record, sample_record_json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;
    use crate::mapper::MapperConfig;
    use crate::sink::MemorySink;

    #[tokio::test]
    async fn serves_push_over_tcp_until_shutdown() -> anyhow::Result<()> {
        let sink = MemorySink::new();
        let mapper = SpanMapper::new(MapperConfig::default(), Arc::new(sink.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, mapper, async {
            let _ = stop_rx.await;
        }));

        let body = push_envelope(&sample_record_json(&sample_record()));
        let mut stream = tokio::net::TcpStream::connect(addr).await?;
        let head = format!(
            "POST {} HTTP/1.1\r\nhost: {addr}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            http::PUSH_PATH,
            body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&body).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert_eq!(sink.spans().len(), 1);

        let _ = stop_tx.send(());
        server.await??;
        Ok(())
    }
}
