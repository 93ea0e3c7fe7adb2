// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Status server: `/` index, `/health` and `/metrics`.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use slack_collector::metrics::CollectorMetrics;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vlogs_importer::metrics::DeliveryMetrics;

pub const INDEX_PATH: &str = "/";
pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/metrics";

const INDEX_HTML: &str = "<html>
  <head><title>slack2logs</title></head>
  <body>
    <h1>slack2logs</h1>
    <ul>
      <li><a href='/metrics'>Metrics</a></li>
      <li><a href='/health'>Health</a></li>
    </ul>
  </body>
</html>
";

/// Everything `/metrics` exposes.
#[derive(Debug, Clone)]
pub struct StatusMetrics {
    collector: Arc<CollectorMetrics>,
    delivery: Arc<DeliveryMetrics>,
}

impl StatusMetrics {
    #[must_use]
    pub fn new(collector: Arc<CollectorMetrics>, delivery: Arc<DeliveryMetrics>) -> Self {
        StatusMetrics {
            collector,
            delivery,
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.collector.write_prometheus(&mut out);
        self.delivery.write_prometheus(&mut out);
        out
    }
}

/// Serves until `shutdown` fires, then gives open connections `grace` to
/// finish.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<StatusMetrics>,
    shutdown: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut connections = JoinSet::new();
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP | Listening on {addr}");
    }

    loop {
        let conn = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            Some(finished) = connections.join_next() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!("HTTP | Connection handler panicked: {e:?}");
                    }
                }
                continue;
            }
            accepted = listener.accept() => match accepted {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("HTTP | Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, _)) => conn,
            },
        };

        let io = TokioIo::new(conn);
        let server = server.clone();
        let metrics = Arc::clone(&metrics);
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            let service = service_fn(move |req| {
                let metrics = Arc::clone(&metrics);
                async move { Ok::<_, Infallible>(route(&req, &metrics)) }
            });
            let conn = server.serve_connection(io, service);
            tokio::pin!(conn);
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        debug!("HTTP | Connection error: {e}");
                    }
                }
                () = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(e) = conn.await {
                        debug!("HTTP | Connection error during shutdown: {e}");
                    }
                }
            }
        });
    }

    info!("HTTP | Shutting down web server");
    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        connections.abort_all();
        anyhow::bail!(
            "cannot gracefully shutdown http server in {:.3}s",
            grace.as_secs_f64()
        );
    }
    Ok(())
}

pub fn route<B>(req: &Request<B>, metrics: &StatusMetrics) -> Response<Full<Bytes>> {
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        return respond(StatusCode::METHOD_NOT_ALLOWED, None, String::new());
    }
    match req.uri().path() {
        INDEX_PATH => respond(
            StatusCode::OK,
            Some("text/html; charset=UTF-8"),
            INDEX_HTML.to_string(),
        ),
        HEALTH_PATH => respond(StatusCode::OK, None, String::new()),
        METRICS_PATH => respond(
            StatusCode::OK,
            Some("text/plain; version=0.0.4"),
            metrics.render(),
        ),
        _ => respond(StatusCode::NOT_FOUND, None, String::new()),
    }
}

fn respond(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn metrics() -> StatusMetrics {
        let collector = Arc::new(CollectorMetrics::default());
        collector.inc_received();
        let delivery = Arc::new(DeliveryMetrics::default());
        delivery.inc_deliveries();
        StatusMetrics::new(collector, delivery)
    }

    fn get(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).unwrap()
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index() {
        let response = route(&get("/"), &metrics());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=UTF-8"
        );
        assert!(body_text(response).await.contains("<a href='/metrics'>"));
    }

    #[tokio::test]
    async fn test_health() {
        let response = route(&get("/health"), &metrics());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_metrics() {
        let response = route(&get("/metrics"), &metrics());
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("slack2logs_messages_received_total{source=\"slack\"} 1\n"));
        assert!(body.contains("slack2logs_messages_delivery_total{destination=\"vlogs\"} 1\n"));
    }

    #[test]
    fn test_unknown_path_and_method() {
        assert_eq!(
            route(&get("/debug"), &metrics()).status(),
            StatusCode::NOT_FOUND
        );
        let post = Request::builder()
            .method(Method::POST)
            .uri("/health")
            .body(())
            .unwrap();
        assert_eq!(
            route(&post, &metrics()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
