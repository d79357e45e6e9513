//! Downstream HTTP forwarding with pooling, deadline, and header hygiene

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{HeaderMap, Method, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::tokio::TokioExecutor;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

/// Transport-level forwarding failure. A downstream *response* of any status
/// is not an error here: it is passed through and must never be retried.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("invalid target url: {0}")]
    BadTarget(#[from] hyper::http::uri::InvalidUri),

    #[error("downstream call exceeded {0:?} deadline")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// HTTP forwarder with connection pooling. The inbound body is collected to
/// `Bytes` by the caller so the same request can be replayed against a
/// different instance after a transport failure.
pub struct RequestForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl RequestForwarder {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(connector);

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward one attempt to `target_url` and collect the full response.
    pub async fn forward(
        &self,
        target_url: &str,
        method: Method,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Bytes>, ForwardError> {
        let uri: Uri = target_url.parse()?;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(outbound) = builder.headers_mut() {
            for (name, value) in headers {
                if !is_hop_by_hop_header(name.as_str()) {
                    outbound.append(name.clone(), value.clone());
                }
            }
            // The client derives Host from the target authority.
            outbound.remove(hyper::header::HOST);
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        debug!("forwarding to {}", target_url);

        match tokio_timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let (parts, body) = response.into_parts();
                let bytes = body
                    .collect()
                    .await
                    .map_err(|e| ForwardError::Transport(e.to_string()))?
                    .to_bytes();
                debug!(
                    "downstream answered {} ({} bytes)",
                    parts.status,
                    bytes.len()
                );
                Ok(Response::from_parts(parts, bytes))
            }
            Ok(Err(e)) => {
                warn!("transport failure talking to {}: {}", target_url, e);
                Err(ForwardError::Transport(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "deadline of {:?} exceeded talking to {}",
                    self.timeout, target_url
                );
                Err(ForwardError::Timeout(self.timeout))
            }
        }
    }
}

/// Hop-by-hop headers are a property of one connection and must not cross
/// the proxy.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::StatusCode;
    use hyper_util::rt::tokio::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    #[test]
    fn hop_by_hop_headers_are_recognized() {
        assert!(is_hop_by_hop_header("connection"));
        assert!(is_hop_by_hop_header("Transfer-Encoding"));
        assert!(!is_hop_by_hop_header("content-type"));
        assert!(!is_hop_by_hop_header("authorization"));
    }

    /// Echo stub: answers 200 with the request's path and echoed marker
    /// header.
    async fn spawn_echo_stub() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::task::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::task::spawn(async move {
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let marker = req
                            .headers()
                            .get("x-marker")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("none")
                            .to_string();
                        let response = Response::builder()
                            .status(StatusCode::OK)
                            .header("x-echoed-marker", marker)
                            .body(Full::new(Bytes::from(req.uri().path().to_string())))
                            .unwrap();
                        Ok::<_, std::convert::Infallible>(response)
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn forwards_method_path_and_headers() {
        let addr = spawn_echo_stub().await;
        let forwarder = RequestForwarder::new(Duration::from_secs(2));

        let mut headers = HeaderMap::new();
        headers.insert("x-marker", "42".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());

        let response = forwarder
            .forward(
                &format!("http://{}/cars/3", addr),
                Method::GET,
                &headers,
                Bytes::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-echoed-marker"], "42");
        assert_eq!(response.body().as_ref(), b"/cars/3");
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = RequestForwarder::new(Duration::from_millis(500));
        let err = forwarder
            .forward(
                &format!("http://{}/", addr),
                Method::GET,
                &HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_server_hits_the_deadline() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::task::spawn(async move {
            let mut held = Vec::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                held.push(stream);
            }
        });

        let forwarder = RequestForwarder::new(Duration::from_millis(200));
        let err = forwarder
            .forward(
                &format!("http://{}/", addr),
                Method::GET,
                &HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Timeout(_)));
    }
}
