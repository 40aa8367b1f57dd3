//! PV sampling against the reporter endpoint.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::request::RequestTemplate;

/// Takes one process-variable sample per call through a shared client.
///
/// Only one sample is in flight at a time within a run; the client is
/// shared across samples for connection reuse, never for concurrency.
#[derive(Debug)]
pub struct Sampler {
    client: Client<HttpConnector, Full<Bytes>>,
    template: RequestTemplate,
    timeout: Duration,
}

impl Sampler {
    /// Build a sampler around a prepared request template.
    ///
    /// `timeout` bounds each individual request; there is no
    /// cycle-level timeout beyond the sampling schedule itself.
    pub fn new(template: RequestTemplate, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            template,
            timeout,
        }
    }

    /// The reporter URI this sampler targets.
    pub fn uri(&self) -> &http::Uri {
        self.template.uri()
    }

    /// Take one PV sample.
    ///
    /// Sends a fresh clone of the template request, reads the whole
    /// response body, and parses it as a base-10 unsigned integer in
    /// [0,100]. Every failure mode — send, timeout, body read, parse,
    /// range — is fatal to the run; there is no retry here. Callers
    /// wanting resilience must wrap the reporter, not this loop.
    pub async fn sample(&self) -> ControlResult<u8> {
        let req = self.template.clone_request();

        let resp = match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(result) => result?,
            Err(_) => return Err(ControlError::Timeout(self.timeout)),
        };

        let status = resp.status();
        let body = resp.into_body().collect().await?.to_bytes();
        let text = String::from_utf8_lossy(&body);
        debug!(%status, body = %text, "reporter response");

        // The status line is not inspected; a non-2xx body simply
        // fails to parse as an integer, matching the wire contract of
        // "ASCII digits, nothing else".
        let pv: u64 = text.parse().map_err(|source| ControlError::Protocol {
            body: text.into_owned(),
            source,
        })?;
        if pv > 100 {
            return Err(ControlError::PvOutOfRange(pv));
        }
        Ok(pv as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned plain-text responses on a loopback port.
    ///
    /// Closes each connection after one response so the pooled client
    /// reconnects per request.
    async fn spawn_reporter(body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(resp.as_bytes()).await;
                });
            }
        });
        addr
    }

    fn sampler_for(addr: SocketAddr) -> Sampler {
        let template = RequestTemplate::new(
            Method::GET,
            format!("http://{addr}/cpu").parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        );
        Sampler::new(template, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn parses_valid_pv() {
        let addr = spawn_reporter("42").await;
        let pv = sampler_for(addr).sample().await.unwrap();
        assert_eq!(pv, 42);
    }

    #[tokio::test]
    async fn boundary_values_accepted() {
        let addr = spawn_reporter("100").await;
        assert_eq!(sampler_for(addr).sample().await.unwrap(), 100);
        let addr = spawn_reporter("0").await;
        assert_eq!(sampler_for(addr).sample().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_numeric_body_is_protocol_error() {
        let addr = spawn_reporter("abc").await;
        let err = sampler_for(addr).sample().await.unwrap_err();
        assert!(matches!(err, ControlError::Protocol { body, .. } if body == "abc"));
    }

    #[tokio::test]
    async fn trailing_newline_is_protocol_error() {
        // The contract is digits and nothing else; no trimming.
        let addr = spawn_reporter("42\n").await;
        let err = sampler_for(addr).sample().await.unwrap_err();
        assert!(matches!(err, ControlError::Protocol { .. }));
    }

    #[tokio::test]
    async fn out_of_range_pv_is_fatal() {
        let addr = spawn_reporter("101").await;
        let err = sampler_for(addr).sample().await.unwrap_err();
        assert!(matches!(err, ControlError::PvOutOfRange(101)));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Bind and immediately drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = sampler_for(addr).sample().await.unwrap_err();
        assert!(matches!(err, ControlError::Transport(_)));
    }
}
