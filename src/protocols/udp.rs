//! UDP load testing: fire prepared datagrams at a host and read one
//! response each.
//!
//! Input lines have the form `"<port> <base64-payload>"`; the target
//! flag supplies the host and each datagram its own port, so one input
//! file can exercise several services on the same box.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::events::Nanos;
use crate::options::Options;
use crate::tester::{Executor, RequestError, RequestExecutor, Tester};

/// Maximum UDP response size read back.
pub const MAX_RESPONSE_SIZE: usize = 2048;

/// One prepared datagram.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub port: u16,
    pub data: Vec<u8>,
}

/// Validates a response payload against the datagram that elicited it.
pub type ResponseValidator = Arc<dyn Fn(&Datagram, &[u8]) -> Result<(), RequestError> + Send + Sync>;

/// Parses an input line of the form `"<port> <base64-payload>"`.
pub fn parse_datagram(line: &str) -> Result<Datagram> {
    let mut fields = line.split_whitespace();
    let (Some(port), Some(payload), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(anyhow!(
            "invalid datagram: {line:?}, want \"Port Base64Payload\""
        ));
    };
    Ok(Datagram {
        port: port
            .parse()
            .with_context(|| format!("invalid port {port:?}"))?,
        data: BASE64
            .decode(payload)
            .with_context(|| format!("invalid base64 payload {payload:?}"))?,
    })
}

/// Sends one datagram and reads one response under the test timeout.
pub struct UdpExecutor {
    host: String,
    timeout: Duration,
    validator: Option<ResponseValidator>,
}

#[async_trait]
impl RequestExecutor<Datagram, Vec<u8>> for UdpExecutor {
    async fn execute(&self, _timestamp: Nanos, request: Datagram) -> Result<Vec<u8>, RequestError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect((self.host.as_str(), request.port))
            .await?;

        timeout(self.timeout, socket.send(&request.data))
            .await
            .map_err(|_| RequestError::Timeout)??;

        let mut buffer = vec![0u8; MAX_RESPONSE_SIZE];
        let received = timeout(self.timeout, socket.recv(&mut buffer))
            .await
            .map_err(|_| RequestError::Timeout)??;
        buffer.truncate(received);

        if let Some(validator) = &self.validator {
            validator(&request, &buffer)?;
        }
        Ok(buffer)
    }
}

/// Load tester for raw UDP services.
pub struct UdpTester {
    pub target: String,
    pub timeout: Duration,
    /// Accepts any response when unset.
    pub validator: Option<ResponseValidator>,
}

#[async_trait]
impl Tester for UdpTester {
    type Request = Datagram;
    type Response = Vec<u8>;

    async fn request_executor(
        &mut self,
        _options: &Options<Datagram, Vec<u8>>,
    ) -> Result<Executor<Datagram, Vec<u8>>> {
        Ok(Arc::new(UdpExecutor {
            host: self.target.clone(),
            timeout: self.timeout,
            validator: self.validator.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_datagram_decodes_port_and_payload() {
        let datagram = parse_datagram("5353 aGVsbG8=").unwrap();
        assert_eq!(datagram.port, 5353);
        assert_eq!(datagram.data, b"hello");
    }

    #[test]
    fn parse_datagram_rejects_malformed_lines() {
        for line in ["", "5353", "notaport aGVsbG8=", "5353 not-base64!", "1 two three"] {
            assert!(parse_datagram(line).is_err(), "{line:?} should be rejected");
        }
    }

    /// An executor against a local echo socket round-trips the payload.
    #[tokio::test]
    async fn executor_round_trips_against_an_echo_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let (n, peer) = server.recv_from(&mut buffer).await.unwrap();
            server.send_to(&buffer[..n], peer).await.unwrap();
        });

        let executor = UdpExecutor {
            host: "127.0.0.1".to_string(),
            timeout: Duration::from_secs(1),
            validator: None,
        };
        let response = executor
            .execute(
                0,
                Datagram {
                    port,
                    data: b"ping".to_vec(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response, b"ping");
    }

    #[tokio::test]
    async fn executor_times_out_without_a_response() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let executor = UdpExecutor {
            host: "127.0.0.1".to_string(),
            timeout: Duration::from_millis(50),
            validator: None,
        };
        let result = executor
            .execute(
                0,
                Datagram {
                    port,
                    data: b"ping".to_vec(),
                },
            )
            .await;
        assert!(matches!(result, Err(RequestError::Timeout)));
    }
}
