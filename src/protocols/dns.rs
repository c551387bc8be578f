//! DNS load testing over UDP.
//!
//! Input lines have the form `"<domain> <qtype>"` (e.g.
//! `"example.com A"`). Each request is encoded as a minimal DNS query
//! with a random transaction id; the response must echo that id back.
//!
//! With `--randomize` a cache-busting modifier prepends
//! `<unix-seconds>.<random-hex>.` to the question name of a fresh copy
//! of the cached request, so resolvers cannot serve the whole test from
//! a warm cache and the originals stay untouched.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::events::Nanos;
use crate::input::Modifier;
use crate::options::Options;
use crate::tester::{Executor, RequestError, RequestExecutor, Tester};
use crate::utils::{random_hex, with_default_port};

/// Default DNS server port, appended when the target has none.
pub const DEFAULT_SERVER_PORT: u16 = 53;

/// Length of the random hex component of cache-busting prefixes.
const PREFIX_LENGTH: usize = 16;

/// Maximum response size read back; EDNS is not negotiated.
const MAX_RESPONSE_SIZE: usize = 4096;

/// Supported question types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Any,
}

impl QueryType {
    /// Wire-format QTYPE code.
    pub fn code(self) -> u16 {
        match self {
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
            QueryType::Soa => 6,
            QueryType::Ptr => 12,
            QueryType::Mx => 15,
            QueryType::Txt => 16,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
            QueryType::Any => 255,
        }
    }
}

impl std::str::FromStr for QueryType {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "A" => Ok(QueryType::A),
            "NS" => Ok(QueryType::Ns),
            "CNAME" => Ok(QueryType::Cname),
            "SOA" => Ok(QueryType::Soa),
            "PTR" => Ok(QueryType::Ptr),
            "MX" => Ok(QueryType::Mx),
            "TXT" => Ok(QueryType::Txt),
            "AAAA" => Ok(QueryType::Aaaa),
            "SRV" => Ok(QueryType::Srv),
            "ANY" => Ok(QueryType::Any),
            _ => Err(anyhow!("invalid QType: {name:?}")),
        }
    }
}

/// One DNS question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub qtype: QueryType,
}

/// Parses an input line of the form `"<domain> <qtype>"`.
pub fn parse_query(line: &str) -> Result<Query> {
    let mut fields = line.split_whitespace();
    let (Some(domain), Some(qtype), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(anyhow!("invalid input: {line:?}, want \"Domain QType\""));
    };
    Ok(Query {
        name: domain.trim_end_matches('.').to_string(),
        qtype: qtype.parse()?,
    })
}

/// The modifiers to install for a DNS run.
pub fn modifiers(randomize: bool) -> Vec<Modifier<Query>> {
    if randomize {
        vec![Arc::new(random_prefix)]
    } else {
        Vec::new()
    }
}

/// Cache-busting modifier: returns a copy of the query whose name
/// carries a unique `<unix-seconds>.<random-hex>.` prefix.
pub fn random_prefix(query: Query) -> Query {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Query {
        name: format!("{}.{}.{}", seconds, random_hex(PREFIX_LENGTH), query.name),
        qtype: query.qtype,
    }
}

/// Encodes a query into a minimal wire-format message: a fixed header
/// with the RD bit set and a single question in the IN class.
fn encode(id: u16, query: &Query) -> Vec<u8> {
    let mut message = Vec::with_capacity(query.name.len() + 18);
    message.extend_from_slice(&id.to_be_bytes());
    message.extend_from_slice(&0x0100u16.to_be_bytes()); // flags: RD
    message.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    message.extend_from_slice(&[0; 6]); // AN/NS/AR counts
    for label in query.name.split('.').filter(|label| !label.is_empty()) {
        message.push(label.len() as u8);
        message.extend_from_slice(label.as_bytes());
    }
    message.push(0);
    message.extend_from_slice(&query.qtype.code().to_be_bytes());
    message.extend_from_slice(&1u16.to_be_bytes()); // class IN
    message
}

/// The parts of a response the tester cares about.
#[derive(Clone, Copy, Debug)]
pub struct Answer {
    pub id: u16,
    pub rcode: u8,
}

/// Sends one query and validates the response id echoes the query id.
pub struct DnsExecutor {
    target: String,
    timeout: Duration,
}

#[async_trait]
impl RequestExecutor<Query, Answer> for DnsExecutor {
    async fn execute(&self, _timestamp: Nanos, request: Query) -> Result<Answer, RequestError> {
        let id = rand::random::<u16>();
        let message = encode(id, &request);

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.target.as_str()).await?;
        timeout(self.timeout, socket.send(&message))
            .await
            .map_err(|_| RequestError::Timeout)??;

        let mut buffer = vec![0u8; MAX_RESPONSE_SIZE];
        let received = timeout(self.timeout, socket.recv(&mut buffer))
            .await
            .map_err(|_| RequestError::Timeout)??;
        if received < 12 {
            return Err(RequestError::InvalidResponse(format!(
                "truncated message: {received} bytes"
            )));
        }

        let answer = Answer {
            id: u16::from_be_bytes([buffer[0], buffer[1]]),
            rcode: buffer[3] & 0x0f,
        };
        if answer.id != id {
            return Err(RequestError::InvalidResponse(format!(
                "response id {}, want {id}",
                answer.id
            )));
        }
        Ok(answer)
    }
}

/// Load tester for DNS servers.
pub struct DnsTester {
    pub target: String,
    pub timeout: Duration,
}

#[async_trait]
impl Tester for DnsTester {
    type Request = Query;
    type Response = Answer;

    async fn request_executor(
        &mut self,
        _options: &Options<Query, Answer>,
    ) -> Result<Executor<Query, Answer>> {
        Ok(Arc::new(DnsExecutor {
            target: with_default_port(&self.target, DEFAULT_SERVER_PORT),
            timeout: self.timeout,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_reads_domain_and_type() {
        let query = parse_query("example.com AAAA").unwrap();
        assert_eq!(query.name, "example.com");
        assert_eq!(query.qtype, QueryType::Aaaa);
    }

    #[test]
    fn parse_query_is_case_insensitive_on_the_type() {
        assert_eq!(parse_query("example.com mx").unwrap().qtype, QueryType::Mx);
    }

    #[test]
    fn parse_query_rejects_malformed_lines() {
        for line in ["", "example.com", "example.com NOPE", "a b c"] {
            assert!(parse_query(line).is_err(), "{line:?} should be rejected");
        }
    }

    #[test]
    fn encode_produces_a_wellformed_question() {
        let query = Query {
            name: "example.com".to_string(),
            qtype: QueryType::A,
        };
        let message = encode(0x1234, &query);

        assert_eq!(&message[0..2], &[0x12, 0x34]);
        assert_eq!(&message[2..4], &[0x01, 0x00]); // RD
        assert_eq!(&message[4..6], &[0x00, 0x01]); // one question
        // 7example3com0 + type + class
        let question = &message[12..];
        assert_eq!(question[0], 7);
        assert_eq!(&question[1..8], b"example");
        assert_eq!(question[8], 3);
        assert_eq!(&question[9..12], b"com");
        assert_eq!(question[12], 0);
        assert_eq!(&question[13..15], &[0x00, 0x01]); // A
        assert_eq!(&question[15..17], &[0x00, 0x01]); // IN
    }

    /// Randomized copies share the original suffix, differ in prefix
    /// and leave the cached request untouched.
    #[test]
    fn random_prefix_preserves_the_suffix_and_the_original() {
        let original = Query {
            name: "example.com".to_string(),
            qtype: QueryType::A,
        };

        let first = random_prefix(original.clone());
        let second = random_prefix(original.clone());

        assert!(first.name.ends_with(".example.com"));
        assert!(second.name.ends_with(".example.com"));
        assert_ne!(first.name, second.name);
        assert_eq!(original.name, "example.com");
        assert_eq!(first.qtype, original.qtype);
    }

    #[tokio::test]
    async fn executor_round_trips_against_a_stub_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buffer = [0u8; 512];
            let (n, peer) = server.recv_from(&mut buffer).await.unwrap();
            // Echo the id back with QR set and NOERROR.
            buffer[2] = 0x80;
            buffer[3] = 0x00;
            server.send_to(&buffer[..n], peer).await.unwrap();
        });

        let executor = DnsExecutor {
            target: format!("127.0.0.1:{port}"),
            timeout: Duration::from_secs(1),
        };
        let answer = executor
            .execute(
                0,
                Query {
                    name: "example.com".to_string(),
                    qtype: QueryType::A,
                },
            )
            .await
            .unwrap();
        assert_eq!(answer.rcode, 0);
    }

    #[tokio::test]
    async fn executor_rejects_a_mismatched_id() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buffer = [0u8; 512];
            let (n, peer) = server.recv_from(&mut buffer).await.unwrap();
            buffer[0] ^= 0xff; // corrupt the id
            server.send_to(&buffer[..n], peer).await.unwrap();
        });

        let executor = DnsExecutor {
            target: format!("127.0.0.1:{port}"),
            timeout: Duration::from_secs(1),
        };
        let result = executor
            .execute(
                0,
                Query {
                    name: "example.com".to_string(),
                    qtype: QueryType::A,
                },
            )
            .await;
        assert!(matches!(result, Err(RequestError::InvalidResponse(_))));
    }
}
