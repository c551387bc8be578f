//! HTTP load testing via a shared client.
//!
//! Input lines have the form `"GET <path>"` or `"POST <path> <form>"`,
//! where `<form>` is an urlencoded body. The target supplies the host,
//! `--ssl` the scheme. Any response other than `200 OK` counts as a
//! request error; bodies are drained to force the full download.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use crate::events::Nanos;
use crate::options::Options;
use crate::tester::{Executor, RequestError, RequestExecutor, Tester};

const FORMATS: &str = "'GET RelativeURL' or 'POST RelativeURL FormData'";

/// One prepared HTTP request.
#[derive(Clone, Debug)]
pub enum HttpRequest {
    Get { url: String },
    Post { url: String, body: String },
}

/// The parts of a response the tester cares about.
#[derive(Clone, Copy, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: usize,
}

/// Builds the input transformer for a target and scheme.
pub fn transformer(ssl: bool, target: &str) -> impl Fn(&str) -> Result<HttpRequest> {
    let scheme = if ssl { "https" } else { "http" };
    let target = target.to_string();

    move |line: &str| {
        let (method, rest) = line
            .split_once(' ')
            .ok_or_else(|| anyhow!("invalid request, want {FORMATS}, got {line:?}"))?;
        match method {
            "GET" => Ok(HttpRequest::Get {
                url: join_url(scheme, &target, rest)?,
            }),
            "POST" => {
                let (path, body) = rest.split_once(' ').ok_or_else(|| {
                    anyhow!("invalid request, want {FORMATS}, got \"POST {rest}\"")
                })?;
                Ok(HttpRequest::Post {
                    url: join_url(scheme, &target, path)?,
                    body: body.to_string(),
                })
            }
            _ => Err(anyhow!("invalid method, want (GET|POST), got {method:?}")),
        }
    }
}

fn join_url(scheme: &str, target: &str, path: &str) -> Result<String> {
    let url = format!("{scheme}://{target}/{}", path.trim_start_matches('/'));
    Url::parse(&url).with_context(|| format!("invalid url {url:?}"))?;
    Ok(url)
}

/// Sends one request through the shared client and checks for `200 OK`.
pub struct HttpExecutor {
    client: Client,
}

#[async_trait]
impl RequestExecutor<HttpRequest, HttpResponse> for HttpExecutor {
    async fn execute(
        &self,
        _timestamp: Nanos,
        request: HttpRequest,
    ) -> Result<HttpResponse, RequestError> {
        let builder = match request {
            HttpRequest::Get { url } => self.client.get(url),
            HttpRequest::Post { url, body } => self
                .client
                .post(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body),
        };

        let response = builder.send().await.map_err(request_error)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(RequestError::InvalidResponse(format!(
                "response status {status:?}, want \"200 OK\""
            )));
        }

        // Drain the body to force the full download.
        let body = response.bytes().await.map_err(request_error)?;
        Ok(HttpResponse {
            status: status.as_u16(),
            bytes: body.len(),
        })
    }
}

fn request_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else {
        RequestError::Other(err.to_string())
    }
}

/// Load tester for HTTP endpoints.
pub struct HttpTester {
    pub timeout: Duration,
    client: Option<Client>,
}

impl HttpTester {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: None,
        }
    }
}

#[async_trait]
impl Tester for HttpTester {
    type Request = HttpRequest;
    type Response = HttpResponse;

    async fn before(&mut self, _options: &mut Options<HttpRequest, HttpResponse>) -> Result<()> {
        self.client = Some(
            Client::builder()
                .timeout(self.timeout)
                .build()
                .context("failed to build the http client")?,
        );
        Ok(())
    }

    async fn request_executor(
        &mut self,
        _options: &Options<HttpRequest, HttpResponse>,
    ) -> Result<Executor<HttpRequest, HttpResponse>> {
        let client = self
            .client
            .clone()
            .context("http client requested before setup")?;
        Ok(Arc::new(HttpExecutor { client }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transformer_parses_get_requests() {
        let transform = transformer(false, "example.com:8080");
        match transform("GET /status").unwrap() {
            HttpRequest::Get { url } => assert_eq!(url, "http://example.com:8080/status"),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn transformer_parses_post_requests_with_bodies() {
        let transform = transformer(true, "example.com");
        match transform("POST /login user=a&pass=b").unwrap() {
            HttpRequest::Post { url, body } => {
                assert_eq!(url, "https://example.com/login");
                assert_eq!(body, "user=a&pass=b");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn transformer_normalises_leading_slashes() {
        let transform = transformer(false, "example.com");
        match transform("GET status").unwrap() {
            HttpRequest::Get { url } => assert_eq!(url, "http://example.com/status"),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn transformer_rejects_malformed_lines() {
        let transform = transformer(false, "example.com");
        for line in ["", "GET", "PUT /x", "POST /x"] {
            assert!(transform(line).is_err(), "{line:?} should be rejected");
        }
    }
}
