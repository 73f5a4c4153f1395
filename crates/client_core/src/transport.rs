//! Backend collaborator seams and their HTTP implementation.
//!
//! The backend exposes one SSE endpoint per search mode plus a stop endpoint per
//! mode. Everything here is transport only; the session rules live in the controller.

use std::{fmt::Display, time::Duration};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{header::ACCEPT, Client};
use shared::{
    domain::SearchQuery,
    protocol::{StopRequest, StopResponse},
};
use tracing::debug;

use crate::error::TransportError;

/// Data fields of the events received on one stream, in arrival order.
pub type EventStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait EventStreamConnector: Send + Sync {
    async fn open(&self, query: &SearchQuery) -> Result<EventStream, TransportError>;
}

#[async_trait]
pub trait CrawlerControlPlane: Send + Sync {
    async fn stop(&self, request: &StopRequest) -> Result<StopResponse, TransportError>;
}

/// Upper bound on one stop call. Event streams have no timeout.
pub const STOP_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpBackend {
    http: Client,
    base_url: String,
    stop_timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            stop_timeout: STOP_REQUEST_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl EventStreamConnector for HttpBackend {
    async fn open(&self, query: &SearchQuery) -> Result<EventStream, TransportError> {
        let url = self.endpoint(query.mode().receive_path());
        let response = self
            .http
            .get(&url)
            .query(&query.query_pairs())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| TransportError::Connect {
                url: url.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        debug!(%url, "ticket stream connected");
        Ok(sse_data_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl CrawlerControlPlane for HttpBackend {
    async fn stop(&self, request: &StopRequest) -> Result<StopResponse, TransportError> {
        let url = self.endpoint(request.mode().stop_path());
        let builder = self.http.post(&url).timeout(self.stop_timeout);
        let builder = match request {
            StopRequest::Stations(body) => builder.json(body),
            StopRequest::TrainCode(body) => builder.json(body),
        };

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout { url: url.clone() }
            } else {
                TransportError::Connect {
                    url: url.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<StopResponse>()
            .await
            .map_err(|err| TransportError::Body {
                url,
                message: err.to_string(),
            })
    }
}

/// Turns a raw byte stream into the data payloads of the SSE events it carries.
pub fn sse_data_stream<S, B, E>(chunks: S) -> EventStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    chunks
        .scan(SseDecoder::default(), |decoder, chunk| {
            let events = match chunk {
                Ok(bytes) => decoder.push(bytes.as_ref()),
                Err(err) => vec![Err(TransportError::Read(err.to_string()))],
            };
            futures::future::ready(Some(futures::stream::iter(events)))
        })
        .flatten()
        .boxed()
}

/// Incremental `text/event-stream` decoder that yields each event's `data` field.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    invalid: bool,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, TransportError>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.feed_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn feed_line(&mut self, line: Vec<u8>) -> Option<Result<String, TransportError>> {
        if line.is_empty() {
            return self.dispatch();
        }

        let Ok(line) = String::from_utf8(line) else {
            self.invalid = true;
            return None;
        };
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<String, TransportError>> {
        if std::mem::take(&mut self.invalid) {
            self.data_lines.clear();
            return Some(Err(TransportError::InvalidEncoding));
        }
        if self.data_lines.is_empty() {
            return None;
        }
        Some(Ok(std::mem::take(&mut self.data_lines).join("\n")))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
