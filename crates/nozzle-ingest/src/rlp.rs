use crate::error::IngestError;
use crate::uaa::UaaClient;
use futures::{Stream, StreamExt};
use http::header::{ACCEPT, AUTHORIZATION};
use http::StatusCode;
use nozzle_types::EnvelopeBatch;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pause before refetching a token after the gateway rejects one.
const TOKEN_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Pause between stream reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Client for the RLP gateway's v2 egress endpoint.
///
/// Subscribes with counter and gauge selectors under the configured shard
/// id and surfaces the response as a lazy, infinite sequence of envelope
/// batches. The bearer token is cached across requests; a 401 or 403
/// discards it and the request is retried exactly once with a fresh one.
#[derive(Debug)]
pub struct RlpGatewayClient {
    client: reqwest::Client,
    read_url: String,
    shard_id: String,
    uaa: Option<UaaClient>,
    token: Mutex<Option<String>>,
}

impl RlpGatewayClient {
    /// `uaa: None` disables access control entirely.
    pub fn new(
        rlp_url: &str,
        shard_id: impl Into<String>,
        uaa: Option<UaaClient>,
        skip_ssl_verify: bool,
    ) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_ssl_verify)
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(IngestError::ClientBuild)?;

        Ok(Self {
            client,
            read_url: format!("{}/v2/read", rlp_url.trim_end_matches('/')),
            shard_id: shard_id.into(),
            uaa,
            token: Mutex::new(None),
        })
    }

    /// Ensures a token is cached. Called once at startup so that an
    /// unreachable or misconfigured UAA fails the process instead of the
    /// reconnect loop.
    pub async fn prime_token(&self) -> Result<(), IngestError> {
        let Some(uaa) = &self.uaa else {
            return Ok(());
        };

        let mut slot = self.token.lock().await;
        if slot.is_none() {
            *slot = Some(uaa.fetch_token().await?);
        }
        Ok(())
    }

    async fn authorization(&self) -> Result<Option<String>, IngestError> {
        let Some(uaa) = &self.uaa else {
            return Ok(None);
        };

        let mut slot = self.token.lock().await;
        match slot.as_ref() {
            Some(token) => Ok(Some(token.clone())),
            None => {
                let token = uaa.fetch_token().await?;
                *slot = Some(token.clone());
                Ok(Some(token))
            }
        }
    }

    async fn request(&self) -> Result<reqwest::Response, IngestError> {
        let mut request = self
            .client
            .get(&self.read_url)
            .query(&[
                ("shard_id", self.shard_id.as_str()),
                ("counter", ""),
                ("gauge", ""),
            ])
            .header(ACCEPT, "text/event-stream");

        if let Some(token) = self.authorization().await? {
            request = request.header(AUTHORIZATION, token);
        }

        request.send().await.map_err(IngestError::StreamRequest)
    }

    /// Opens the egress stream, refreshing the token once on 401/403.
    async fn connect(&self) -> Result<reqwest::Response, IngestError> {
        let response = self.request().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(%status, "gateway rejected cached token, refreshing");
            self.token.lock().await.take();
            tokio::time::sleep(TOKEN_RETRY_DELAY).await;

            let retry = self.request().await?;
            if !retry.status().is_success() {
                return Err(IngestError::StreamRejected(retry.status()));
            }
            return Ok(retry);
        }

        if !status.is_success() {
            return Err(IngestError::StreamRejected(status));
        }
        Ok(response)
    }

    /// The infinite batch sequence. Read errors and gateway disconnects
    /// reopen the stream; cancellation is the only clean exit.
    pub fn stream(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = EnvelopeBatch> + Send {
        async_stream::stream! {
            'connect: loop {
                if cancel.is_cancelled() {
                    break;
                }

                let response = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.connect() => match result {
                        Ok(response) => response,
                        Err(error) => {
                            warn!(%error, "RLP gateway connect failed, retrying");
                            tokio::time::sleep(RECONNECT_DELAY).await;
                            continue;
                        }
                    }
                };
                debug!(url = %self.read_url, "connected to RLP gateway egress stream");

                let mut body = response.bytes_stream();
                let mut parser = SseParser::new();

                loop {
                    let chunk = tokio::select! {
                        _ = cancel.cancelled() => break 'connect,
                        chunk = body.next() => chunk,
                    };

                    match chunk {
                        Some(Ok(bytes)) => {
                            for payload in parser.push(&bytes) {
                                match serde_json::from_str::<EnvelopeBatch>(&payload) {
                                    Ok(batch) => yield batch,
                                    Err(error) => {
                                        debug!(%error, "skipping undecodable stream event");
                                    }
                                }
                            }
                        }
                        Some(Err(error)) => {
                            warn!(%error, "stream read error, reopening");
                            break;
                        }
                        None => {
                            warn!("stream closed by gateway, reopening");
                            break;
                        }
                    }
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Incremental server-sent-events parser.
///
/// Events are blank-line delimited; only `data:` lines matter here.
/// Comment lines (leading `:`) and heartbeat events without data are
/// discarded.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the data payloads of any events the
    /// chunk completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(end) = find_delimiter(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let event = String::from_utf8_lossy(&event);

            let mut data = String::new();
            for line in event.lines() {
                if line.starts_with(':') {
                    continue;
                }
                if let Some(rest) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
                }
            }

            if !data.is_empty() {
                payloads.push(data);
            }
        }
        payloads
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}
