//! Directory request client
//!
//! One TCP connection per request: write the request line, read exactly one
//! response line, close. Failures are returned to the caller and never
//! affect the presence loop or the listener.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::config::DirectoryConfig;
use crate::errors::{BuddyResult, TransportError};
use crate::protocol::directory::{DirectoryRequest, DirectoryResponse};
use crate::protocol::handshake;

/// Longest response line we are willing to buffer
const MAX_RESPONSE_LENGTH: usize = 4096;

/// Client for the directory's REG/ADD/DEL requests
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    endpoint: String,
    timeout: Duration,
}

impl DirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            endpoint: config.tcp_endpoint(),
            timeout: config.request_timeout(),
        }
    }

    /// Client for an explicit `host:port`
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn register(&self, user_id: &str) -> BuddyResult<DirectoryResponse> {
        self.request(DirectoryRequest::Register {
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn add_buddy(&self, user_id: &str, buddy_id: &str) -> BuddyResult<DirectoryResponse> {
        self.request(DirectoryRequest::AddBuddy {
            user_id: user_id.to_string(),
            buddy_id: buddy_id.to_string(),
        })
        .await
    }

    pub async fn delete_buddy(
        &self,
        user_id: &str,
        buddy_id: &str,
    ) -> BuddyResult<DirectoryResponse> {
        self.request(DirectoryRequest::DeleteBuddy {
            user_id: user_id.to_string(),
            buddy_id: buddy_id.to_string(),
        })
        .await
    }

    /// Run one exchange, bounded by the request timeout
    pub async fn request(&self, request: DirectoryRequest) -> BuddyResult<DirectoryResponse> {
        let verb = request.verb();
        match tokio::time::timeout(self.timeout, self.exchange(&request)).await {
            Ok(result) => {
                let response = result?;
                info!("{} -> {}", verb, response);
                Ok(response)
            }
            Err(_) => Err(TransportError::Timeout {
                operation: "directory response",
                duration_ms: self.timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    async fn exchange(&self, request: &DirectoryRequest) -> BuddyResult<DirectoryResponse> {
        let stream = TcpStream::connect(self.endpoint.as_str())
            .await
            .map_err(|source| TransportError::ConnectionFailed {
                addr: self.endpoint.clone(),
                source,
            })?;
        let mut framed = Framed::new(stream, handshake::line_codec(MAX_RESPONSE_LENGTH));

        let line = request.encode();
        debug!("Sending {:?} to {}", line, self.endpoint);
        framed.send(line).await?;

        match framed.next().await {
            Some(line) => Ok(DirectoryResponse::parse(&line?)?),
            None => Err(TransportError::UnexpectedEof {
                expected: "directory response",
            }
            .into()),
        }
    }
}
