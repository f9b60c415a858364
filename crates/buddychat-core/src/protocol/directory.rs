//! Directory request/response lines
//!
//! Each request travels on its own TCP connection and yields exactly one
//! response line whose leading three digits carry the outcome.

use std::fmt;

use crate::errors::ProtocolError;

/// Requests understood by the directory's TCP port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRequest {
    Register { user_id: String },
    AddBuddy { user_id: String, buddy_id: String },
    DeleteBuddy { user_id: String, buddy_id: String },
}

impl DirectoryRequest {
    /// Request line without its terminator
    pub fn encode(&self) -> String {
        match self {
            DirectoryRequest::Register { user_id } => format!("REG {}", user_id),
            DirectoryRequest::AddBuddy { user_id, buddy_id } => {
                format!("ADD {} {}", user_id, buddy_id)
            }
            DirectoryRequest::DeleteBuddy { user_id, buddy_id } => {
                format!("DEL {} {}", user_id, buddy_id)
            }
        }
    }

    /// Short verb for logs
    pub fn verb(&self) -> &'static str {
        match self {
            DirectoryRequest::Register { .. } => "REG",
            DirectoryRequest::AddBuddy { .. } => "ADD",
            DirectoryRequest::DeleteBuddy { .. } => "DEL",
        }
    }
}

/// One response line from the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryResponse {
    pub code: u16,
    pub line: String,
}

impl DirectoryResponse {
    /// Parse a response line; the first three characters must be digits
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            return Err(ProtocolError::EmptyResponse);
        }

        let code = line
            .get(..3)
            .filter(|prefix| prefix.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|prefix| prefix.parse::<u16>().ok())
            .ok_or_else(|| ProtocolError::MissingResponseCode {
                line: line.to_string(),
            })?;

        Ok(Self {
            code,
            line: line.to_string(),
        })
    }

    /// 2xx codes mean the directory applied the request
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for DirectoryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}
