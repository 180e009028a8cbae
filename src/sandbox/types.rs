use std::fmt;

use serde::{Deserialize, Serialize};

/// Live status shown next to the Terraform service in the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Progress(u8),
    Online,
    Offline,
    Error,
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveStatus::Progress(percent) => write!(f, "Progress {}", percent),
            LiveStatus::Online => f.write_str("Online"),
            LiveStatus::Offline => f.write_str("Offline"),
            LiveStatus::Error => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiError>,
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    #[allow(dead_code)] // NOTE: Kept for debug output
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValueBody<'a> {
    pub value: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LiveStatusBody<'a> {
    pub status: String,
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageBody<'a> {
    pub message: &'a str,
}
