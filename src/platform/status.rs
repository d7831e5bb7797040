//! Native notification status codes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status returned by the platform notification primitive.
///
/// Codes mirror the `NOTIFY_STATUS_*` values of the native bus so the loopback
/// transport and the native one report failures identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyStatus {
    Ok,
    InvalidName,
    InvalidToken,
    InvalidPort,
    InvalidFile,
    InvalidSignal,
    InvalidRequest,
    NotAuthorized,
    OptDisable,
    ServerNotFound,
    NullInput,
    Failed,
    Unknown(u32),
}

impl NotifyStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidName,
            2 => Self::InvalidToken,
            3 => Self::InvalidPort,
            4 => Self::InvalidFile,
            5 => Self::InvalidSignal,
            6 => Self::InvalidRequest,
            7 => Self::NotAuthorized,
            8 => Self::OptDisable,
            9 => Self::ServerNotFound,
            10 => Self::NullInput,
            1_000_000 => Self::Failed,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::InvalidName => 1,
            Self::InvalidToken => 2,
            Self::InvalidPort => 3,
            Self::InvalidFile => 4,
            Self::InvalidSignal => 5,
            Self::InvalidRequest => 6,
            Self::NotAuthorized => 7,
            Self::OptDisable => 8,
            Self::ServerNotFound => 9,
            Self::NullInput => 10,
            Self::Failed => 1_000_000,
            Self::Unknown(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for NotifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::InvalidName => "invalid name",
            Self::InvalidToken => "invalid token",
            Self::InvalidPort => "invalid port",
            Self::InvalidFile => "invalid file",
            Self::InvalidSignal => "invalid signal",
            Self::InvalidRequest => "invalid request",
            Self::NotAuthorized => "not authorized",
            Self::OptDisable => "option disabled",
            Self::ServerNotFound => "server not found",
            Self::NullInput => "null input",
            Self::Failed => "failed",
            Self::Unknown(_) => "unknown status",
        };
        write!(f, "{} ({})", label, self.code())
    }
}
