use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Usage,
    Auth,
    /// Transport-level failure: the server could not be reached at all.
    Network,
    /// The server was reached and rejected the request.
    Api,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Auth = 3,
    Network = 4,
    Api = 5,
    Io = 6,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct SaldoError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status for `Api` errors; callers branch on 404/409/429.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Retry-After hint in seconds, set for rate-limit responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl SaldoError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Api,
            message: message.into(),
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn rate_limited(path: &str, retry_after: Option<u64>) -> Self {
        Self {
            kind: ErrorKind::Api,
            message: format!("rate limit exceeded for '{path}'"),
            status: Some(429),
            retry_after,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn is_rate_limit(&self) -> bool {
        self.status == Some(429)
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind {
            ErrorKind::Usage => ExitCode::Usage,
            ErrorKind::Auth => ExitCode::Auth,
            ErrorKind::Network => ExitCode::Network,
            ErrorKind::Api => ExitCode::Api,
            ErrorKind::Io => ExitCode::Io,
        }
    }
}

impl From<std::io::Error> for SaldoError {
    fn from(value: std::io::Error) -> Self {
        Self::io(value.to_string())
    }
}

pub type SaldoResult<T> = Result<T, SaldoError>;
