//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Lark Open API or webhook failure.
    Lark(String),
    /// ACP protocol, transport, or agent-process failure.
    Acp(String),
    /// Agent child process management failure.
    Process(String),
    /// Foreground shell command failure.
    Shell(String),
    /// No session matches the request.
    SessionNotFound(String),
    /// No project matches the request.
    ProjectNotFound(String),
    /// Session status transition is not permitted.
    SessionState(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Lark(msg) => write!(f, "lark: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Shell(msg) => write!(f, "shell: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::ProjectNotFound(msg) => write!(f, "project not found: {msg}"),
            Self::SessionState(msg) => write!(f, "invalid session state: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
