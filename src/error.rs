use thiserror::Error;

use crate::models::IssueStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {status} - {message}")]
    Authentication { status: u16, message: String },

    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service error: {status} - {message}")]
    Service { status: u16, message: String },

    #[error("Malformed response from {endpoint}: {source}")]
    MalformedResponse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// エラーの大分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Transport,
    Service,
    Configuration,
    InvalidInput,
}

impl Error {
    /// エラーの分類を取得（スキーマ不一致はサービスエラー扱い）
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Service { .. } | Error::MalformedResponse { .. } => ErrorKind::Service,
            Error::InvalidConfiguration(_) | Error::ConfigurationMissing(_) => {
                ErrorKind::Configuration
            }
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// HTTPステータスからエラーを作成
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Error::Authentication { status, message },
            _ => Error::Service { status, message },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// 致命的ではない警告：ステータスごとの取得上限に達し、結果が不完全
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status} issues truncated at {ceiling} records")]
pub struct TruncationWarning {
    pub status: IssueStatus,
    pub ceiling: usize,
}
