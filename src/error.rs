use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unusable configuration, raised before any request goes out.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote side answered with a non-success status.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Failed to upload contact photo: {0}")]
    PhotoUpload(Box<Error>),

    #[error("invalid photo: {0}")]
    InvalidPhoto(String),

    #[error("{0}")]
    Agenda(String),

    /// A success status with a body missing what we need.
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn rejected(action: &str, status: StatusCode, detail: Option<String>) -> Self {
        let detail = detail
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
        Self::Rejected {
            status,
            message: format!("{}: {} {}", action, status.as_u16(), detail)
                .trim_end()
                .to_string(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::PhotoUpload(inner) => inner.status(),
            _ => None,
        }
    }
}
