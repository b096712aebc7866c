use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure, non-2xx status, or a body that is not the expected JSON.
    #[error("fetch {url} failed{}: {message}", status_suffix(.status))]
    Fetch {
        url: String,
        status: Option<StatusCode>,
        message: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Fetch { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

fn status_suffix(status: &Option<StatusCode>) -> String {
    status
        .map(|status| format!(" with status {status}"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
