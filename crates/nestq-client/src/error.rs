use std::fmt;

use http::StatusCode;
use nestq_query::QueryError;

/// Failures of the HTTP exchange itself, kept apart from compilation errors.
#[derive(Debug)]
pub enum TransportError {
    Http(ureq::Error),
    Status { status: StatusCode, body: String },
    Decode(serde_json::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "http error: {e}"),
            TransportError::Status { status, body } => {
                write!(f, "unexpected status {status}: {body}")
            }
            TransportError::Decode(e) => write!(f, "malformed response body: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug)]
pub enum ClientError {
    Query(QueryError),
    Transport(TransportError),
    Config(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Query(e) => write!(f, "query error: {e}"),
            ClientError::Transport(e) => write!(f, "transport error: {e}"),
            ClientError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl ClientError {
    /// Status a gateway forwarding this request should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClientError::Query(_) => StatusCode::BAD_REQUEST,
            ClientError::Transport(TransportError::Status { status, .. }) => *status,
            ClientError::Transport(_) => StatusCode::BAD_GATEWAY,
            ClientError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryError> for ClientError {
    fn from(e: QueryError) -> Self {
        ClientError::Query(e)
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e)
    }
}

impl From<ureq::Error> for ClientError {
    fn from(e: ureq::Error) -> Self {
        ClientError::Transport(TransportError::Http(e))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Transport(TransportError::Decode(e))
    }
}
