use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors raised while controlling a Sonos household
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("not connected to a zone player")]
    NotConnected,

    // Connection-level failure: the request never produced an HTTP status.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{action} failed with HTTP status {status} and body: {body}")]
    Transport {
        action: String,
        status: u16,
        body: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no music service matcher recognizes URI: {0}")]
    UnsupportedUri(String),

    #[error("enqueue of {0} reported no assigned track number")]
    Enqueue(String),

    #[error("{action} failed on every group member: {source}")]
    GroupCommand {
        action: String,
        #[source]
        source: Box<ControlError>,
    },
}

impl ControlError {
    pub fn transport(action: &str, status: u16, body: impl Into<String>) -> Self {
        ControlError::Transport {
            action: action.to_string(),
            status,
            body: body.into(),
        }
    }

    pub fn missing_field(field: &str, context: &str) -> Self {
        ControlError::Protocol(format!("Missing {field} element in {context}"))
    }

    pub fn bad_field(field: &str, value: &str) -> Self {
        ControlError::Protocol(format!("Invalid {field} value: {value}"))
    }

    pub fn group_command(action: &str, source: ControlError) -> Self {
        ControlError::GroupCommand {
            action: action.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<xmltree::ParseError> for ControlError {
    fn from(err: xmltree::ParseError) -> Self {
        ControlError::Protocol(format!("XML parse error: {err}"))
    }
}

impl From<xmltree::Error> for ControlError {
    fn from(err: xmltree::Error) -> Self {
        ControlError::Protocol(format!("XML write error: {err}"))
    }
}
