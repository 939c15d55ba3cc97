use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Transport failure: the request never got an HTTP response.
    Http(reqwest::Error),
    /// The service answered with a status other than 200.
    Service { status: u16, body: String },
    Decode { path: String, message: String },
    Validation(String),
    UnknownThermostat(String),
    Io(std::io::Error),
}

impl Error {
    pub(crate) fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True when the remote service answered with a status we could not use.
    pub fn is_service(&self) -> bool {
        matches!(self, Error::Service { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Service { status, body } => write!(f, "service error {status}: {body}"),
            Error::Decode { path, message } if path.is_empty() => {
                write!(f, "decode error: {message}")
            }
            Error::Decode { path, message } => write!(f, "decode error at {path}: {message}"),
            Error::Validation(msg) => write!(f, "invalid request: {msg}"),
            Error::UnknownThermostat(id) => write!(f, "unknown thermostat: {id}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
