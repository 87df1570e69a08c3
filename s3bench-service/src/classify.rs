//! Classification of transport failures.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::backend::BackendError;

/// The broad category of a [`BackendError`], which drives retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The object does not exist. Never worth retrying.
    NotFound,
    /// Timeouts, throttling and temporarily unavailable services.
    Transient,
    /// Any other `4xx` response.
    ClientError,
    /// Any other `5xx` response.
    ServerError,
    /// The connection failed below the HTTP layer.
    NetworkError,
    /// Everything that does not fit the categories above.
    Unknown,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::NotFound => "NOT_FOUND",
            ErrorClass::Transient => "TRANSIENT",
            ErrorClass::ClientError => "CLIENT_ERROR",
            ErrorClass::ServerError => "SERVER_ERROR",
            ErrorClass::NetworkError => "NETWORK_ERROR",
            ErrorClass::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Maps a transport failure to its [`ErrorClass`].
pub fn classify(error: &BackendError) -> ErrorClass {
    match error {
        BackendError::NotFound => ErrorClass::NotFound,
        BackendError::Status { status, .. } => classify_status(*status),
        BackendError::Timeout(_) => ErrorClass::Transient,
        BackendError::Transport { .. } => match io_error_kind(error).map(classify_io) {
            Some(ErrorClass::Unknown) | None => ErrorClass::NetworkError,
            Some(class) => class,
        },
        BackendError::Io(err) => classify_io(err.kind()),
        BackendError::Generic { .. } => {
            io_error_kind(error).map_or(ErrorClass::Unknown, classify_io)
        }
    }
}

/// Maps an HTTP status code to the [`ErrorClass`] of a failed request.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        404 => ErrorClass::NotFound,
        408 | 429 | 500 | 502 | 503 | 504 => ErrorClass::Transient,
        500..=599 => ErrorClass::ServerError,
        400..=499 => ErrorClass::ClientError,
        _ => ErrorClass::Unknown,
    }
}

fn classify_io(kind: io::ErrorKind) -> ErrorClass {
    match kind {
        io::ErrorKind::TimedOut => ErrorClass::Transient,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ErrorClass::NetworkError,
        _ => ErrorClass::Unknown,
    }
}

/// Returns the HTTP status of a failed request, if the backend received a response.
pub fn status_code(error: &BackendError) -> Option<u16> {
    match error {
        BackendError::Status { status, .. } => Some(*status),
        _ => None,
    }
}

/// Finds the innermost [`io::Error`] in the source chain of `error`.
pub fn io_error_kind(error: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}

/// Whether `error` is one of the network failures a fresh connection usually recovers from.
///
/// These are connection resets and exhausted local ports, as well as the `500` and `522`
/// responses of CDN-fronted object stores.
pub fn is_recoverable_network_failure(error: &BackendError) -> bool {
    if matches!(status_code(error), Some(500 | 522)) {
        return true;
    }

    matches!(
        io_error_kind(error),
        Some(io::ErrorKind::ConnectionReset | io::ErrorKind::AddrNotAvailable)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> BackendError {
        BackendError::Status {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(&status(404)), ErrorClass::NotFound);
        assert_eq!(classify(&status(503)), ErrorClass::Transient);
        assert_eq!(classify(&status(429)), ErrorClass::Transient);
        assert_eq!(classify(&status(522)), ErrorClass::ServerError);
        assert_eq!(classify(&status(403)), ErrorClass::ClientError);
        assert_eq!(classify(&status(304)), ErrorClass::Unknown);
        assert_eq!(classify(&BackendError::NotFound), ErrorClass::NotFound);
    }

    #[test]
    fn classifies_io_errors() {
        let reset = BackendError::Io(io::ErrorKind::ConnectionReset.into());
        assert_eq!(classify(&reset), ErrorClass::NetworkError);

        let timeout = BackendError::Io(io::ErrorKind::TimedOut.into());
        assert_eq!(classify(&timeout), ErrorClass::Transient);

        let other = BackendError::Io(io::ErrorKind::InvalidData.into());
        assert_eq!(classify(&other), ErrorClass::Unknown);
    }

    #[test]
    fn finds_nested_io_errors() {
        let generic = BackendError::Generic {
            context: "wrapped".into(),
            cause: Box::new(io::Error::from(io::ErrorKind::AddrNotAvailable)),
        };
        assert_eq!(classify(&generic), ErrorClass::NetworkError);
        assert!(is_recoverable_network_failure(&generic));
    }

    #[test]
    fn classifies_transport_errors() {
        let refused = BackendError::Transport {
            context: "failed to head object".into(),
            cause: Box::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
        };
        assert_eq!(classify(&refused), ErrorClass::NetworkError);

        let timeout = BackendError::Transport {
            context: "failed to get object".into(),
            cause: Box::new(io::Error::from(io::ErrorKind::TimedOut)),
        };
        assert_eq!(classify(&timeout), ErrorClass::Transient);

        let handshake = BackendError::Transport {
            context: "failed to put object".into(),
            cause: "tls handshake eof".into(),
        };
        assert_eq!(classify(&handshake), ErrorClass::NetworkError);
        assert_eq!(status_code(&handshake), None);
    }

    #[test]
    fn recognizes_recoverable_network_failures() {
        assert!(is_recoverable_network_failure(&status(500)));
        assert!(is_recoverable_network_failure(&status(522)));
        assert!(!is_recoverable_network_failure(&status(502)));
        assert!(is_recoverable_network_failure(&BackendError::Io(
            io::ErrorKind::ConnectionReset.into()
        )));
        assert!(!is_recoverable_network_failure(&BackendError::Io(
            io::ErrorKind::ConnectionRefused.into()
        )));
    }
}
