//! Classify collaborator errors into retry policy error kinds.

use crate::fetch::FetchError;
use crate::retry::policy::ErrorKind;
use crate::transport::TransportError;

pub fn classify_fetch_error(err: &FetchError) -> ErrorKind {
    match err {
        FetchError::Unavailable(_) => ErrorKind::Unavailable,
        FetchError::LiveInProgress => ErrorKind::LiveInProgress,
        FetchError::Transient(_) => ErrorKind::Transient,
    }
}

pub fn classify_transport_error(err: &TransportError) -> ErrorKind {
    match err {
        TransportError::AuthFailed(_) => ErrorKind::Auth,
        TransportError::Unreachable(_) => ErrorKind::Connection,
        TransportError::Transient(_) => ErrorKind::Transient,
        // a config change is needed; treat like auth so the job ends up Failed with the message
        TransportError::NotConfigured(_) => ErrorKind::Auth,
    }
}
