//! Client side of the control socket

use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use super::api::bpf_recorder_client::BpfRecorderClient;
use crate::config::DEFAULT_MAX_MESSAGE_SIZE;

/// Upper bound for establishing the connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Error type for dialing the recorder
#[derive(Debug, Error)]
pub enum DialError {
    /// The channel could not be established.
    #[error("connect to {path}: {source}")]
    Transport {
        path: PathBuf,
        source: tonic::transport::Error,
    },
    /// No connection within [`DIAL_TIMEOUT`].
    #[error("connect to {0}: timed out")]
    Timeout(PathBuf),
}

/// Connect to the recorder listening on `socket_path`.
pub async fn dial(socket_path: impl AsRef<Path>) -> Result<BpfRecorderClient<Channel>, DialError> {
    let path = socket_path.as_ref().to_path_buf();
    let connector_path = path.clone();

    // Tonic requires a valid URI even for UDS connections; the connector
    // ignores it.
    let endpoint = Endpoint::from_static("http://[::]:50051").connect_timeout(DIAL_TIMEOUT);
    let connect = endpoint.connect_with_connector(service_fn(move |_: Uri| {
        let path = connector_path.clone();
        async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
    }));

    let channel = match tokio::time::timeout(DIAL_TIMEOUT, connect).await {
        Ok(Ok(channel)) => channel,
        Ok(Err(source)) => return Err(DialError::Transport { path, source }),
        Err(_) => return Err(DialError::Timeout(path)),
    };

    Ok(BpfRecorderClient::new(channel)
        .max_decoding_message_size(DEFAULT_MAX_MESSAGE_SIZE)
        .max_encoding_message_size(DEFAULT_MAX_MESSAGE_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = dial(dir.path().join("absent.sock")).await.unwrap_err();
        assert!(matches!(err, DialError::Transport { .. }));
    }
}
