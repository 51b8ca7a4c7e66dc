//! Error types for the recorder
//!
//! Every layer has its own enum; `RecorderError` is what the control surface
//! hands back to callers and what gets translated into a gRPC status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::ebpf::BpfError;

/// Errors surfaced by the recorder's control operations and lifecycle.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// `SyscallsForProfile` was called while no session is active.
    #[error("bpf recorder not running")]
    NotRunning,

    /// The profile has no recorded processes (never seen or already consumed).
    #[error("no PID found for container")]
    NoPidFound,

    /// The profile exists but its process list is empty.
    #[error("PID slice is empty")]
    EmptyPidList,

    /// Loading, attaching or accessing the kernel program failed.
    #[error("load bpf: {0}")]
    Bpf(#[from] BpfError),

    /// Kernel type metadata could not be resolved.
    #[error("find btf: {0}")]
    Btf(#[from] BtfError),

    /// Host identity metadata could not be read.
    #[error("read host metadata {path}: {source}")]
    Host {
        /// File or facility that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The cluster could not be queried.
    #[error("cluster: {0}")]
    Cluster(#[from] ClusterError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors while loading or materializing kernel type metadata.
#[derive(Debug, Error)]
pub enum BtfError {
    /// The BTF table JSON is malformed.
    #[error("unmarshal btf table: {0}")]
    Parse(#[from] serde_json::Error),

    /// A BTF blob in the table is not valid base64.
    #[error("decode btf blob for {key}: {source}")]
    Decode {
        /// Composite key of the broken entry.
        key: String,
        /// Decoder error.
        source: base64::DecodeError,
    },

    /// The matched blob could not be written to a temporary file.
    #[error("write btf to temp file: {0}")]
    Write(#[from] io::Error),
}

/// A syscall id could not be turned into a name.
#[derive(Debug, Error)]
pub enum SyscallError {
    /// The id is not part of the architecture's syscall table.
    #[error("get syscall name for ID {id} on {arch}")]
    Unknown {
        /// Numeric syscall id.
        id: u32,
        /// Architecture the lookup was performed for.
        arch: String,
    },
}

impl From<RecorderError> for tonic::Status {
    fn from(err: RecorderError) -> Self {
        match err {
            RecorderError::NotRunning => tonic::Status::failed_precondition(err.to_string()),
            RecorderError::NoPidFound | RecorderError::EmptyPidList => {
                tonic::Status::not_found(err.to_string())
            }
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
