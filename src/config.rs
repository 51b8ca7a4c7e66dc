//! Daemon configuration
//!
//! [`RecorderConfig`] is what the library consumes; [`Args`] is the command
//! line / environment front end of the `bpf-recorder` binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::RecorderError;

/// Default location of the control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/grpc/bpf-recorder.sock";

/// Owner uid/gid of the control socket (the rootless user).
pub const DEFAULT_SOCKET_OWNER: u32 = 65535;

/// Pod annotation prefix; the suffix is the container name.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "io.containers.trace-bpf/";

/// gRPC send/receive limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Retry schedule of the cluster search.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// First delay.
    pub initial: Duration,
    /// Growth per attempt.
    pub factor: f64,
    /// Upper bound of a single delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 1.5,
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay following `current`.
    pub fn next(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor).min(self.max)
    }
}

/// Runtime configuration of the recorder.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Node whose pods are searched.
    pub node_name: String,
    /// Control socket path.
    pub socket_path: PathBuf,
    /// uid and gid the control socket is chowned to.
    pub socket_owner: u32,
    /// Expiry of the pid and syscall name caches.
    pub cache_ttl: Duration,
    /// Budget of one cluster search.
    pub search_timeout: Duration,
    /// Retry schedule within a search.
    pub search_backoff: Backoff,
    /// Annotation key prefix that marks a container for recording.
    pub annotation_prefix: String,
    /// JSON BTF table for kernels without system BTF.
    pub btf_table: Option<PathBuf>,
    /// gRPC message size limit.
    pub max_message_size: usize,
    /// Where to serve Prometheus metrics, if anywhere.
    pub metrics_addr: Option<SocketAddr>,
    /// Load and unload once at startup.
    pub self_test: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_owner: DEFAULT_SOCKET_OWNER,
            cache_ttl: Duration::from_secs(60 * 60),
            search_timeout: Duration::from_secs(60),
            search_backoff: Backoff::default(),
            annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
            btf_table: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            metrics_addr: None,
            self_test: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Per-node syscall recorder
#[derive(Debug, Parser)]
#[command(name = "bpf-recorder", version, about)]
pub struct Args {
    /// Name of the node this agent runs on
    #[arg(long, env = "NODE_NAME", default_value = "")]
    pub node_name: String,

    /// Control socket path
    #[arg(long, env = "BPF_RECORDER_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    pub socket: PathBuf,

    /// uid and gid owning the control socket
    #[arg(long, env = "BPF_RECORDER_SOCKET_OWNER", default_value_t = DEFAULT_SOCKET_OWNER)]
    pub socket_owner: u32,

    /// Cache entry lifetime in seconds
    #[arg(long, env = "BPF_RECORDER_CACHE_TTL", default_value_t = 3600)]
    pub cache_ttl: u64,

    /// Cluster search timeout in seconds
    #[arg(long, env = "BPF_RECORDER_SEARCH_TIMEOUT", default_value_t = 60)]
    pub search_timeout: u64,

    /// Annotation key prefix marking containers to record
    #[arg(long, env = "BPF_RECORDER_ANNOTATION_PREFIX", default_value = DEFAULT_ANNOTATION_PREFIX)]
    pub annotation_prefix: String,

    /// JSON table of BTF blobs for kernels without /sys/kernel/btf/vmlinux
    #[arg(long, env = "BPF_RECORDER_BTF_TABLE")]
    pub btf_table: Option<PathBuf>,

    /// Address to serve Prometheus metrics on
    #[arg(long, env = "BPF_RECORDER_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Skip the load/unload check at startup
    #[arg(long)]
    pub skip_self_test: bool,

    /// Log output format
    #[arg(long, value_enum, env = "BPF_RECORDER_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    /// Validate and convert into a [`RecorderConfig`].
    pub fn into_config(self) -> Result<RecorderConfig, RecorderError> {
        if self.node_name.trim().is_empty() {
            return Err(RecorderError::Config(
                "NODE_NAME environment variable not set".to_string(),
            ));
        }

        Ok(RecorderConfig {
            node_name: self.node_name,
            socket_path: self.socket,
            socket_owner: self.socket_owner,
            cache_ttl: Duration::from_secs(self.cache_ttl),
            search_timeout: Duration::from_secs(self.search_timeout),
            annotation_prefix: self.annotation_prefix,
            btf_table: self.btf_table,
            metrics_addr: self.metrics_addr,
            self_test: !self.skip_self_test,
            ..RecorderConfig::default()
        })
    }
}
