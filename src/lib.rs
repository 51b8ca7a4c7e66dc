//! bpf-recorder - per-node syscall recorder for container security profiles
//!
//! The agent loads a small eBPF program that notes, per process, which
//! syscalls were issued. New processes are attributed to Kubernetes
//! containers carrying a recording annotation, and the collected syscalls
//! of a profile are handed out exactly once over a gRPC control socket.
//!
//! # Modules
//!
//! - `recorder` - Session control, event pipeline and correlation store
//! - `ebpf` - Kernel program loader (aya, requires `--features ebpf`)
//! - `btf` - BTF selection for kernels without built-in type information
//! - `syscalls` - Syscall id to name resolution
//! - `cluster` - Node pod listing against the Kubernetes API
//! - `host` - os-release, uname and /proc lookups
//! - `grpc` - Control API server and client over a unix socket
//! - `metrics` - Prometheus metrics for observability
//! - `config` - Daemon configuration and command line
//!
//! # Quick Start
//!
//! ```ignore
//! use bpfrecorder::{Collaborators, Recorder, RecorderConfig};
//!
//! let recorder = Recorder::new(&config, deps);
//! recorder.start().await?;
//! // ... workload runs ...
//! let syscalls = recorder.syscalls_for_profile("my-profile").await?;
//! recorder.stop().await;
//! ```

pub mod btf;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod ebpf;
pub mod error;
pub mod grpc;
pub mod host;
pub mod metrics;
pub mod recorder;
pub mod syscalls;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use config::{Args, RecorderConfig};
pub use error::RecorderError;
pub use recorder::{Collaborators, CorrelationStore, ProcessRecord, Recorder};
