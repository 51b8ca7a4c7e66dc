//! Kernel instrumentation for syscall recording
//!
//! A single tracepoint program on `raw_syscalls/sys_exit` records, per
//! process, which syscalls were issued:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Kernel Space (recorder program)                            │
//! │                                                             │
//! │  raw_syscalls/sys_exit ──► syscalls map  pid → [u8; 1024]   │
//! │                        ──► comms map     pid → [u8; 64]     │
//! │        first syscall   ──► events ring buffer (pid, le u32) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  User Space                                                 │
//! │                                                             │
//! │  BpfBackend::load()  → LoadedProgram { program, events }    │
//! │  BpfProgram::syscalls/comm/remove  → map access             │
//! │  BpfProgram::close() → detach, stop the event reader        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`BpfBackend`] and [`BpfProgram`] are the narrow capability interface the
//! recorder talks to; the aya implementation lives behind the `ebpf` feature
//! so that the rest of the crate builds and tests without kernel support.
//!
//! ## Requirements
//!
//! - Linux kernel 5.8+ (ring buffer maps) with CONFIG_BPF_SYSCALL=y
//! - CAP_BPF and CAP_PERFMON capabilities (or root)
//! - Pre-built recorder object in target/ebpf/ (see ebpf-programs/)
//! - Compiled with `--features ebpf`

#[cfg(feature = "ebpf")]
mod loader;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

#[cfg(feature = "ebpf")]
pub use loader::AyaBackend;

/// Number of syscall slots in a per-process bitset.
pub const MAX_SYSCALLS: usize = 1024;

/// Size of a command name entry, NUL padded.
pub const MAX_COMM_LEN: usize = 64;

/// Error type for eBPF operations
#[derive(Debug, Error)]
pub enum BpfError {
    /// No recorder object is built for this CPU architecture
    #[error("architecture {0} is currently unsupported")]
    UnsupportedArch(String),
    /// Failed to load the eBPF object or program
    #[error("eBPF load error: {0}")]
    Load(String),
    /// Failed to attach the program to its hook point
    #[error("eBPF attach error: {0}")]
    Attach(String),
    /// Failed to access a BPF map
    #[error("eBPF map error: {0}")]
    Map(String),
    /// eBPF support was not compiled in
    #[error("eBPF is not enabled")]
    NotEnabled,
}

/// A loaded and attached recorder program.
///
/// Map lookups return `Ok(None)` when the key is absent.
pub trait BpfProgram: Send + Sync {
    /// Per-syscall flags of `pid`, one byte per syscall id.
    fn syscalls(&self, pid: u32) -> Result<Option<Vec<u8>>, BpfError>;

    /// Raw command name of `pid`.
    fn comm(&self, pid: u32) -> Result<Option<Vec<u8>>, BpfError>;

    /// Drop every map entry of `pid`.
    fn remove(&self, pid: u32) -> Result<(), BpfError>;

    /// Detach the program and close the event stream. Idempotent.
    fn close(&self);
}

/// Output of a successful [`BpfBackend::load`].
pub struct LoadedProgram {
    /// Map access and teardown.
    pub program: Arc<dyn BpfProgram>,
    /// Raw ring buffer records; closed once the program is closed.
    pub events: mpsc::Receiver<Vec<u8>>,
}

/// Loads the recorder program into the kernel.
pub trait BpfBackend: Send + Sync {
    /// Load, attach and open the maps. On error no kernel state is retained.
    ///
    /// `btf` overrides the kernel's own type information when set.
    fn load(&self, btf: Option<&Path>) -> Result<LoadedProgram, BpfError>;
}

/// Backend used when eBPF support is not compiled in; every load fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBackend;

impl BpfBackend for DisabledBackend {
    fn load(&self, _btf: Option<&Path>) -> Result<LoadedProgram, BpfError> {
        Err(BpfError::NotEnabled)
    }
}

/// The backend this build supports.
pub fn default_backend() -> Arc<dyn BpfBackend> {
    #[cfg(feature = "ebpf")]
    {
        Arc::new(AyaBackend::default())
    }
    #[cfg(not(feature = "ebpf"))]
    {
        tracing::warn!("eBPF feature not enabled at compile time");
        Arc::new(DisabledBackend)
    }
}

/// Decode the PID carried by a ring buffer record (little-endian u32 prefix).
pub fn event_pid(event: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = event.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Command name up to the first NUL, lossily decoded.
pub fn comm_to_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
