//! Recording session control
//!
//! [`Recorder`] owns the reference-counted kernel session and answers the
//! three control operations:
//!
//! ```text
//! start()  ── count 0→1 ──► resolve BTF, load program, spawn event worker
//! stop()   ── count 1→0 ──► signal and join worker, close program,
//!                             delete BTF file
//! syscalls_for_profile(name) ──► take the profile's PIDs, read their
//!                                bitsets, resolve names, clean up maps
//! ```
//!
//! Count changes and the load/unload they trigger run under one async
//! mutex, so concurrent calls never double-load or double-unload.

mod pipeline;
mod store;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::btf::{self, BtfTable};
use crate::cache::TtlCache;
use crate::cluster::PodLister;
use crate::config::RecorderConfig;
use crate::ebpf::{BpfBackend, BpfProgram};
use crate::error::RecorderError;
use crate::host::HostInfo;
use crate::metrics;
use crate::syscalls::{SyscallResolver, SyscallTable};

use pipeline::Pipeline;
pub use store::{CorrelationStore, ProcessRecord};

/// Infrastructure processes whose syscalls never belong to a workload.
pub const EXCLUDED_COMMS: &[&str] = &[
    "conmon", // container monitor of CRI-O
];

/// External capabilities the recorder drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Kernel program loader.
    pub backend: Arc<dyn BpfBackend>,
    /// Local host facts.
    pub host: Arc<dyn HostInfo>,
    /// Cluster pod listing.
    pub pods: Arc<dyn PodLister>,
    /// Syscall id → name table.
    pub syscalls: Arc<dyn SyscallTable>,
}

struct LoadedSession {
    program: Arc<dyn BpfProgram>,
    worker: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    btf_path: Option<PathBuf>,
}

enum SessionState {
    Unloaded,
    Loaded(LoadedSession),
}

/// The syscall recorder.
pub struct Recorder {
    backend: Arc<dyn BpfBackend>,
    host: Arc<dyn HostInfo>,
    btf_table: BtfTable,
    pipeline: Arc<Pipeline>,
    resolver: SyscallResolver,
    session: Mutex<SessionState>,
}

impl Recorder {
    /// Create an idle recorder.
    ///
    /// Must be called from within a tokio runtime; the caches start their
    /// expiry tasks immediately.
    pub fn new(config: &RecorderConfig, deps: Collaborators) -> Self {
        info!(ttl = ?config.cache_ttl, "Setting up caches");
        let store = Arc::new(CorrelationStore::new());
        let pipeline = Pipeline {
            node_name: config.node_name.clone(),
            annotation_prefix: config.annotation_prefix.clone(),
            search_timeout: config.search_timeout,
            backoff: config.search_backoff.clone(),
            host: Arc::clone(&deps.host),
            pods: deps.pods,
            store,
            containers: TtlCache::new("container_ids", config.cache_ttl),
        };

        Self {
            backend: deps.backend,
            host: deps.host,
            btf_table: BtfTable::default(),
            pipeline: Arc::new(pipeline),
            resolver: SyscallResolver::new(deps.syscalls, config.cache_ttl),
            session: Mutex::new(SessionState::Unloaded),
        }
    }

    /// Use `table` for kernels without system BTF.
    pub fn with_btf_table(mut self, table: BtfTable) -> Self {
        self.btf_table = table;
        self
    }

    /// Shared correlation state.
    pub fn store(&self) -> &CorrelationStore {
        &self.pipeline.store
    }

    /// Outstanding start requests.
    pub fn session_count(&self) -> u64 {
        self.store().session_count()
    }

    /// Whether the kernel program is currently loaded.
    pub async fn is_loaded(&self) -> bool {
        matches!(*self.session.lock().await, SessionState::Loaded(_))
    }

    /// Begin or join a recording session.
    ///
    /// Loads the kernel program on the first session; a failed load leaves
    /// the session count unchanged.
    pub async fn start(&self) -> Result<(), RecorderError> {
        let mut session = self.session.lock().await;
        if self.store().session_count() == 0 {
            info!("Starting bpf recorder");
            *session = SessionState::Loaded(self.load()?);
        } else {
            info!("bpf recorder already running");
        }

        let count = self.store().increment_sessions();
        metrics::set_session(count, true);
        Ok(())
    }

    /// Leave a recording session, unloading when it was the last one.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        if self.store().session_count() == 0 {
            info!("bpf recorder not running");
            return;
        }

        let count = self.store().decrement_sessions();
        if count == 0 {
            info!("Stopping bpf recorder");
            unload(&mut session).await;
        } else {
            info!(sessions = count, "Not stopping because another recording is in progress");
        }
        metrics::set_session(count, count > 0);
    }

    /// Consume the recorded processes of `profile` and return the sorted,
    /// unique names of every syscall they issued.
    pub async fn syscalls_for_profile(&self, profile: &str) -> Result<Vec<String>, RecorderError> {
        if self.store().session_count() == 0 {
            return Err(RecorderError::NotRunning);
        }
        let program = match &*self.session.lock().await {
            SessionState::Loaded(loaded) => Arc::clone(&loaded.program),
            SessionState::Unloaded => return Err(RecorderError::NotRunning),
        };

        info!(profile, "Getting syscalls for profile");
        let records = self
            .store()
            .take_profile(profile)
            .ok_or(RecorderError::NoPidFound)?;
        if records.is_empty() {
            return Err(RecorderError::EmptyPidList);
        }
        debug!(profile, ?records, "Got PIDs for the profile");

        let mut names = BTreeSet::new();
        for record in &records {
            if EXCLUDED_COMMS.contains(&record.comm.as_str()) {
                info!(comm = %record.comm, "Filtering syscalls from excluded command");
                continue;
            }

            let bitset = match program.syscalls(record.pid) {
                Ok(Some(bitset)) => bitset,
                Ok(None) => {
                    debug!(pid = record.pid, "No syscalls recorded for PID");
                    continue;
                }
                Err(e) => {
                    warn!(pid = record.pid, error = %e, "Unable to read syscalls for PID");
                    continue;
                }
            };

            for (id, _) in bitset.iter().enumerate().filter(|(_, set)| **set != 0) {
                match self.resolver.name(id as u32) {
                    Ok(name) => {
                        names.insert(name);
                    }
                    Err(e) => warn!(error = %e, "Unable to convert syscall ID"),
                }
            }
        }

        info!("Cleaning up BPF hashmaps");
        for record in &records {
            if let Err(e) = program.remove(record.pid) {
                warn!(pid = record.pid, error = %e, "Unable to clean up BPF maps");
            }
        }

        metrics::PROFILES_EXTRACTED.inc();
        Ok(names.into_iter().collect())
    }

    /// Load and unload once to verify the kernel program works here.
    ///
    /// Does nothing while a session is active.
    pub async fn self_test(&self) -> Result<(), RecorderError> {
        let mut session = self.session.lock().await;
        if self.store().session_count() > 0 {
            return Ok(());
        }

        info!("Doing BPF load/unload self-test");
        *session = SessionState::Loaded(self.load()?);
        unload(&mut session).await;
        Ok(())
    }

    /// Unload regardless of outstanding sessions and stop the caches.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        unload(&mut session).await;
        self.store().reset_sessions();
        metrics::set_session(0, false);

        self.resolver.close();
        self.pipeline.containers.close();
        info!("Recorder shut down");
    }

    fn load(&self) -> Result<LoadedSession, RecorderError> {
        info!("Loading bpf module");
        let btf_path = btf::resolve(self.host.as_ref(), &self.btf_table)?;

        let loaded = match self.backend.load(btf_path.as_deref()) {
            Ok(loaded) => loaded,
            Err(e) => {
                remove_btf(btf_path.as_ref());
                return Err(e.into());
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&self.pipeline).run(
            Arc::clone(&loaded.program),
            loaded.events,
            shutdown_rx,
        ));
        info!("Recorder program loaded");

        Ok(LoadedSession {
            program: loaded.program,
            worker,
            shutdown,
            btf_path,
        })
    }
}

/// Tear down a loaded session; a no-op when nothing is loaded.
async fn unload(state: &mut SessionState) {
    let SessionState::Loaded(session) = std::mem::replace(state, SessionState::Unloaded) else {
        return;
    };

    info!("Unloading bpf module");
    // The worker must be gone before the maps it reads are released.
    session.shutdown.send_replace(true);
    if let Err(e) = session.worker.await {
        warn!(error = %e, "Event worker did not exit cleanly");
    }
    session.program.close();
    remove_btf(session.btf_path.as_ref());
}

fn remove_btf(path: Option<&PathBuf>) {
    if let Some(path) = path {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Unable to remove BTF file");
        }
    }
}
