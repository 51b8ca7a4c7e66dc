//! In-memory stand-ins for the kernel, the cluster and the host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use bpfrecorder::btf::BtfTable;
use bpfrecorder::cluster::{ClusterError, ContainerStatus, PodInfo, PodLister};
use bpfrecorder::config::{Backoff, RecorderConfig};
use bpfrecorder::ebpf::{BpfBackend, BpfError, BpfProgram, LoadedProgram, MAX_COMM_LEN, MAX_SYSCALLS};
use bpfrecorder::host::{HostInfo, OsRelease, Uname};
use bpfrecorder::syscalls::HostSyscallTable;
use bpfrecorder::{Collaborators, Recorder};

pub const ANNOTATION_PREFIX: &str = "io.containers.trace-bpf/";

/// A 64 character container ID starting with `prefix` (8 hex chars).
pub fn container_id(prefix: &str) -> String {
    prefix.repeat(64 / prefix.len())
}

/// Kernel maps of one loaded program.
pub struct FakeProgram {
    syscalls: Mutex<HashMap<u32, Vec<u8>>>,
    comms: Mutex<HashMap<u32, Vec<u8>>>,
    events: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    removed: Mutex<Vec<u32>>,
    closes: Arc<AtomicUsize>,
}

impl FakeProgram {
    /// Pretend `pid` ran as `comm` and issued `ids`.
    pub fn run_process(&self, pid: u32, comm: &str, ids: &[usize]) {
        let mut bitset = vec![0u8; MAX_SYSCALLS];
        for &id in ids {
            bitset[id] = 1;
        }
        self.syscalls.lock().unwrap().insert(pid, bitset);

        let mut raw = vec![0u8; MAX_COMM_LEN];
        raw[..comm.len()].copy_from_slice(comm.as_bytes());
        self.comms.lock().unwrap().insert(pid, raw);
    }

    /// Emit the new-PID ring buffer record for `pid`.
    pub async fn announce(&self, pid: u32) {
        let sender = self.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            sender.send(pid.to_le_bytes().to_vec()).await.unwrap();
        }
    }

    pub fn removed(&self) -> Vec<u32> {
        self.removed.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.events.lock().unwrap().is_none()
    }
}

impl BpfProgram for FakeProgram {
    fn syscalls(&self, pid: u32) -> Result<Option<Vec<u8>>, BpfError> {
        Ok(self.syscalls.lock().unwrap().get(&pid).cloned())
    }

    fn comm(&self, pid: u32) -> Result<Option<Vec<u8>>, BpfError> {
        Ok(self.comms.lock().unwrap().get(&pid).cloned())
    }

    fn remove(&self, pid: u32) -> Result<(), BpfError> {
        self.syscalls.lock().unwrap().remove(&pid);
        self.comms.lock().unwrap().remove(&pid);
        self.removed.lock().unwrap().push(pid);
        Ok(())
    }

    fn close(&self) {
        if self.events.lock().unwrap().take().is_some() {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Counts loads and unloads; can be told to fail.
#[derive(Default)]
pub struct FakeBackend {
    loads: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail: AtomicBool,
    current: Mutex<Option<Arc<FakeProgram>>>,
    last_btf: Mutex<Option<PathBuf>>,
}

impl FakeBackend {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// The most recently loaded program.
    pub fn program(&self) -> Arc<FakeProgram> {
        self.current.lock().unwrap().clone().expect("nothing loaded")
    }

    pub fn last_btf(&self) -> Option<PathBuf> {
        self.last_btf.lock().unwrap().clone()
    }
}

impl BpfBackend for FakeBackend {
    fn load(&self, btf: Option<&Path>) -> Result<LoadedProgram, BpfError> {
        *self.last_btf.lock().unwrap() = btf.map(Path::to_path_buf);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BpfError::Attach("injected failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        let program = Arc::new(FakeProgram {
            syscalls: Mutex::new(HashMap::new()),
            comms: Mutex::new(HashMap::new()),
            events: Mutex::new(Some(tx)),
            removed: Mutex::new(Vec::new()),
            closes: Arc::clone(&self.closes),
        });
        self.loads.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = Some(Arc::clone(&program));

        Ok(LoadedProgram {
            program,
            events: rx,
        })
    }
}

/// Host with a fixed pid → container table.
pub struct FakeHost {
    pub system_btf: bool,
    pub containers: Mutex<HashMap<u32, String>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            system_btf: true,
            containers: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeHost {
    pub fn place(&self, pid: u32, container_id: &str) {
        self.containers
            .lock()
            .unwrap()
            .insert(pid, container_id.to_string());
    }
}

impl HostInfo for FakeHost {
    fn system_btf_available(&self) -> bool {
        self.system_btf
    }

    fn os_release(&self) -> io::Result<OsRelease> {
        Ok(OsRelease::from_pairs([("ID", "ubuntu"), ("VERSION_ID", "18.04")]))
    }

    fn uname(&self) -> io::Result<Uname> {
        Ok(Uname {
            machine: "x86_64".to_string(),
            release: "4.15.0-20-generic".to_string(),
        })
    }

    fn container_id(&self, pid: u32) -> io::Result<String> {
        self.containers
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such process"))
    }
}

/// Pods on the node, editable while the recorder runs.
#[derive(Default)]
pub struct FakePods {
    pods: Mutex<Vec<PodInfo>>,
    calls: AtomicUsize,
}

impl FakePods {
    /// Add a pod with one container recorded as `profile` (if any).
    pub fn add(&self, container_name: &str, container_id: &str, profile: Option<&str>) {
        let mut annotations = HashMap::new();
        if let Some(profile) = profile {
            annotations.insert(
                format!("{}{}", ANNOTATION_PREFIX, container_name),
                profile.to_string(),
            );
        }
        self.pods.lock().unwrap().push(PodInfo {
            name: format!("pod-{}", container_name),
            namespace: "default".to_string(),
            annotations,
            containers: vec![ContainerStatus {
                name: container_name.to_string(),
                container_id: format!("containerd://{}", container_id),
            }],
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl PodLister for FakePods {
    async fn list_node_pods(&self, _node_name: &str) -> Result<Vec<PodInfo>, ClusterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pods.lock().unwrap().clone())
    }
}

/// A recorder wired to fakes, with a short cluster search.
pub struct Harness {
    pub recorder: Recorder,
    pub backend: Arc<FakeBackend>,
    pub host: Arc<FakeHost>,
    pub pods: Arc<FakePods>,
}

pub fn config() -> RecorderConfig {
    RecorderConfig {
        node_name: "worker-1".to_string(),
        search_timeout: Duration::from_millis(300),
        search_backoff: Backoff {
            initial: Duration::from_millis(10),
            factor: 1.5,
            max: Duration::from_millis(50),
        },
        ..RecorderConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_host(FakeHost::default())
    }

    pub fn with_host(host: FakeHost) -> Self {
        Self::build(host, BtfTable::default())
    }

    pub fn build(host: FakeHost, btf_table: BtfTable) -> Self {
        let backend = Arc::new(FakeBackend::default());
        let host = Arc::new(host);
        let pods = Arc::new(FakePods::default());
        let recorder = Recorder::new(
            &config(),
            Collaborators {
                backend: backend.clone(),
                host: host.clone(),
                pods: pods.clone(),
                syscalls: Arc::new(HostSyscallTable::new("x86_64")),
            },
        )
        .with_btf_table(btf_table);
        Self {
            recorder,
            backend,
            host,
            pods,
        }
    }

    /// Wait until the pipeline has recorded something for `profile`.
    pub async fn wait_for_profile(&self, profile: &str) {
        self.wait_for_records(profile, 1).await;
    }

    /// Wait until `count` processes are recorded for `profile`.
    pub async fn wait_for_records(&self, profile: &str, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.recorder.store().record_count(profile) < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "profile {} never reached {} records",
                profile,
                count
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
