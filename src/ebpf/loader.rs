//! aya backend for the recorder program
//!
//! Loads the pre-built recorder object, attaches it to
//! `raw_syscalls/sys_exit` and forwards ring buffer records to a channel.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use aya::maps::{HashMap, MapData, MapError, RingBuf};
use aya::programs::TracePoint;
use aya::{include_bytes_aligned, Bpf, BpfLoader, Btf, Endianness};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BpfBackend, BpfError, BpfProgram, LoadedProgram, MAX_COMM_LEN, MAX_SYSCALLS};

const PROGRAM_NAME: &str = "sys_exit";
const SYSCALLS_MAP: &str = "syscalls";
const COMMS_MAP: &str = "comms";
const EVENTS_MAP: &str = "events";

/// Capacity of the channel between the ring buffer reader and the pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 4096;

type SyscallsMap = HashMap<MapData, u32, [u8; MAX_SYSCALLS]>;
type CommsMap = HashMap<MapData, u32, [u8; MAX_COMM_LEN]>;

/// Recorder object for the architecture this binary targets.
fn program_object() -> Result<&'static [u8], BpfError> {
    #[cfg(target_arch = "x86_64")]
    {
        Ok(include_bytes_aligned!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/target/ebpf/recorder-x86_64.o"
        )))
    }
    #[cfg(target_arch = "aarch64")]
    {
        Ok(include_bytes_aligned!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/target/ebpf/recorder-aarch64.o"
        )))
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        Err(BpfError::UnsupportedArch(std::env::consts::ARCH.to_string()))
    }
}

/// Loads the recorder with aya.
#[derive(Debug, Default, Clone, Copy)]
pub struct AyaBackend;

impl BpfBackend for AyaBackend {
    fn load(&self, btf: Option<&Path>) -> Result<LoadedProgram, BpfError> {
        let object = program_object()?;

        info!("Loading bpf module");
        let mut loader = BpfLoader::new();
        let custom_btf = btf
            .map(|path| {
                Btf::parse_file(path, Endianness::default())
                    .map_err(|e| BpfError::Load(format!("BTF {}: {}", path.display(), e)))
            })
            .transpose()?;
        if let Some(custom_btf) = custom_btf.as_ref() {
            debug!("Using custom BTF");
            loader.btf(Some(custom_btf));
        }

        // Everything below drops `bpf` on error, which unloads the program.
        let mut bpf = loader
            .load(object)
            .map_err(|e| BpfError::Load(e.to_string()))?;

        if let Err(e) = aya_log::BpfLogger::init(&mut bpf) {
            debug!(error = %e, "Kernel-side logging unavailable");
        }

        info!("Loading bpf object from module");
        let program: &mut TracePoint = bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| BpfError::Load(format!("{} program not found", PROGRAM_NAME)))?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| BpfError::Load(e.to_string()))?;
        program.load().map_err(|e| BpfError::Load(e.to_string()))?;

        info!("Attaching bpf tracepoint");
        program
            .attach("raw_syscalls", "sys_exit")
            .map_err(|e| BpfError::Attach(e.to_string()))?;

        info!("Getting syscalls map");
        let syscalls: SyscallsMap = take_map(&mut bpf, SYSCALLS_MAP)?;
        info!("Getting comms map");
        let comms: CommsMap = take_map(&mut bpf, COMMS_MAP)?;

        info!("Initializing ringbuffer");
        let ring: RingBuf<MapData> = take_map(&mut bpf, EVENTS_MAP)?;
        let ring = AsyncFd::new(ring).map_err(|e| BpfError::Map(e.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(read_events(ring, tx));

        let program = AyaProgram {
            state: Mutex::new(Some(Attached {
                _bpf: bpf,
                syscalls,
                comms,
                reader,
            })),
        };

        Ok(LoadedProgram {
            program: Arc::new(program),
            events: rx,
        })
    }
}

fn take_map<M>(bpf: &mut Bpf, name: &str) -> Result<M, BpfError>
where
    M: TryFrom<aya::maps::Map, Error = MapError>,
{
    bpf.take_map(name)
        .ok_or_else(|| BpfError::Map(format!("{} map not found", name)))?
        .try_into()
        .map_err(|e: MapError| BpfError::Map(e.to_string()))
}

/// Copy every ring buffer record into the channel until the receiver goes
/// away or the task is aborted.
async fn read_events(mut ring: AsyncFd<RingBuf<MapData>>, tx: mpsc::Sender<Vec<u8>>) {
    loop {
        let mut guard = match ring.readable_mut().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "Ring buffer poll failed");
                return;
            }
        };

        let mut batch = Vec::new();
        {
            let ring = guard.get_inner_mut();
            while let Some(item) = ring.next() {
                batch.push(item.to_vec());
            }
        }
        guard.clear_ready();
        drop(guard);

        for event in batch {
            if tx.send(event).await.is_err() {
                debug!("Event receiver closed");
                return;
            }
        }
    }
}

struct Attached {
    // Dropping the loader handle detaches the tracepoint.
    _bpf: Bpf,
    syscalls: SyscallsMap,
    comms: CommsMap,
    reader: JoinHandle<()>,
}

struct AyaProgram {
    state: Mutex<Option<Attached>>,
}

impl AyaProgram {
    fn with_attached<T>(
        &self,
        f: impl FnOnce(&mut Attached) -> Result<T, BpfError>,
    ) -> Result<T, BpfError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.as_mut() {
            Some(attached) => f(attached),
            None => Err(BpfError::Map("program closed".to_string())),
        }
    }
}

fn absent_as_none<V>(result: Result<V, MapError>) -> Result<Option<V>, BpfError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(MapError::KeyNotFound) => Ok(None),
        Err(e) => Err(BpfError::Map(e.to_string())),
    }
}

impl BpfProgram for AyaProgram {
    fn syscalls(&self, pid: u32) -> Result<Option<Vec<u8>>, BpfError> {
        self.with_attached(|a| Ok(absent_as_none(a.syscalls.get(&pid, 0))?.map(|v| v.to_vec())))
    }

    fn comm(&self, pid: u32) -> Result<Option<Vec<u8>>, BpfError> {
        self.with_attached(|a| Ok(absent_as_none(a.comms.get(&pid, 0))?.map(|v| v.to_vec())))
    }

    fn remove(&self, pid: u32) -> Result<(), BpfError> {
        self.with_attached(|a| {
            absent_as_none(a.syscalls.remove(&pid))?;
            absent_as_none(a.comms.remove(&pid))?;
            Ok(())
        })
    }

    fn close(&self) {
        let attached = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(attached) = attached {
            attached.reader.abort();
            info!("Unloaded bpf module");
        }
    }
}

impl Drop for AyaProgram {
    fn drop(&mut self) {
        self.close();
    }
}
