//! BTF resolution for kernels without built-in type information
//!
//! The recorder's kernel program needs BTF for relocations. Modern kernels
//! expose it at `/sys/kernel/btf/vmlinux`; for older distributions a table of
//! known BTF blobs can be shipped alongside the agent.
//!
//! ```text
//! system BTF present? ──yes──► None (use system BTF)
//!        │no
//!        ▼
//! (os id, os version, arch, kernel) in table? ──no──► None
//!        │yes
//!        ▼
//! write blob to temp file ──► Some(path)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::info;

use crate::error::{BtfError, RecorderError};
use crate::host::HostInfo;

/// Composite lookup key of a BTF blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BtfKey {
    /// os-release `ID`.
    pub os: String,
    /// os-release `VERSION_ID`.
    pub os_version: String,
    /// `uname` machine.
    pub arch: String,
    /// `uname` release.
    pub kernel: String,
}

impl fmt::Display for BtfKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.os, self.os_version, self.arch, self.kernel)
    }
}

/// Nested on-disk form: os → version → arch → kernel → base64 blob.
type NestedTable = HashMap<String, HashMap<String, HashMap<String, HashMap<String, String>>>>;

/// Known BTF blobs keyed by host identity.
#[derive(Debug, Clone, Default)]
pub struct BtfTable {
    entries: HashMap<BtfKey, Vec<u8>>,
}

impl BtfTable {
    /// Parse the nested JSON table format.
    pub fn from_json(json: &str) -> Result<Self, BtfError> {
        let nested: NestedTable = serde_json::from_str(json)?;
        let mut entries = HashMap::new();
        for (os, versions) in nested {
            for (os_version, arches) in versions {
                for (arch, kernels) in arches {
                    for (kernel, blob) in kernels {
                        let key = BtfKey {
                            os: os.clone(),
                            os_version: os_version.clone(),
                            arch: arch.clone(),
                            kernel,
                        };
                        let bytes = base64::engine::general_purpose::STANDARD
                            .decode(blob.as_bytes())
                            .map_err(|source| BtfError::Decode {
                                key: key.to_string(),
                                source,
                            })?;
                        entries.insert(key, bytes);
                    }
                }
            }
        }
        Ok(Self { entries })
    }

    /// Load the table from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, BtfError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Insert a blob.
    pub fn insert(&mut self, key: BtfKey, bytes: Vec<u8>) {
        self.entries.insert(key, bytes);
    }

    /// Number of known blobs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no blobs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the blob for `key`, logging the first level that misses.
    pub fn lookup(&self, key: &BtfKey) -> Option<&[u8]> {
        let keys: Vec<&BtfKey> = self.entries.keys().filter(|k| k.os == key.os).collect();
        if keys.is_empty() {
            info!(os = %key.os, "OS not found in btf map");
            return None;
        }
        info!(os = %key.os, "OS found in btf map");

        let keys: Vec<&BtfKey> = keys.into_iter().filter(|k| k.os_version == key.os_version).collect();
        if keys.is_empty() {
            info!(version = %key.os_version, "OS version not found in btf map");
            return None;
        }
        info!(version = %key.os_version, "OS version found in btf map");

        if !keys.iter().any(|k| k.arch == key.arch) {
            info!(arch = %key.arch, "Architecture not found in btf map");
            return None;
        }
        info!(arch = %key.arch, "Architecture found in btf map");

        match self.entries.get(key) {
            Some(bytes) => {
                info!(kernel = %key.kernel, "Kernel found in btf map");
                Some(bytes.as_slice())
            }
            None => {
                info!(kernel = %key.kernel, "Kernel not found in btf map");
                None
            }
        }
    }
}

/// Decide which BTF the kernel program should be loaded with.
///
/// Returns `None` to use the system BTF, or the path of a freshly written
/// temporary file holding the matched blob. The caller owns the file and
/// must delete it on unload.
pub fn resolve(host: &dyn HostInfo, table: &BtfTable) -> Result<Option<PathBuf>, RecorderError> {
    if host.system_btf_available() {
        info!("Using system btf file");
        return Ok(None);
    }

    info!("Trying to find matching in-memory btf");
    let release = host.os_release().map_err(|source| RecorderError::Host {
        path: PathBuf::from("os-release"),
        source,
    })?;
    let uname = host.uname().map_err(|source| RecorderError::Host {
        path: PathBuf::from("uname"),
        source,
    })?;

    let key = BtfKey {
        os: release.id().to_string(),
        os_version: release.version_id().to_string(),
        arch: uname.machine,
        kernel: uname.release,
    };

    let Some(bytes) = table.lookup(&key) else {
        return Ok(None);
    };

    let path = materialize(&key, bytes).map_err(RecorderError::Btf)?;
    info!(path = %path.display(), "Wrote BTF to file");
    Ok(Some(path))
}

fn materialize(key: &BtfKey, bytes: &[u8]) -> Result<PathBuf, BtfError> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("bpf-recorder-btf-{}-", key))
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    let (_, path) = file.keep().map_err(|e| BtfError::Write(e.error))?;
    Ok(path)
}
