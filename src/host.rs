//! Host identity and process inspection
//!
//! The recorder needs a handful of facts about the node it runs on: whether
//! the kernel exposes its own BTF, which OS release and kernel it is, and
//! which container a PID belongs to. [`HostInfo`] is the seam; [`ProcHost`]
//! reads the real `/proc`, `/etc` and `/sys` files.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Kernel-provided BTF location.
pub const SYSTEM_BTF_PATH: &str = "/sys/kernel/btf/vmlinux";

/// Length of a full OCI container ID in hex characters.
const CONTAINER_ID_LEN: usize = 64;

const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

/// Parsed `os-release` key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease(HashMap<String, String>);

impl OsRelease {
    /// Parse the `KEY=value` format, dropping comments and surrounding quotes.
    pub fn parse(content: &str) -> Self {
        let fields = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                (key.trim().to_string(), value.to_string())
            })
            .collect();
        Self(fields)
    }

    /// Build from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// `ID` field, e.g. `ubuntu`.
    pub fn id(&self) -> &str {
        self.get("ID")
    }

    /// `VERSION_ID` field, e.g. `20.04`.
    pub fn version_id(&self) -> &str {
        self.get("VERSION_ID")
    }

    /// Any field, empty when absent.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// `uname` machine and release strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uname {
    /// CPU architecture, e.g. `x86_64`.
    pub machine: String,
    /// Kernel release, e.g. `5.8.0-63-generic`.
    pub release: String,
}

/// Facts about the local node.
pub trait HostInfo: Send + Sync {
    /// Whether the running kernel ships its own BTF.
    fn system_btf_available(&self) -> bool;

    /// The OS release metadata.
    fn os_release(&self) -> io::Result<OsRelease>;

    /// Machine architecture and kernel release.
    fn uname(&self) -> io::Result<Uname>;

    /// Container ID owning `pid`; fails when the process is gone or is not
    /// containerized.
    fn container_id(&self, pid: u32) -> io::Result<String>;
}

/// [`HostInfo`] backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct ProcHost {
    proc_root: PathBuf,
    btf_path: PathBuf,
    os_release_paths: Vec<PathBuf>,
}

impl Default for ProcHost {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            btf_path: PathBuf::from(SYSTEM_BTF_PATH),
            os_release_paths: OS_RELEASE_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl ProcHost {
    /// Inspect the host through a different `/proc` mount (e.g. `/host/proc`).
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }
}

impl HostInfo for ProcHost {
    fn system_btf_available(&self) -> bool {
        self.btf_path.exists()
    }

    fn os_release(&self) -> io::Result<OsRelease> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no os-release file");
        for path in &self.os_release_paths {
            match fs::read_to_string(path) {
                Ok(content) => return Ok(OsRelease::parse(&content)),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn uname(&self) -> io::Result<Uname> {
        let uts = nix::sys::utsname::uname().map_err(io::Error::from)?;
        Ok(Uname {
            machine: uts.machine().to_string_lossy().into_owned(),
            release: uts.release().to_string_lossy().into_owned(),
        })
    }

    fn container_id(&self, pid: u32) -> io::Result<String> {
        container_id_from_cgroup_file(&self.proc_root.join(pid.to_string()).join("cgroup"))
    }
}

fn container_id_from_cgroup_file(path: &Path) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .find_map(extract_container_id)
        .map(str::to_string)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no container ID in {}", path.display()),
            )
        })
}

/// Find the first full-length container ID in `s`.
///
/// Works for cgroup paths (`.../cri-containerd-<id>.scope`,
/// `/kubepods/.../pod<uid>/<id>`) as well as runtime-prefixed status IDs
/// (`containerd://<id>`, `cri-o://<id>`).
pub fn extract_container_id(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if !is_id_char(bytes[start]) {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < bytes.len() && is_id_char(bytes[end]) {
            end += 1;
        }
        let word_boundary = (start == 0 || !bytes[start - 1].is_ascii_alphanumeric())
            && (end == bytes.len() || !bytes[end].is_ascii_alphanumeric());
        if end - start == CONTAINER_ID_LEN && word_boundary {
            return Some(&s[start..end]);
        }
        start = end;
    }
    None
}

fn is_id_char(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}
