//! Syscall id → name resolution
//!
//! Names come from a [`SyscallTable`] for the host architecture and are
//! memoized in a TTL cache keyed by the id's decimal string.

mod table;

use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::error::SyscallError;

/// Source of syscall names for one architecture.
pub trait SyscallTable: Send + Sync {
    /// Resolve `id` to its canonical name.
    fn name(&self, id: u32) -> Result<String, SyscallError>;
}

/// Built-in table for the architecture the agent runs on.
#[derive(Debug, Clone)]
pub struct HostSyscallTable {
    arch: String,
}

impl HostSyscallTable {
    /// Table for an explicit architecture (`uname -m` spelling).
    pub fn new(arch: impl Into<String>) -> Self {
        Self { arch: arch.into() }
    }

    /// Table for the architecture this binary was compiled for.
    pub fn native() -> Self {
        Self::new(std::env::consts::ARCH)
    }
}

impl SyscallTable for HostSyscallTable {
    fn name(&self, id: u32) -> Result<String, SyscallError> {
        table::lookup(&self.arch, id)
            .map(str::to_string)
            .ok_or_else(|| SyscallError::Unknown {
                id,
                arch: self.arch.clone(),
            })
    }
}

/// Cached syscall name lookups.
pub struct SyscallResolver {
    table: Arc<dyn SyscallTable>,
    cache: TtlCache<String, String>,
}

impl SyscallResolver {
    /// Create a resolver whose cache entries live for `ttl`.
    pub fn new(table: Arc<dyn SyscallTable>, ttl: Duration) -> Self {
        Self {
            table,
            cache: TtlCache::new("syscall_names", ttl),
        }
    }

    /// Name for `id`, from the cache when possible.
    pub fn name(&self, id: u32) -> Result<String, SyscallError> {
        let key = id.to_string();
        if let Some(name) = self.cache.get(&key) {
            return Ok(name);
        }

        let name = self.table.name(id)?;
        self.cache.insert(key, name.clone());
        Ok(name)
    }

    /// Stop the cache's background expiry.
    pub fn close(&self) {
        self.cache.close();
    }
}
