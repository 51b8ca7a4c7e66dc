//! eBPF syscall recorder
//!
//! Attaches to `raw_syscalls:sys_exit` and marks, per thread group, every
//! syscall id seen. The first syscall of a thread group also stores its
//! command name and announces the PID to userspace through the ring buffer.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::BPF_NOEXIST,
    helpers::{bpf_get_current_comm, bpf_get_current_pid_tgid},
    macros::{map, tracepoint},
    maps::{Array, HashMap, RingBuf},
    programs::TracePointContext,
};
use aya_log_ebpf::debug;

/// Syscall slots per bitset; ids at or above this are ignored.
const MAX_SYSCALLS: usize = 1024;

/// Command name size stored for userspace.
const MAX_COMM_LEN: usize = 64;

/// Thread groups tracked at once.
const MAX_PIDS: u32 = 65536;

/// Offset of `long id` in the raw_syscalls:sys_exit record.
const SYSCALL_ID_OFFSET: usize = 8;

/// BPF Map: PID -> one byte per syscall id, 1 when issued
#[map(name = "syscalls")]
static SYSCALLS: HashMap<u32, [u8; MAX_SYSCALLS]> = HashMap::with_max_entries(MAX_PIDS, 0);

/// BPF Map: PID -> NUL padded command name
#[map(name = "comms")]
static COMMS: HashMap<u32, [u8; MAX_COMM_LEN]> = HashMap::with_max_entries(MAX_PIDS, 0);

/// Never written; source of zeroed bitsets, which do not fit on the stack.
#[map(name = "zero")]
static ZERO: Array<[u8; MAX_SYSCALLS]> = Array::with_max_entries(1, 0);

/// PIDs seen for the first time, as little-endian u32
#[map(name = "events")]
static EVENTS: RingBuf = RingBuf::with_byte_size(1 << 24, 0);

/// Tracepoint for syscall exit
/// Attaches to: tracepoint/raw_syscalls/sys_exit
#[tracepoint]
pub fn sys_exit(ctx: TracePointContext) -> u32 {
    match try_sys_exit(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

fn try_sys_exit(ctx: &TracePointContext) -> Result<u32, i64> {
    let id: i64 = unsafe { ctx.read_at(SYSCALL_ID_OFFSET)? };
    if id < 0 || id as usize >= MAX_SYSCALLS {
        return Ok(0);
    }
    let id = (id as usize) & (MAX_SYSCALLS - 1);

    // Upper 32 bits of pid_tgid are the thread group id.
    let pid = (bpf_get_current_pid_tgid() >> 32) as u32;

    if let Some(bitset) = SYSCALLS.get_ptr_mut(&pid) {
        unsafe { (*bitset)[id] = 1 };
        return Ok(0);
    }

    let empty = ZERO.get(0).ok_or(0i64)?;
    SYSCALLS.insert(&pid, empty, BPF_NOEXIST as u64)?;
    if let Some(bitset) = SYSCALLS.get_ptr_mut(&pid) {
        unsafe { (*bitset)[id] = 1 };
    }

    let mut comm = [0u8; MAX_COMM_LEN];
    if let Ok(current) = bpf_get_current_comm() {
        comm[..current.len()].copy_from_slice(&current);
    }
    COMMS.insert(&pid, &comm, 0)?;

    if EVENTS.output(&pid.to_le_bytes(), 0).is_err() {
        debug!(ctx, "ring buffer full, dropped pid {}", pid);
    }

    Ok(0)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
