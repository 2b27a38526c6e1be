/*
 * System Call Handlers
 *
 * Kernel-side implementations behind the dispatcher. Each handler returns
 * the value destined for the caller's accumulator; -1 reports an error.
 * Handlers that block do their blocking through the scheduler and still
 * return the value the caller will observe on resumption.
 *
 * Every handler requires an active process; the dispatcher guarantees one
 * exists before routing here.
 */

use crate::OS_NAME;
use crate::components::tty::TtyTable;
use crate::scheduler::{Scheduler, TICKS_PER_SECOND};
use crate::scheduler::process::{IoHandle, PROC_IO_MAX};
use crate::sync::{MutexPool, SemaphorePool};
use crate::utils::ring_buffer::RingBuffer;

use crate::components::tty::TTY_IO_SIZE;

/// Seconds since boot.
pub fn sys_get_time(ticks: u32) -> i64 {
    (ticks / TICKS_PER_SECOND) as i64
}

/// Copy the OS name (with terminator) into `buf`.
pub fn sys_get_name(buf: &mut [u8]) -> i64 {
    if buf.len() <= OS_NAME.len() {
        return -1;
    }
    buf[..OS_NAME.len()].copy_from_slice(OS_NAME.as_bytes());
    buf[OS_NAME.len()] = 0;
    0
}

pub fn proc_get_pid(sched: &mut Scheduler) -> i64 {
    let pcb = sched.active_pcb().expect("system call with no active process");
    pcb.pid as i64
}

/// Copy the calling process's name (with terminator) into `buf`.
pub fn proc_get_name(sched: &mut Scheduler, buf: &mut [u8]) -> i64 {
    let pcb = sched.active_pcb().expect("system call with no active process");
    let name = pcb.name.as_bytes();
    if buf.len() <= name.len() {
        return -1;
    }
    buf[..name.len()].copy_from_slice(name);
    buf[name.len()] = 0;
    0
}

/// Put the caller to sleep. The scheduler picks someone else on the way
/// out of this kernel entry.
pub fn proc_sleep(sched: &mut Scheduler, seconds: u32) -> i64 {
    let pid = sched.active_pid().expect("system call with no active process");
    sched.sleep(pid, seconds);
    0
}

/// Destroy the caller. Fails only for the idle process.
pub fn proc_exit(sched: &mut Scheduler) -> i64 {
    let pid = sched.active_pid().expect("system call with no active process");
    if sched.destroy(pid) { 0 } else { -1 }
}

/// Resolve one of the caller's I/O slots down to the terminal ring buffer
/// it references.
fn io_ring<'a>(
    sched: &mut Scheduler,
    ttys: &'a mut TtyTable,
    io: usize,
) -> Option<&'a mut RingBuffer<TTY_IO_SIZE>> {
    if io >= PROC_IO_MAX {
        log::error!("out of range I/O slot {}", io);
        return None;
    }
    let pcb = sched.active_pcb().expect("system call with no active process");
    let handle = pcb.io[io]?;
    match handle {
        IoHandle::TtyInput(tty) => ttys.tty(tty).map(|tty| &mut tty.io_input),
        IoHandle::TtyOutput(tty) => ttys.tty(tty).map(|tty| &mut tty.io_output),
    }
}

/// Write up to `buf.len()` bytes into the caller's I/O slot. Returns the
/// number of bytes transferred.
pub fn io_write(sched: &mut Scheduler, ttys: &mut TtyTable, io: usize, buf: &[u8]) -> i64 {
    match io_ring(sched, ttys, io) {
        Some(ring) => ring.write_mem(buf) as i64,
        None => -1,
    }
}

/// Read up to `buf.len()` bytes from the caller's I/O slot. Returns the
/// number of bytes transferred.
pub fn io_read(sched: &mut Scheduler, ttys: &mut TtyTable, io: usize, buf: &mut [u8]) -> i64 {
    match io_ring(sched, ttys, io) {
        Some(ring) => ring.read_mem(buf) as i64,
        None => -1,
    }
}

/// Discard everything queued in the caller's I/O slot.
pub fn io_flush(sched: &mut Scheduler, ttys: &mut TtyTable, io: usize) -> i64 {
    match io_ring(sched, ttys, io) {
        Some(ring) => {
            ring.flush();
            0
        }
        None => -1,
    }
}

pub fn mutex_init(mutexes: &mut MutexPool) -> i64 {
    mutexes.init().map(|id| id as i64).unwrap_or(-1)
}

pub fn mutex_destroy(mutexes: &mut MutexPool, id: usize) -> i64 {
    mutexes.destroy(id).unwrap_or(-1)
}

pub fn mutex_lock(mutexes: &mut MutexPool, sched: &mut Scheduler, id: usize) -> i64 {
    mutexes.lock(id, sched).unwrap_or(-1)
}

pub fn mutex_unlock(mutexes: &mut MutexPool, sched: &mut Scheduler, id: usize) -> i64 {
    mutexes.unlock(id, sched).unwrap_or(-1)
}

pub fn sem_init(semaphores: &mut SemaphorePool, value: i32) -> i64 {
    semaphores.init(value).map(|id| id as i64).unwrap_or(-1)
}

pub fn sem_destroy(semaphores: &mut SemaphorePool, id: usize) -> i64 {
    semaphores.destroy(id).unwrap_or(-1)
}

pub fn sem_wait(semaphores: &mut SemaphorePool, sched: &mut Scheduler, id: usize) -> i64 {
    semaphores.wait(id, sched).unwrap_or(-1)
}

pub fn sem_post(semaphores: &mut SemaphorePool, sched: &mut Scheduler, id: usize) -> i64 {
    semaphores.post(id, sched).unwrap_or(-1)
}
