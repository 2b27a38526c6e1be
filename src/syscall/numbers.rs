/*
 * System Call Numbers
 *
 * The call number travels in the accumulator; up to three integer
 * arguments follow in RBX, RCX and RDX. The return value comes back in
 * the accumulator. Numbers are grouped by subsystem and stable: user code
 * compiled against these constants keeps working across kernel rebuilds.
 */

/// Seconds since boot.
pub const SYS_GET_TIME: u64 = 0x10;
/// Copy the operating system name into a caller buffer.
pub const SYS_GET_NAME: u64 = 0x11;

/// Pid of the calling process.
pub const PROC_GET_PID: u64 = 0x20;
/// Copy the calling process's name into a caller buffer.
pub const PROC_GET_NAME: u64 = 0x21;
/// Sleep for a number of seconds.
pub const PROC_SLEEP: u64 = 0x22;
/// Terminate the calling process. Does not return.
pub const PROC_EXIT: u64 = 0x23;

/// Write bytes to one of the caller's I/O buffers.
pub const IO_WRITE: u64 = 0x30;
/// Read bytes from one of the caller's I/O buffers.
pub const IO_READ: u64 = 0x31;
/// Discard everything queued in one of the caller's I/O buffers.
pub const IO_FLUSH: u64 = 0x32;

/// Allocate a mutex; returns its id.
pub const MUTEX_INIT: u64 = 0x40;
/// Free an unheld mutex.
pub const MUTEX_DESTROY: u64 = 0x41;
/// Acquire a mutex, blocking while it is held.
pub const MUTEX_LOCK: u64 = 0x42;
/// Release a mutex, handing it to the first waiter if any.
pub const MUTEX_UNLOCK: u64 = 0x43;

/// Allocate a semaphore with an initial count; returns its id.
pub const SEM_INIT: u64 = 0x50;
/// Free a semaphore that has no waiters.
pub const SEM_DESTROY: u64 = 0x51;
/// Take a permit, blocking while the count is zero.
pub const SEM_WAIT: u64 = 0x52;
/// Release a permit, waking the first waiter if any.
pub const SEM_POST: u64 = 0x53;
