/*
 * System Call Wrappers
 *
 * The caller-side half of the ABI: raise interrupt 0x80 with the call
 * number in RAX and arguments in RBX, RCX and RDX, then hand back the
 * RAX the kernel left behind. Kernel-resident programs (the demo
 * processes) use the typed wrappers below exactly the way user binaries
 * would.
 *
 * RBX is reserved by the compiler, so the wrappers swap it in and out
 * around the interrupt instead of naming it as an operand.
 */

use core::arch::asm;

use super::numbers;

#[inline]
fn syscall0(number: u64) -> i64 {
    let rc: i64;
    unsafe {
        asm!(
            "int 0x80",
            inout("rax") number => rc,
        );
    }
    rc
}

#[inline]
fn syscall1(number: u64, arg1: u64) -> i64 {
    let rc: i64;
    unsafe {
        asm!(
            "xchg rbx, {arg1}",
            "int 0x80",
            "xchg rbx, {arg1}",
            arg1 = inout(reg) arg1 => _,
            inout("rax") number => rc,
        );
    }
    rc
}

#[inline]
fn syscall2(number: u64, arg1: u64, arg2: u64) -> i64 {
    let rc: i64;
    unsafe {
        asm!(
            "xchg rbx, {arg1}",
            "int 0x80",
            "xchg rbx, {arg1}",
            arg1 = inout(reg) arg1 => _,
            inout("rax") number => rc,
            in("rcx") arg2,
        );
    }
    rc
}

#[inline]
fn syscall3(number: u64, arg1: u64, arg2: u64, arg3: u64) -> i64 {
    let rc: i64;
    unsafe {
        asm!(
            "xchg rbx, {arg1}",
            "int 0x80",
            "xchg rbx, {arg1}",
            arg1 = inout(reg) arg1 => _,
            inout("rax") number => rc,
            in("rcx") arg2,
            in("rdx") arg3,
        );
    }
    rc
}

/// Seconds since boot.
pub fn get_time() -> i64 {
    syscall0(numbers::SYS_GET_TIME)
}

/// Copy the OS name into `buf` (needs room for the terminator).
pub fn get_sys_name(buf: &mut [u8]) -> i64 {
    syscall1(numbers::SYS_GET_NAME, buf.as_mut_ptr() as u64)
}

/// Pid of the calling process.
pub fn get_pid() -> i64 {
    syscall0(numbers::PROC_GET_PID)
}

/// Copy the calling process's name into `buf`.
pub fn get_name(buf: &mut [u8]) -> i64 {
    syscall1(numbers::PROC_GET_NAME, buf.as_mut_ptr() as u64)
}

/// Sleep for `seconds`.
pub fn sleep(seconds: u32) -> i64 {
    syscall1(numbers::PROC_SLEEP, seconds as u64)
}

/// Terminate the calling process.
pub fn exit() -> ! {
    syscall0(numbers::PROC_EXIT);
    // The kernel destroyed this process; execution cannot come back.
    unreachable!("returned from PROC_EXIT");
}

/// Write `buf` to I/O slot `io`; returns bytes written.
pub fn io_write(io: usize, buf: &[u8]) -> i64 {
    syscall3(
        numbers::IO_WRITE,
        io as u64,
        buf.as_ptr() as u64,
        buf.len() as u64,
    )
}

/// Read into `buf` from I/O slot `io`; returns bytes read.
pub fn io_read(io: usize, buf: &mut [u8]) -> i64 {
    syscall3(
        numbers::IO_READ,
        io as u64,
        buf.as_mut_ptr() as u64,
        buf.len() as u64,
    )
}

/// Drop everything queued in I/O slot `io`.
pub fn io_flush(io: usize) -> i64 {
    syscall1(numbers::IO_FLUSH, io as u64)
}

pub fn mutex_init() -> i64 {
    syscall0(numbers::MUTEX_INIT)
}

pub fn mutex_destroy(id: i64) -> i64 {
    syscall1(numbers::MUTEX_DESTROY, id as u64)
}

pub fn mutex_lock(id: i64) -> i64 {
    syscall1(numbers::MUTEX_LOCK, id as u64)
}

pub fn mutex_unlock(id: i64) -> i64 {
    syscall1(numbers::MUTEX_UNLOCK, id as u64)
}

pub fn sem_init(value: i32) -> i64 {
    syscall1(numbers::SEM_INIT, value as u64)
}

pub fn sem_destroy(id: i64) -> i64 {
    syscall1(numbers::SEM_DESTROY, id as u64)
}

pub fn sem_wait(id: i64) -> i64 {
    syscall1(numbers::SEM_WAIT, id as u64)
}

pub fn sem_post(id: i64) -> i64 {
    syscall1(numbers::SEM_POST, id as u64)
}
