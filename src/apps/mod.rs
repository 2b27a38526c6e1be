/*
 * Demo Processes
 *
 * Small kernel-resident programs created at boot. They exercise the
 * system call surface the same way loaded user binaries would: everything
 * goes through interrupt 0x80.
 *
 * - ticker: prints the uptime to its terminal once a second
 * - echo:   copies its terminal input back to its output
 */

use core::fmt::Write;

use crate::scheduler::{self, process::{PROC_IO_IN, PROC_IO_OUT, ProcType}};
use crate::syscall::user;

/// Create the demo processes and bind them to terminals.
pub fn spawn_demos() {
    if let Some(pid) = scheduler::spawn(ticker_main, "ticker", ProcType::Kernel) {
        scheduler::attach_tty(pid, 0);
    }
    if let Some(pid) = scheduler::spawn(echo_main, "echo", ProcType::User) {
        scheduler::attach_tty(pid, 1);
    }
}

/// Report uptime once a second.
fn ticker_main() {
    loop {
        let mut line = heapless::String::<64>::new();
        let _ = writeln!(line, "up {}s (pid {})", user::get_time(), user::get_pid());
        user::io_write(PROC_IO_OUT, line.as_bytes());
        user::sleep(1);
    }
}

/// Copy terminal input back to the terminal.
fn echo_main() {
    let mut buf = [0u8; 64];
    loop {
        let n = user::io_read(PROC_IO_IN, &mut buf);
        if n > 0 {
            user::io_write(PROC_IO_OUT, &buf[..n as usize]);
        } else {
            user::sleep(1);
        }
    }
}
