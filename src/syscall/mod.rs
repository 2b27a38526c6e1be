/*
 * System Call Dispatch
 *
 * One software interrupt vector (0x80) serves every system call. By the
 * time the dispatcher runs, the common kernel entry has parked the
 * caller's trap frame on its process control block; that frame is both
 * the argument source (RAX number, RBX/RCX/RDX arguments) and the return
 * channel (RAX). Buffer arguments arrive as raw addresses in the caller's
 * address space, which for this kernel is the shared kernel space.
 *
 * A handler that blocks the caller still produces the value the caller
 * will observe when resumed; it is written into the parked frame before
 * the scheduler hands the CPU elsewhere. PROC_EXIT destroys the calling
 * process and therefore never writes a return value.
 *
 * An unknown call number is a kernel bug on the caller's side of the ABI
 * and panics.
 */

pub mod handlers;
pub mod numbers;
pub mod user;

use crate::OS_NAME;
use crate::arch::x86_64::interrupts;
use crate::components::tty::{self, TtyTable};
use crate::scheduler::{self, Scheduler};
use crate::scheduler::process::PROC_NAME_LEN;
use crate::sync::{self, MutexPool, SemaphorePool};
use crate::utils::timer;

/// Register the system call vector.
pub fn init() {
    interrupts::irq_register(
        interrupts::IRQ_SYSCALL,
        interrupts::isr_entry_syscall,
        syscall_irq_handler,
    );
}

/// IRQ handler for vector 0x80: gather the kernel components and route.
fn syscall_irq_handler() {
    let ticks = timer::get_ticks();
    scheduler::with(|sched| {
        sync::with_mutexes(|mutexes| {
            sync::with_semaphores(|semaphores| {
                tty::with_ttys(|ttys| dispatch(sched, mutexes, semaphores, ttys, ticks))
            })
        })
    });
}

/// Borrow `len` bytes at a caller-supplied address. Null is an error.
unsafe fn user_bytes<'a>(addr: u64, len: usize) -> Option<&'a [u8]> {
    if addr == 0 {
        return None;
    }
    Some(unsafe { core::slice::from_raw_parts(addr as *const u8, len) })
}

unsafe fn user_bytes_mut<'a>(addr: u64, len: usize) -> Option<&'a mut [u8]> {
    if addr == 0 {
        return None;
    }
    Some(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len) })
}

/// Decode the active process's parked frame, run the named operation and
/// write the result back into that frame.
///
/// Panics when no process is active, and on an unknown call number.
pub fn dispatch(
    sched: &mut Scheduler,
    mutexes: &mut MutexPool,
    semaphores: &mut SemaphorePool,
    ttys: &mut TtyTable,
    ticks: u32,
) {
    let Some(pid) = sched.active_pid() else {
        panic!("system call with no active process");
    };
    let frame = &sched
        .procs
        .get(pid)
        .expect("active process missing from table")
        .trapframe;
    let number = frame.syscall_number();
    let (arg1, arg2, arg3) = frame.syscall_args();

    // None means "do not touch the frame" (the caller is gone).
    let result: Option<i64> = match number {
        numbers::SYS_GET_TIME => Some(handlers::sys_get_time(ticks)),
        numbers::SYS_GET_NAME => {
            Some(match unsafe { user_bytes_mut(arg1, OS_NAME.len() + 1) } {
                Some(buf) => handlers::sys_get_name(buf),
                None => -1,
            })
        }
        numbers::PROC_GET_PID => Some(handlers::proc_get_pid(sched)),
        numbers::PROC_GET_NAME => {
            Some(match unsafe { user_bytes_mut(arg1, PROC_NAME_LEN + 1) } {
                Some(buf) => handlers::proc_get_name(sched, buf),
                None => -1,
            })
        }
        numbers::PROC_SLEEP => Some(handlers::proc_sleep(sched, arg1 as u32)),
        numbers::PROC_EXIT => {
            handlers::proc_exit(sched);
            None
        }
        numbers::IO_WRITE => Some(match unsafe { user_bytes(arg2, arg3 as usize) } {
            Some(buf) => handlers::io_write(sched, ttys, arg1 as usize, buf),
            None => -1,
        }),
        numbers::IO_READ => Some(match unsafe { user_bytes_mut(arg2, arg3 as usize) } {
            Some(buf) => handlers::io_read(sched, ttys, arg1 as usize, buf),
            None => -1,
        }),
        numbers::IO_FLUSH => Some(handlers::io_flush(sched, ttys, arg1 as usize)),
        numbers::MUTEX_INIT => Some(handlers::mutex_init(mutexes)),
        numbers::MUTEX_DESTROY => Some(handlers::mutex_destroy(mutexes, arg1 as usize)),
        numbers::MUTEX_LOCK => Some(handlers::mutex_lock(mutexes, sched, arg1 as usize)),
        numbers::MUTEX_UNLOCK => Some(handlers::mutex_unlock(mutexes, sched, arg1 as usize)),
        numbers::SEM_INIT => Some(handlers::sem_init(semaphores, arg1 as i32)),
        numbers::SEM_DESTROY => Some(handlers::sem_destroy(semaphores, arg1 as usize)),
        numbers::SEM_WAIT => Some(handlers::sem_wait(semaphores, sched, arg1 as usize)),
        numbers::SEM_POST => Some(handlers::sem_post(semaphores, sched, arg1 as usize)),
        _ => panic!("invalid system call {:#x}", number),
    };

    if let Some(value) = result {
        // The caller may have been descheduled (a blocking lock or wait),
        // so write through its table entry rather than the active slot.
        if let Some(pcb) = sched.procs.get_mut(pid) {
            pcb.trapframe.set_return(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tty::TtyTable;
    use crate::scheduler::process::{Pid, ProcState, ProcType};

    struct Kernel {
        sched: Scheduler,
        mutexes: MutexPool,
        semaphores: SemaphorePool,
        ttys: TtyTable,
    }

    impl Kernel {
        /// Kernel state with idle plus one active worker process.
        fn boot() -> (Self, Pid) {
            let mut sched = Scheduler::new();
            sched.create_process(0x1000, "idle", ProcType::Kernel, 0).unwrap();
            sched.run();
            let worker = sched
                .create_process(0x2000, "worker", ProcType::User, 0)
                .unwrap();
            let mut kernel = Self {
                sched,
                mutexes: MutexPool::new(),
                semaphores: SemaphorePool::new(),
                ttys: TtyTable::new(),
            };
            kernel.make_active(worker);
            (kernel, worker)
        }

        fn make_active(&mut self, pid: Pid) {
            while self.sched.active_pid() != Some(pid) {
                self.sched.timer_tick();
                self.sched.run();
            }
        }

        /// Simulate a software interrupt from `pid`: load the registers
        /// into its parked frame and dispatch.
        fn syscall(&mut self, pid: Pid, number: u64, args: (u64, u64, u64)) -> i64 {
            {
                let frame = &mut self.sched.procs.get_mut(pid).unwrap().trapframe;
                frame.rax = number;
                frame.rbx = args.0;
                frame.rcx = args.1;
                frame.rdx = args.2;
            }
            dispatch(
                &mut self.sched,
                &mut self.mutexes,
                &mut self.semaphores,
                &mut self.ttys,
                42 * crate::scheduler::TICKS_PER_SECOND,
            );
            match self.sched.procs.get(pid) {
                Some(pcb) => pcb.trapframe.rax as i64,
                None => 0,
            }
        }
    }

    #[test]
    fn get_time_reports_seconds() {
        let (mut kernel, pid) = Kernel::boot();
        assert_eq!(kernel.syscall(pid, numbers::SYS_GET_TIME, (0, 0, 0)), 42);
    }

    #[test]
    fn get_names_copy_into_caller_buffers() {
        let (mut kernel, pid) = Kernel::boot();

        let mut os_name = [0xffu8; 64];
        let rc = kernel.syscall(pid, numbers::SYS_GET_NAME, (os_name.as_mut_ptr() as u64, 0, 0));
        assert_eq!(rc, 0);
        assert_eq!(&os_name[..OS_NAME.len()], OS_NAME.as_bytes());
        assert_eq!(os_name[OS_NAME.len()], 0);

        let mut proc_name = [0xffu8; 64];
        let rc = kernel.syscall(pid, numbers::PROC_GET_NAME, (proc_name.as_mut_ptr() as u64, 0, 0));
        assert_eq!(rc, 0);
        assert_eq!(&proc_name[..6], b"worker");
        assert_eq!(proc_name[6], 0);

        // A null buffer is rejected.
        assert_eq!(kernel.syscall(pid, numbers::SYS_GET_NAME, (0, 0, 0)), -1);
    }

    #[test]
    fn get_pid_returns_caller_pid() {
        let (mut kernel, pid) = Kernel::boot();
        assert_eq!(kernel.syscall(pid, numbers::PROC_GET_PID, (0, 0, 0)), pid as i64);
    }

    #[test]
    fn sleep_blocks_the_caller_and_returns_zero() {
        let (mut kernel, pid) = Kernel::boot();
        let rc = kernel.syscall(pid, numbers::PROC_SLEEP, (2, 0, 0));
        assert_eq!(rc, 0);
        let pcb = kernel.sched.procs.get(pid).unwrap();
        assert_eq!(pcb.state, ProcState::Sleeping);
        assert_eq!(pcb.sleep_time, 2 * crate::scheduler::TICKS_PER_SECOND);
        assert_eq!(kernel.sched.active_pid(), None);
    }

    #[test]
    fn exit_destroys_the_caller() {
        let (mut kernel, pid) = Kernel::boot();
        kernel.syscall(pid, numbers::PROC_EXIT, (0, 0, 0));
        assert!(kernel.sched.procs.get(pid).is_none());
        // The scheduler can still pick someone (idle) afterwards.
        kernel.sched.run();
        assert_eq!(kernel.sched.active_pid(), Some(0));
    }

    #[test]
    fn io_round_trip_through_a_terminal() {
        let (mut kernel, pid) = Kernel::boot();
        assert!(kernel.sched.procs.attach_tty(pid, 3));

        let msg = b"ferrite says hi";
        let rc = kernel.syscall(
            pid,
            numbers::IO_WRITE,
            (1, msg.as_ptr() as u64, msg.len() as u64),
        );
        assert_eq!(rc, msg.len() as i64);

        // The bytes sit in terminal 3's output ring.
        assert_eq!(kernel.ttys.tty(3).unwrap().io_output.len(), msg.len());

        // Type some input and read it back through slot 0.
        kernel.ttys.tty(3).unwrap().io_input.write_mem(b"ok");
        let mut buf = [0u8; 8];
        let rc = kernel.syscall(
            pid,
            numbers::IO_READ,
            (0, buf.as_mut_ptr() as u64, buf.len() as u64),
        );
        assert_eq!(rc, 2);
        assert_eq!(&buf[..2], b"ok");

        // Flush the output ring.
        assert_eq!(kernel.syscall(pid, numbers::IO_FLUSH, (1, 0, 0)), 0);
        assert!(kernel.ttys.tty(3).unwrap().io_output.is_empty());
    }

    #[test]
    fn io_on_unattached_slot_fails() {
        let (mut kernel, pid) = Kernel::boot();
        let mut buf = [0u8; 4];
        let rc = kernel.syscall(
            pid,
            numbers::IO_READ,
            (0, buf.as_mut_ptr() as u64, buf.len() as u64),
        );
        assert_eq!(rc, -1);
        // Out of range slot index.
        let rc = kernel.syscall(pid, numbers::IO_FLUSH, (9, 0, 0));
        assert_eq!(rc, -1);
    }

    #[test]
    fn mutex_calls_flow_through_dispatch() {
        let (mut kernel, pid) = Kernel::boot();
        let id = kernel.syscall(pid, numbers::MUTEX_INIT, (0, 0, 0));
        assert!(id >= 0);

        assert_eq!(kernel.syscall(pid, numbers::MUTEX_LOCK, (id as u64, 0, 0)), 1);
        // Destroying a held mutex fails.
        assert_eq!(kernel.syscall(pid, numbers::MUTEX_DESTROY, (id as u64, 0, 0)), -1);
        assert_eq!(kernel.syscall(pid, numbers::MUTEX_UNLOCK, (id as u64, 0, 0)), 0);
        assert_eq!(kernel.syscall(pid, numbers::MUTEX_DESTROY, (id as u64, 0, 0)), 0);
    }

    #[test]
    fn blocked_mutex_caller_gets_resume_value_in_its_frame() {
        let (mut kernel, a) = Kernel::boot();
        let b = kernel
            .sched
            .create_process(0x3000, "second", ProcType::User, 0)
            .unwrap();

        let id = kernel.syscall(a, numbers::MUTEX_INIT, (0, 0, 0)) as u64;
        assert_eq!(kernel.syscall(a, numbers::MUTEX_LOCK, (id, 0, 0)), 1);

        kernel.make_active(b);
        let rc = kernel.syscall(b, numbers::MUTEX_LOCK, (id, 0, 0));
        // B blocked, but its parked frame already carries the value it
        // will see when the handoff resumes it.
        assert_eq!(rc, 1);
        assert_eq!(kernel.sched.procs.get(b).unwrap().state, ProcState::Waiting);
    }

    #[test]
    fn semaphore_calls_flow_through_dispatch() {
        let (mut kernel, pid) = Kernel::boot();
        let id = kernel.syscall(pid, numbers::SEM_INIT, (2, 0, 0));
        assert!(id >= 0);
        assert_eq!(kernel.syscall(pid, numbers::SEM_WAIT, (id as u64, 0, 0)), 1);
        assert_eq!(kernel.syscall(pid, numbers::SEM_POST, (id as u64, 0, 0)), 2);
        assert_eq!(kernel.syscall(pid, numbers::SEM_DESTROY, (id as u64, 0, 0)), 0);
    }

    #[test]
    #[should_panic(expected = "invalid system call")]
    fn unknown_number_panics() {
        let (mut kernel, pid) = Kernel::boot();
        kernel.syscall(pid, 0xdead, (0, 0, 0));
    }
}
