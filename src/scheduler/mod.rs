/*
 * Round-Robin Scheduler
 *
 * Preemptive round robin over the process table. The scheduler keeps two
 * pid lists (run queue and sleep queue) plus the single active process,
 * and is driven from two places:
 *
 * - a timer callback, once per tick, charges the active process and walks
 *   the sleep queue
 * - the common kernel entry calls run() after every interrupt to enforce
 *   the timeslice and refill the active slot
 *
 * A process that exhausts its timeslice goes to the tail of the run queue,
 * so rotation is strictly FIFO. When the run queue is empty the idle
 * process (pid 0) is selected; it never sits in the run queue itself.
 *
 * Everything here runs with interrupts masked (interrupt-gate semantics of
 * the kernel entry), so there is exactly one kernel context mutating these
 * structures at a time.
 */

pub mod process;

use spin::Mutex;

use crate::arch::x86_64::trapframe::TrapFrame;
use crate::utils::timer;
use process::{Pcb, Pid, ProcState, ProcType, ProcessTable, PROC_MAX};

/// Ticks a process may stay Active before being rotated out.
pub const TIMESLICE: u32 = 20;
/// Timer ticks per second (PIT programming matches this).
pub const TICKS_PER_SECOND: u32 = 100;

/// Scheduler state: the process table it owns, the two pid lists, and the
/// currently active process.
pub struct Scheduler {
    pub procs: ProcessTable,
    run_queue: IdQueue,
    sleep_queue: IdQueue,
    active: Option<Pid>,
}

type IdQueue = crate::utils::queue::IdQueue<PROC_MAX>;

impl Scheduler {
    pub fn new() -> Self {
        Self {
            procs: ProcessTable::new(),
            run_queue: IdQueue::new(),
            sleep_queue: IdQueue::new(),
            active: None,
        }
    }

    pub fn active_pid(&self) -> Option<Pid> {
        self.active
    }

    pub fn active_pcb(&mut self) -> Option<&mut Pcb> {
        let pid = self.active?;
        self.procs.get_mut(pid)
    }

    /// Create a process and schedule it.
    pub fn create_process(
        &mut self,
        entry_point: u64,
        name: &str,
        kind: ProcType,
        now: u32,
    ) -> Option<Pid> {
        let pid = self.procs.create(entry_point, name, kind, now)?;
        self.add(pid);
        Some(pid)
    }

    /// Put a process on the run queue. Precondition: it is on no scheduler
    /// list.
    pub fn add(&mut self, pid: Pid) {
        if let Some(pcb) = self.procs.get_mut(pid) {
            pcb.state = ProcState::Idle;
            self.run_queue.enqueue(pid as usize);
        } else {
            log::error!("scheduler: cannot add unknown pid {}", pid);
        }
    }

    /// Detach a process from both scheduler lists; if it is the active
    /// process, clear the active slot so run() selects someone else.
    pub fn remove(&mut self, pid: Pid) {
        self.run_queue.remove(pid as usize);
        self.sleep_queue.remove(pid as usize);
        if self.active == Some(pid) {
            self.active = None;
        }
    }

    /// Put a process to sleep for `seconds`.
    pub fn sleep(&mut self, pid: Pid, seconds: u32) {
        let Some(pcb) = self.procs.get_mut(pid) else {
            log::error!("scheduler: cannot sleep unknown pid {}", pid);
            return;
        };
        pcb.sleep_time = seconds.saturating_mul(TICKS_PER_SECOND);
        pcb.state = ProcState::Sleeping;

        if self.run_queue.remove(pid as usize) {
            self.sleep_queue.enqueue(pid as usize);
        } else if self.active == Some(pid) {
            // An active process cannot be asleep.
            self.active = None;
            self.sleep_queue.enqueue(pid as usize);
        } else if self.sleep_queue.contains(pid as usize) {
            // Already sleeping; the new sleep time stands.
        } else {
            log::error!("scheduler: pid {} asked to sleep but is not scheduled", pid);
        }
    }

    /// Per-tick accounting: charge the active process and age the sleep
    /// queue, waking processes whose time has elapsed. The queue is
    /// drained and reinserted in one pass, preserving order.
    pub fn timer_tick(&mut self) {
        if let Some(pcb) = self.active_pcb() {
            pcb.run_time += 1;
            pcb.cpu_time += 1;
        }

        for _ in 0..self.sleep_queue.len() {
            let Some(pid) = self.sleep_queue.dequeue() else {
                break;
            };
            let pid = pid as Pid;
            let Some(pcb) = self.procs.get_mut(pid) else {
                log::error!("scheduler: sleeping pid {} no longer exists", pid);
                continue;
            };
            pcb.sleep_time = pcb.sleep_time.saturating_sub(1);
            if pcb.sleep_time == 0 {
                log::info!("pid {} finished sleeping", pid);
                pcb.state = ProcState::Idle;
                self.run_queue.enqueue(pid as usize);
            } else {
                self.sleep_queue.enqueue(pid as usize);
            }
        }
    }

    /// Select the process to resume. Called after every interrupt.
    ///
    /// Panics if the selected pid has vanished from the process table;
    /// that means the table and the queues disagree and nothing can be
    /// trusted anymore.
    pub fn run(&mut self) {
        if let Some(pid) = self.active {
            let pcb = self
                .procs
                .get_mut(pid)
                .expect("active process missing from table");
            if pcb.cpu_time >= TIMESLICE {
                pcb.cpu_time = 0;
                pcb.state = ProcState::Idle;
                // The idle process never waits in the run queue.
                if pid != 0 {
                    self.run_queue.enqueue(pid as usize);
                }
                self.active = None;
            }
        }

        if self.active.is_none() {
            // Next runnable process, or the idle process when none exists.
            let next = self.run_queue.dequeue().map(|pid| pid as Pid).unwrap_or(0);
            if self.procs.get(next).is_none() {
                panic!("scheduler selected pid {} which does not exist", next);
            }
            self.active = Some(next);
        }

        let pcb = self
            .active_pcb()
            .expect("active process missing from table");
        pcb.state = ProcState::Active;
    }

    /// Destroy a process: detach it from the scheduler and free its slot.
    /// Destroying the idle process is refused.
    pub fn destroy(&mut self, pid: Pid) -> bool {
        if pid == 0 {
            log::error!("refusing to destroy the idle process");
            return false;
        }
        if self.procs.get(pid).is_none() {
            log::error!("cannot destroy unknown pid {}", pid);
            return false;
        }
        self.remove(pid);
        self.procs.release(pid)
    }

    /// Save the incoming trap frame on the active process, if any.
    pub fn park_active_frame(&mut self, frame: &TrapFrame) {
        if let Some(pcb) = self.active_pcb() {
            pcb.trapframe = *frame;
        }
    }

    /// Frame to resume when leaving the kernel.
    pub fn active_frame_ptr(&mut self) -> Option<*const TrapFrame> {
        self.active_pcb().map(|pcb| &pcb.trapframe as *const TrapFrame)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// Initialize scheduling: create the scheduler, hook the per-tick
/// callback, create the idle process, and select it so the very first
/// interrupt has a context to park.
pub fn init() {
    log::info!("scheduler: initializing");
    *SCHEDULER.lock() = Some(Scheduler::new());
    timer::callback_register(scheduler_timer, 1, -1);

    spawn(process::idle_entry, "idle", ProcType::Kernel);
    run();
}

/// Run `f` with the scheduler. Panics before init.
pub fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.lock();
    let sched = guard.as_mut().expect("scheduler not initialized");
    f(sched)
}

/// Per-tick timer callback.
fn scheduler_timer() {
    with(|sched| sched.timer_tick());
}

/// Create a kernel-resident process around `entry`.
pub fn spawn(entry: fn(), name: &str, kind: ProcType) -> Option<Pid> {
    let now = timer::get_ticks();
    with(|sched| sched.create_process(entry as usize as u64, name, kind, now))
}

pub fn run() {
    with(|sched| sched.run());
}

pub fn park_active_frame(frame: &TrapFrame) {
    with(|sched| sched.park_active_frame(frame));
}

pub fn active_frame_ptr() -> Option<*const TrapFrame> {
    with(|sched| sched.active_frame_ptr())
}

pub fn attach_tty(pid: Pid, tty: usize) -> bool {
    with(|sched| sched.procs.attach_tty(pid, tty))
}
