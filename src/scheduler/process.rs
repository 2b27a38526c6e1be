/*
 * Process Control Blocks and the Process Table
 *
 * All process state lives in a fixed table of PROC_MAX slots. Slots are
 * handed out by a pre-filled allocator queue (first fit); pids are
 * monotonically assigned and never reused within a boot. Pid 0 is the idle
 * process, created first and never destroyed.
 *
 * Process stacks are a separate static array so the table itself stays
 * small. A slot's stack is bound by index; the PCB stores the machine
 * state snapshot (trap frame) by value, and a fresh process gets a
 * synthetic frame whose instruction pointer is its entry function and
 * whose stack pointer is the top of its stack slot.
 */

use heapless::String;

use crate::arch::x86_64::trapframe::TrapFrame;
use crate::utils::queue::IdQueue;

/// Maximum number of processes.
pub const PROC_MAX: usize = 20;
/// Per-process stack bytes.
pub const PROC_STACK_SIZE: usize = 8192;
/// I/O slots per process.
pub const PROC_IO_MAX: usize = 4;
/// Maximum process name length.
pub const PROC_NAME_LEN: usize = 31;

/// Conventional I/O slot indices.
pub const PROC_IO_IN: usize = 0;
pub const PROC_IO_OUT: usize = 1;

pub type Pid = u32;

/// Process life cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Slot is free.
    None,
    /// Runnable, waiting in the run queue.
    Idle,
    /// Currently owning the CPU.
    Active,
    /// Waiting for its sleep time to elapse.
    Sleeping,
    /// Blocked on a mutex or semaphore.
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcType {
    Kernel,
    User,
}

/// Non-owning reference from a process I/O slot to a terminal buffer. The
/// terminal owns the underlying ring buffer for the kernel's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoHandle {
    TtyInput(usize),
    TtyOutput(usize),
}

/// Everything the kernel knows about one process.
pub struct Pcb {
    pub pid: Pid,
    pub state: ProcState,
    pub kind: ProcType,
    pub name: String<PROC_NAME_LEN>,
    /// Tick count at creation.
    pub start_time: u32,
    /// Total ticks spent Active.
    pub run_time: u32,
    /// Ticks accumulated in the current timeslice.
    pub cpu_time: u32,
    /// Ticks remaining until wake; meaningful only while Sleeping.
    pub sleep_time: u32,
    pub io: [Option<IoHandle>; PROC_IO_MAX],
    /// Machine state between kernel entries.
    pub trapframe: TrapFrame,
}

impl Pcb {
    const fn empty() -> Self {
        Self {
            pid: 0,
            state: ProcState::None,
            kind: ProcType::Kernel,
            name: String::new(),
            start_time: 0,
            run_time: 0,
            cpu_time: 0,
            sleep_time: 0,
            io: [None; PROC_IO_MAX],
            trapframe: TrapFrame::zeroed(),
        }
    }

    fn reset(&mut self) {
        *self = Self::empty();
    }
}

/// Process stacks, one fixed slab per table slot. Only resumed processes
/// ever touch this memory; the kernel reads nothing back from it.
#[repr(C, align(16))]
struct ProcStacks([[u8; PROC_STACK_SIZE]; PROC_MAX]);

static mut PROC_STACKS: ProcStacks = ProcStacks([[0; PROC_STACK_SIZE]; PROC_MAX]);

/// 16-byte aligned top of the stack slab for a table entry.
fn stack_top(entry: usize) -> u64 {
    let base = (&raw const PROC_STACKS) as u64;
    (base + ((entry as u64) + 1) * PROC_STACK_SIZE as u64) & !0xf
}

/// The process table plus its slot allocator.
pub struct ProcessTable {
    slots: [Pcb; PROC_MAX],
    allocator: IdQueue<PROC_MAX>,
    next_pid: Pid,
}

impl ProcessTable {
    pub fn new() -> Self {
        let mut allocator = IdQueue::new();
        for entry in 0..PROC_MAX {
            allocator.enqueue(entry);
        }
        Self {
            slots: [const { Pcb::empty() }; PROC_MAX],
            allocator,
            next_pid: 0,
        }
    }

    /// Allocate a slot and initialize a process around `entry_point`.
    /// The caller is responsible for scheduling it. Returns the new pid,
    /// or None when the table is full.
    pub fn create(
        &mut self,
        entry_point: u64,
        name: &str,
        kind: ProcType,
        now: u32,
    ) -> Option<Pid> {
        let Some(entry) = self.allocator.dequeue() else {
            log::error!("process table full, cannot create '{}'", name);
            return None;
        };

        let pid = self.next_pid;
        self.next_pid += 1;

        let pcb = &mut self.slots[entry];
        pcb.reset();
        pcb.pid = pid;
        pcb.state = ProcState::Idle;
        pcb.kind = kind;
        pcb.start_time = now;
        for ch in name.chars() {
            if pcb.name.push(ch).is_err() {
                break;
            }
        }
        pcb.trapframe = TrapFrame::new(entry_point, stack_top(entry));

        log::info!("created process {} ({}) entry={}", pcb.name, pid, entry);
        Some(pid)
    }

    /// Zero a PCB and hand its slot back to the allocator. The process
    /// must already be detached from all scheduler lists.
    pub fn release(&mut self, pid: Pid) -> bool {
        let Some(entry) = self.pid_to_entry(pid) else {
            log::error!("release of unknown pid {}", pid);
            return false;
        };
        self.slots[entry].reset();
        self.allocator.enqueue(entry)
    }

    /// Table index for a live pid.
    pub fn pid_to_entry(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|pcb| pcb.pid == pid && pcb.state != ProcState::None)
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.slots
            .iter()
            .find(|pcb| pcb.pid == pid && pcb.state != ProcState::None)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.slots
            .iter_mut()
            .find(|pcb| pcb.pid == pid && pcb.state != ProcState::None)
    }

    /// Wire a process's stdin/stdout slots to a terminal's buffers.
    pub fn attach_tty(&mut self, pid: Pid, tty: usize) -> bool {
        if tty >= crate::components::tty::TTY_MAX {
            log::error!("cannot attach pid {} to invalid terminal {}", pid, tty);
            return false;
        }
        let Some(pcb) = self.get_mut(pid) else {
            log::error!("cannot attach unknown pid {} to terminal {}", pid, tty);
            return false;
        };
        log::debug!("attaching pid {} to terminal {}", pid, tty);
        pcb.io[PROC_IO_IN] = Some(IoHandle::TtyInput(tty));
        pcb.io[PROC_IO_OUT] = Some(IoHandle::TtyOutput(tty));
        true
    }

    /// Number of occupied slots.
    pub fn used_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|pcb| pcb.state != ProcState::None)
            .count()
    }

    /// Number of slots still in the allocator.
    pub fn free_slots(&self) -> usize {
        self.allocator.len()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the idle process. The boot context becomes this process at the
/// first interrupt, so the loop here mostly documents the behavior: keep
/// interrupts on and halt until something happens.
pub fn idle_entry() {
    loop {
        x86_64::instructions::interrupts::enable();
        x86_64::instructions::hlt();
    }
}
