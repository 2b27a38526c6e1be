/*
 * Trap Frame
 *
 * Machine-state snapshot exchanged between a process and the kernel on
 * every interrupt. The layout matches exactly what the interrupt entry
 * stubs build on the stack:
 *
 * High Address  [SS]           <- pushed by CPU
 *               [RSP]          <- pushed by CPU
 *               [RFLAGS]       <- pushed by CPU
 *               [CS]           <- pushed by CPU
 *               [RIP]          <- pushed by CPU
 *               [error code]   <- pushed by the stub (alignment slot)
 *               [vector]       <- pushed by the stub
 *               [RAX]          <- pushed by the stub
 *               [...]
 * Low Address   [R15]          <- RSP after all pushes
 *
 * The system-call convention rides on this record: RAX carries the call
 * number in and the return value out, RBX/RCX/RDX carry up to three
 * arguments. No other channel exists between user code and the kernel.
 */

/// Kernel code segment selector, as installed by the boot environment.
pub const KERNEL_CS: u64 = 0x08;
/// Kernel data segment selector.
pub const KERNEL_SS: u64 = 0x10;
/// RFLAGS for a fresh process: reserved bit 1 set, interrupts enabled.
pub const RFLAGS_DEFAULT: u64 = 0x202;

/// Register snapshot saved on each kernel entry and restored on exit.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    // General purpose registers, pushed by the entry stub.
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    /// Interrupt vector that produced this frame.
    pub vector: u64,
    /// Error code slot; zero for the vectors this kernel handles.
    pub error_code: u64,

    // Interrupt frame, pushed automatically by the CPU.
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            vector: 0,
            error_code: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }

    /// Synthetic frame for a process that has never run: resuming it jumps
    /// to `entry` on an empty stack with interrupts enabled.
    pub fn new(entry: u64, stack_top: u64) -> Self {
        let mut frame = Self::zeroed();
        frame.rip = entry;
        frame.cs = KERNEL_CS;
        frame.rflags = RFLAGS_DEFAULT;
        frame.rsp = stack_top;
        frame.ss = KERNEL_SS;
        frame
    }

    /// System call number (accumulator on entry).
    pub fn syscall_number(&self) -> u64 {
        self.rax
    }

    /// Up to three system call arguments.
    pub fn syscall_args(&self) -> (u64, u64, u64) {
        (self.rbx, self.rcx, self.rdx)
    }

    /// Place a system call return value where the caller will see it.
    pub fn set_return(&mut self, value: i64) {
        self.rax = value as u64;
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_frame_is_resumable() {
        let frame = TrapFrame::new(0x1000, 0x8000);
        assert_eq!(frame.rip, 0x1000);
        assert_eq!(frame.rsp, 0x8000);
        assert_eq!(frame.cs, KERNEL_CS);
        assert_eq!(frame.ss, KERNEL_SS);
        // Interrupt flag must be set or the process could never be preempted.
        assert_ne!(frame.rflags & 0x200, 0);
    }

    #[test]
    fn syscall_registers_round_trip() {
        let mut frame = TrapFrame::zeroed();
        frame.rax = 7;
        frame.rbx = 1;
        frame.rcx = 2;
        frame.rdx = 3;
        assert_eq!(frame.syscall_number(), 7);
        assert_eq!(frame.syscall_args(), (1, 2, 3));

        frame.set_return(-1);
        assert_eq!(frame.rax, u64::MAX);
    }
}
