/*
 * Interrupt Handling and the Common Kernel Entry
 *
 * Every vector this kernel services funnels through the same path:
 *
 * 1. A naked entry stub pushes the vector and the general purpose
 *    registers below the CPU-pushed interrupt frame, forming a TrapFrame
 *    on the interrupted context's stack.
 * 2. kernel_context_enter parks that frame on the active process control
 *    block, dispatches the handler registered for the vector, and runs the
 *    scheduler.
 * 3. The stub switches RSP to the chosen process's stored frame, pops the
 *    registers back, and resumes it with iretq.
 *
 * All of this executes with interrupts masked (the gates are interrupt
 * gates), so every structural mutation of kernel state happens within one
 * uninterruptible region.
 */

use spin::Mutex;

use super::idt;
use super::trapframe::TrapFrame;
use crate::drivers::system::pic;
use crate::scheduler;

/// Number of interrupt vectors.
pub const IRQ_MAX: usize = 256;

/// Hardware timer vector (PIC IRQ 0 after remap).
pub const IRQ_TIMER: u8 = 0x20;
/// PS/2 keyboard vector (PIC IRQ 1 after remap).
pub const IRQ_KEYBOARD: u8 = 0x21;
/// Software interrupt vector reserved for system calls.
pub const IRQ_SYSCALL: u8 = 0x80;

/// Low-level entry stub installed in the IDT for a vector.
pub type IsrEntry = unsafe extern "C" fn();

/// Registered handler functions, one per vector.
static IRQ_HANDLERS: Mutex<[Option<fn()>; IRQ_MAX]> = Mutex::new([None; IRQ_MAX]);

/// Initialize interrupt handling: reset the handler table and load the IDT.
pub fn init() {
    log::info!("interrupts: initializing");
    *IRQ_HANDLERS.lock() = [None; IRQ_MAX];
    idt::init();
}

/// Install the IDT entry and handler function for a vector.
///
/// `entry` is the naked stub the CPU jumps to; `handler` is the function
/// the common kernel entry dispatches to. PIC-routed vectors are unmasked
/// as part of registration.
pub fn irq_register(vector: u8, entry: IsrEntry, handler: fn()) {
    idt::set_gate(vector, entry as usize as u64);
    IRQ_HANDLERS.lock()[vector as usize] = Some(handler);

    if pic::is_pic_vector(vector) {
        pic::irq_enable(vector);
    }
    log::info!("interrupts: vector {:#04x} registered", vector);
}

/// Dispatch the handler registered for `vector`.
///
/// A vector with no registered handler means the IDT and the handler table
/// disagree, which is unrecoverable.
pub fn dispatch(vector: u8) {
    let handler = IRQ_HANDLERS.lock()[vector as usize];
    match handler {
        Some(handler) => handler(),
        None => panic!("no handler registered for vector {:#04x}", vector),
    }

    if pic::is_pic_vector(vector) {
        pic::end_of_interrupt(vector);
    }
}

/// Common kernel entry, called from every entry stub.
///
/// Returns the frame to resume, which the stub loads into RSP before
/// popping registers and executing iretq. The returned pointer refers to
/// the chosen process's parked frame and may belong to a different process
/// than the one that was interrupted.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_context_enter(frame_ptr: *mut TrapFrame) -> *const TrapFrame {
    let Some(frame) = (unsafe { frame_ptr.as_ref() }) else {
        panic!("kernel entry with no trap frame");
    };

    scheduler::park_active_frame(frame);
    dispatch(frame.vector as u8);
    scheduler::run();

    match scheduler::active_frame_ptr() {
        Some(next) => next,
        None => panic!("scheduler selected no process to run, not even idle"),
    }
}

/// Define a naked entry stub that materializes a TrapFrame and hands it to
/// kernel_context_enter. The zero pushed before the vector keeps the frame
/// layout uniform and the stack 16-byte aligned at the call.
macro_rules! isr_entry {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        pub unsafe extern "C" fn $name() {
            core::arch::naked_asm!(
                "push 0",
                "push {vector}",
                "push rax",
                "push rbx",
                "push rcx",
                "push rdx",
                "push rsi",
                "push rdi",
                "push rbp",
                "push r8",
                "push r9",
                "push r10",
                "push r11",
                "push r12",
                "push r13",
                "push r14",
                "push r15",
                // RSP now points at a complete TrapFrame.
                "mov rdi, rsp",
                "call {enter}",
                // Resume whichever frame the kernel selected.
                "mov rsp, rax",
                "pop r15",
                "pop r14",
                "pop r13",
                "pop r12",
                "pop r11",
                "pop r10",
                "pop r9",
                "pop r8",
                "pop rbp",
                "pop rdi",
                "pop rsi",
                "pop rdx",
                "pop rcx",
                "pop rbx",
                "pop rax",
                // Discard the vector and error code slots.
                "add rsp, 16",
                "iretq",
                vector = const $vector,
                enter = sym kernel_context_enter,
            )
        }
    };
}

isr_entry!(isr_entry_timer, 0x20u8);
isr_entry!(isr_entry_keyboard, 0x21u8);
isr_entry!(isr_entry_syscall, 0x80u8);

/// Enable interrupts on this CPU.
pub fn enable() {
    x86_64::instructions::interrupts::enable();
}

/// Disable interrupts on this CPU.
pub fn disable() {
    x86_64::instructions::interrupts::disable();
}

/// Whether interrupts are currently enabled.
pub fn are_enabled() -> bool {
    x86_64::instructions::interrupts::are_enabled()
}
