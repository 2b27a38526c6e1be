/*
 * Power and Debug Control
 *
 * Breakpoint and shutdown hooks used by the panic path and the keyboard
 * debug chords. Shutdown goes through the QEMU isa-debug-exit device; on
 * real hardware the write is ignored and we fall back to halting.
 */

use x86_64::instructions::port::Port;

/// QEMU isa-debug-exit I/O port.
const DEBUG_EXIT_PORT: u16 = 0xf4;

/// Trigger a breakpoint (only meaningful when running under a debugger).
pub fn breakpoint() {
    unsafe {
        core::arch::asm!("int3");
    }
}

/// Leave the kernel: request an emulator exit, then halt forever.
pub fn exit() -> ! {
    log::info!("exiting kernel");
    unsafe {
        Port::<u32>::new(DEBUG_EXIT_PORT).write(0);
    }
    halt_loop()
}

/// Halt the CPU until the next interrupt, forever.
pub fn halt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
