/*
 * Interrupt Descriptor Table
 *
 * Owns the IDT and exposes gate installation by raw stub address. All
 * vectors route through the naked entry stubs in the interrupts module, so
 * entries carry plain code addresses rather than typed handler functions.
 * Gates default to interrupt gates, which mask interrupts for the whole
 * kernel entry.
 */

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::VirtAddr;
use x86_64::structures::idt::InterruptDescriptorTable;

lazy_static! {
    static ref IDT: Mutex<InterruptDescriptorTable> = Mutex::new(InterruptDescriptorTable::new());
}

/// Load the (initially empty) table. Gates installed later take effect
/// immediately because the CPU reads the live table.
pub fn init() {
    let idt = IDT.lock();
    unsafe {
        idt.load_unsafe();
    }
    log::info!("idt: loaded");
}

/// Point `vector` at the entry stub at `addr`.
pub fn set_gate(vector: u8, addr: u64) {
    let mut idt = IDT.lock();
    unsafe {
        idt[vector].set_handler_addr(VirtAddr::new(addr));
    }
    log::debug!("idt: vector {:#04x} gate set", vector);
}
