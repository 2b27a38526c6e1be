/*
 * Programmable Interrupt Controller and Interval Timer
 *
 * Remaps the chained 8259 PICs away from the CPU exception range
 * (IRQ 0..15 become vectors 0x20..0x2f), manages per-IRQ masking, and
 * programs PIT channel 0 to the kernel tick rate.
 */

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

/// First vector of the primary PIC after remapping.
pub const PIC_1_OFFSET: u8 = 0x20;
/// First vector of the secondary PIC after remapping.
pub const PIC_2_OFFSET: u8 = 0x28;
/// One past the last PIC-routed vector.
const PIC_VECTOR_END: u8 = PIC_2_OFFSET + 8;

/// PIT channel 0 data port and mode/command register.
const PIT_CHANNEL_0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
/// PIT input clock in Hz.
const PIT_BASE_FREQUENCY: u32 = 1_193_182;

static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Remap the PICs and mask every IRQ line. Lines are unmasked one by one
/// as handlers are registered.
pub fn init() {
    let mut pics = PICS.lock();
    unsafe {
        pics.initialize();
        pics.write_masks(0xff, 0xff);
    }
    log::info!("pic: remapped to {:#04x}/{:#04x}, all lines masked", PIC_1_OFFSET, PIC_2_OFFSET);
}

/// Whether `vector` is delivered through the PICs.
pub fn is_pic_vector(vector: u8) -> bool {
    (PIC_1_OFFSET..PIC_VECTOR_END).contains(&vector)
}

/// Unmask the IRQ line behind `vector`.
pub fn irq_enable(vector: u8) {
    set_mask_bit(vector, false);
}

/// Mask the IRQ line behind `vector`.
pub fn irq_disable(vector: u8) {
    set_mask_bit(vector, true);
}

fn set_mask_bit(vector: u8, masked: bool) {
    if !is_pic_vector(vector) {
        log::error!("pic: vector {:#04x} is not PIC-routed", vector);
        return;
    }
    let irq = vector - PIC_1_OFFSET;
    let mut pics = PICS.lock();
    let masks = unsafe { pics.read_masks() };
    let (mut primary, mut secondary) = (masks[0], masks[1]);
    let (mask, bit) = if irq < 8 {
        (&mut primary, irq)
    } else {
        (&mut secondary, irq - 8)
    };
    if masked {
        *mask |= 1 << bit;
    } else {
        *mask &= !(1 << bit);
    }
    unsafe {
        pics.write_masks(primary, secondary);
    }
}

/// Acknowledge the interrupt so the PIC can deliver the next one.
pub fn end_of_interrupt(vector: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
}

/// Program PIT channel 0 as a rate generator at `frequency_hz`.
pub fn init_pit(frequency_hz: u32) {
    let divisor = (PIT_BASE_FREQUENCY / frequency_hz) as u16;
    log::info!("pit: {} Hz (divisor {})", frequency_hz, divisor);

    unsafe {
        let mut command = Port::<u8>::new(PIT_COMMAND);
        let mut channel0 = Port::<u8>::new(PIT_CHANNEL_0);

        // Channel 0, access mode lo/hi, mode 3 (square wave), binary.
        command.write(0x36);
        channel0.write((divisor & 0xff) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}
