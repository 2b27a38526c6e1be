/*
 * VGA Text Mode Device
 *
 * Narrow interface over the 80x25 text buffer at 0xb8000: cell writes,
 * screen clear, and hardware cursor control. The terminal layer owns all
 * policy (cursor position, colors, scrolling); this module only touches
 * the hardware.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::port::Port;

pub const VGA_WIDTH: usize = 80;
pub const VGA_HEIGHT: usize = 25;

/// Memory-mapped text buffer base.
const VGA_BASE: usize = 0xb8000;

/// CRT controller index and data ports (cursor control).
const CRTC_INDEX: u16 = 0x3d4;
const CRTC_DATA: u16 = 0x3d5;

/// Standard 16-color VGA palette.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

static CURSOR_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn init() {
    clear();
    cursor_enable();
    log::info!("vga: initialized");
}

/// Write one character cell. Out-of-range coordinates are ignored.
pub fn put_at(x: usize, y: usize, fg: Color, bg: Color, ch: u8) {
    if x >= VGA_WIDTH || y >= VGA_HEIGHT {
        return;
    }
    let attr = ((bg as u16) << 4 | (fg as u16)) << 8;
    let cell = (VGA_BASE as *mut u16).wrapping_add(y * VGA_WIDTH + x);
    unsafe {
        core::ptr::write_volatile(cell, attr | ch as u16);
    }
}

/// Blank the whole screen.
pub fn clear() {
    for y in 0..VGA_HEIGHT {
        for x in 0..VGA_WIDTH {
            put_at(x, y, Color::LightGrey, Color::Black, b' ');
        }
    }
}

/// Move the hardware cursor to (x, y).
pub fn cursor_set(x: usize, y: usize) {
    let pos = (y * VGA_WIDTH + x) as u16;
    let mut index = Port::<u8>::new(CRTC_INDEX);
    let mut data = Port::<u8>::new(CRTC_DATA);
    unsafe {
        index.write(0x0f);
        data.write((pos & 0xff) as u8);
        index.write(0x0e);
        data.write((pos >> 8) as u8);
    }
}

/// Show the hardware cursor (scanlines 14..15, the classic underline).
pub fn cursor_enable() {
    let mut index = Port::<u8>::new(CRTC_INDEX);
    let mut data = Port::<u8>::new(CRTC_DATA);
    unsafe {
        index.write(0x0a);
        data.write(14);
        index.write(0x0b);
        data.write(15);
    }
    CURSOR_ENABLED.store(true, Ordering::SeqCst);
}

/// Hide the hardware cursor.
pub fn cursor_disable() {
    let mut index = Port::<u8>::new(CRTC_INDEX);
    let mut data = Port::<u8>::new(CRTC_DATA);
    unsafe {
        index.write(0x0a);
        data.write(0x20);
    }
    CURSOR_ENABLED.store(false, Ordering::SeqCst);
}

pub fn cursor_enabled() -> bool {
    CURSOR_ENABLED.load(Ordering::SeqCst)
}
