/*
 * Serial Console (COM1)
 *
 * Minimal 16550 driver backing the kernel logger. Output only; the data
 * travels to whatever the emulator or host attaches to COM1.
 */

use core::fmt::{self, Write};

use spin::Mutex;
use x86_64::instructions::port::Port;

/// COM1 base I/O port.
const COM1: u16 = 0x3f8;

struct SerialPort {
    data: Port<u8>,
    line_status: Port<u8>,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            line_status: Port::new(base + 5),
        }
    }

    /// Program 38400 baud, 8N1, FIFO enabled.
    fn init(&mut self) {
        let mut int_enable = Port::<u8>::new(COM1 + 1);
        let mut fifo_ctrl = Port::<u8>::new(COM1 + 2);
        let mut line_ctrl = Port::<u8>::new(COM1 + 3);
        let mut modem_ctrl = Port::<u8>::new(COM1 + 4);
        unsafe {
            int_enable.write(0x00);
            line_ctrl.write(0x80); // DLAB on
            self.data.write(0x03); // divisor low: 38400 baud
            int_enable.write(0x00); // divisor high
            line_ctrl.write(0x03); // 8 bits, no parity, one stop
            fifo_ctrl.write(0xc7);
            modem_ctrl.write(0x0b);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        unsafe {
            // Wait for the transmit holding register to empty.
            while self.line_status.read() & 0x20 == 0 {}
            self.data.write(byte);
        }
    }
}

impl Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

static SERIAL: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

pub fn init() {
    SERIAL.lock().init();
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // Serial output is best effort; a formatting error is not actionable.
    let _ = SERIAL.lock().write_fmt(args);
}
