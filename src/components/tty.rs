/*
 * Virtual Terminals
 *
 * Each terminal owns an 80x25 character grid with cursor and colors, plus
 * an input and an output ring buffer. Processes attached to a terminal see
 * those buffers through their I/O slots: the keyboard driver feeds the
 * input ring, and a periodic refresh drains the output ring into the grid
 * and repaints the visible terminal through the VGA device.
 *
 * Only one terminal is visible at a time; alt+digit switches.
 */

use spin::Mutex;

use crate::drivers::display::vga::{self, Color, VGA_HEIGHT, VGA_WIDTH};
use crate::utils::ring_buffer::RingBuffer;
use crate::utils::timer;

/// Number of virtual terminals.
pub const TTY_MAX: usize = 8;
pub const TTY_WIDTH: usize = VGA_WIDTH;
pub const TTY_HEIGHT: usize = VGA_HEIGHT;
/// Character grid cells per terminal.
pub const TTY_BUF_SIZE: usize = TTY_WIDTH * TTY_HEIGHT;
/// Capacity of each input/output ring buffer.
pub const TTY_IO_SIZE: usize = 1024;

/// Ticks between terminal refreshes.
const TTY_REFRESH_INTERVAL: u32 = 50;

/// Tab stops every four columns.
const TAB_WIDTH: usize = 4;

pub struct Tty {
    pub id: usize,
    /// Character grid; 0 renders as blank.
    buf: [u8; TTY_BUF_SIZE],
    pos_x: usize,
    pos_y: usize,
    color_fg: Color,
    color_bg: Color,
    /// Set whenever the grid changed since the last repaint.
    refresh: bool,
    /// Echo input characters onto the grid.
    pub echo: bool,
    /// Bytes typed at this terminal, read by the attached process.
    pub io_input: RingBuffer<TTY_IO_SIZE>,
    /// Bytes written by the attached process, drained to the grid.
    pub io_output: RingBuffer<TTY_IO_SIZE>,
}

impl Tty {
    fn new(id: usize) -> Self {
        Self {
            id,
            buf: [0; TTY_BUF_SIZE],
            pos_x: 0,
            pos_y: 0,
            color_fg: Color::LightGrey,
            color_bg: Color::Black,
            refresh: false,
            echo: true,
            io_input: RingBuffer::new(),
            io_output: RingBuffer::new(),
        }
    }

    /// Advance the grid by one character, handling control characters,
    /// line wrap and scrolling.
    pub fn putc(&mut self, ch: u8) {
        match ch {
            b'\x08' => {
                if self.pos_x > 0 {
                    self.pos_x -= 1;
                } else if self.pos_y > 0 {
                    self.pos_y -= 1;
                    self.pos_x = TTY_WIDTH - 1;
                }
                self.buf[self.pos_y * TTY_WIDTH + self.pos_x] = b' ';
            }
            b'\t' => {
                self.pos_x += TAB_WIDTH - self.pos_x % TAB_WIDTH;
            }
            b'\r' => {
                self.pos_x = 0;
            }
            b'\n' => {
                self.pos_x = 0;
                self.pos_y += 1;
            }
            _ => {
                self.buf[self.pos_y * TTY_WIDTH + self.pos_x] = ch;
                self.pos_x += 1;
            }
        }

        if self.pos_x >= TTY_WIDTH {
            self.pos_x = 0;
            self.pos_y += 1;
        }

        if self.pos_y >= TTY_HEIGHT {
            // Scroll up one line and blank the last row.
            self.buf.copy_within(TTY_WIDTH.., 0);
            self.buf[(TTY_HEIGHT - 1) * TTY_WIDTH..].fill(0);
            self.pos_y = TTY_HEIGHT - 1;
        }

        self.refresh = true;
    }

    /// Grid cell contents (0 for never-written cells).
    pub fn char_at(&self, x: usize, y: usize) -> u8 {
        self.buf[y * TTY_WIDTH + x]
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.pos_x, self.pos_y)
    }
}

/// All terminals plus the visible selection.
pub struct TtyTable {
    ttys: [Tty; TTY_MAX],
    active: usize,
}

impl TtyTable {
    pub fn new() -> Self {
        Self {
            ttys: core::array::from_fn(Tty::new),
            active: 0,
        }
    }

    pub fn active_id(&self) -> usize {
        self.active
    }

    pub fn tty(&mut self, n: usize) -> Option<&mut Tty> {
        self.ttys.get_mut(n)
    }

    pub fn active_tty(&mut self) -> &mut Tty {
        &mut self.ttys[self.active]
    }

    /// Make terminal `n` visible and schedule a repaint.
    pub fn select(&mut self, n: usize) -> bool {
        if n >= TTY_MAX {
            log::error!("tty: invalid terminal number {}", n);
            return false;
        }
        self.active = n;
        self.ttys[n].refresh = true;
        log::info!("tty: terminal {} selected", n);
        true
    }

    /// Feed one typed byte into the visible terminal.
    pub fn input_char(&mut self, ch: u8) {
        let tty = self.active_tty();
        if !tty.io_input.write_byte(ch) {
            log::warn!("tty {}: input buffer full, dropping byte", tty.id);
        }
        if tty.echo {
            tty.putc(ch);
        }
    }

    /// Drain every terminal's output ring into its grid.
    pub fn pump(&mut self) {
        for tty in self.ttys.iter_mut() {
            while let Some(ch) = tty.io_output.read_byte() {
                tty.putc(ch);
            }
        }
    }

    /// Repaint the visible terminal if it changed. `put` receives
    /// (x, y, fg, bg, character).
    pub fn render(&mut self, put: &mut dyn FnMut(usize, usize, Color, Color, u8)) {
        let tty = &mut self.ttys[self.active];
        if !tty.refresh {
            return;
        }
        for y in 0..TTY_HEIGHT {
            for x in 0..TTY_WIDTH {
                let ch = tty.buf[y * TTY_WIDTH + x];
                let ch = if ch == 0 { b' ' } else { ch };
                put(x, y, tty.color_fg, tty.color_bg, ch);
            }
        }
        tty.refresh = false;
    }
}

impl Default for TtyTable {
    fn default() -> Self {
        Self::new()
    }
}

static TTYS: Mutex<Option<TtyTable>> = Mutex::new(None);

/// Initialize the terminal table and register the refresh timer.
pub fn init() {
    log::info!("tty: initializing {} terminals", TTY_MAX);
    *TTYS.lock() = Some(TtyTable::new());
    timer::callback_register(tty_refresh, TTY_REFRESH_INTERVAL, -1);
}

/// Run `f` with the terminal table. Panics before init.
pub fn with_ttys<R>(f: impl FnOnce(&mut TtyTable) -> R) -> R {
    let mut guard = TTYS.lock();
    let ttys = guard.as_mut().expect("tty table not initialized");
    f(ttys)
}

/// Switch the visible terminal.
pub fn select(n: usize) {
    with_ttys(|ttys| {
        ttys.select(n);
    });
}

/// Keyboard driver entry point for decoded characters.
pub fn input_char(ch: u8) {
    with_ttys(|ttys| ttys.input_char(ch));
}

/// Periodic refresh: drain output rings, repaint the visible grid, place
/// the hardware cursor.
fn tty_refresh() {
    with_ttys(|ttys| {
        ttys.pump();
        ttys.render(&mut vga::put_at);
        if vga::cursor_enabled() {
            let (x, y) = ttys.active_tty().cursor();
            vga::cursor_set(x, y);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn putc_advances_and_wraps() {
        let mut table = TtyTable::new();
        let tty = table.tty(0).unwrap();

        for ch in b"ab" {
            tty.putc(*ch);
        }
        assert_eq!(tty.char_at(0, 0), b'a');
        assert_eq!(tty.char_at(1, 0), b'b');
        assert_eq!(tty.cursor(), (2, 0));

        tty.putc(b'\n');
        assert_eq!(tty.cursor(), (0, 1));

        // Fill the rest of the line; cursor wraps to the next row.
        for _ in 0..TTY_WIDTH {
            tty.putc(b'x');
        }
        assert_eq!(tty.cursor(), (0, 2));
    }

    #[test]
    fn backspace_blanks_previous_cell() {
        let mut table = TtyTable::new();
        let tty = table.tty(0).unwrap();
        tty.putc(b'q');
        tty.putc(b'\x08');
        assert_eq!(tty.char_at(0, 0), b' ');
        assert_eq!(tty.cursor(), (0, 0));
    }

    #[test]
    fn tab_moves_to_next_stop() {
        let mut table = TtyTable::new();
        let tty = table.tty(0).unwrap();
        tty.putc(b'a');
        tty.putc(b'\t');
        assert_eq!(tty.cursor(), (4, 0));
    }

    #[test]
    fn scrolling_discards_top_row() {
        let mut table = TtyTable::new();
        let tty = table.tty(0).unwrap();
        tty.putc(b'A');
        for _ in 0..TTY_HEIGHT {
            tty.putc(b'\n');
        }
        // 'A' scrolled off; cursor pinned to the last row.
        assert_eq!(tty.char_at(0, 0), 0);
        assert_eq!(tty.cursor().1, TTY_HEIGHT - 1);
    }

    #[test]
    fn input_echoes_and_buffers() {
        let mut table = TtyTable::new();
        table.input_char(b'z');
        let tty = table.active_tty();
        assert_eq!(tty.io_input.read_byte(), Some(b'z'));
        assert_eq!(tty.char_at(0, 0), b'z');

        // With echo off the grid stays untouched.
        let tty = table.tty(0).unwrap();
        tty.echo = false;
        table.input_char(b'q');
        let tty = table.active_tty();
        assert_eq!(tty.io_input.read_byte(), Some(b'q'));
        assert_eq!(tty.char_at(1, 0), 0);
    }

    #[test]
    fn pump_drains_output_rings() {
        let mut table = TtyTable::new();
        table.tty(2).unwrap().io_output.write_mem(b"hi");
        table.pump();
        let tty = table.tty(2).unwrap();
        assert!(tty.io_output.is_empty());
        assert_eq!(tty.char_at(0, 0), b'h');
        assert_eq!(tty.char_at(1, 0), b'i');
    }

    #[test]
    fn render_repaints_only_when_dirty() {
        let mut table = TtyTable::new();
        table.active_tty().putc(b'r');

        let mut painted = 0;
        table.render(&mut |_, _, _, _, _| painted += 1);
        assert_eq!(painted, TTY_BUF_SIZE);

        // Clean grid: nothing repainted.
        painted = 0;
        table.render(&mut |_, _, _, _, _| painted += 1);
        assert_eq!(painted, 0);
    }

    #[test]
    fn select_rejects_out_of_range() {
        let mut table = TtyTable::new();
        assert!(table.select(TTY_MAX - 1));
        assert!(!table.select(TTY_MAX));
        assert_eq!(table.active_id(), TTY_MAX - 1);
    }
}
