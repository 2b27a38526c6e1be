/*
 * PS/2 Keyboard Driver
 *
 * Decodes scan codes with the pc_keyboard crate, tracks modifier state,
 * and routes the result:
 *
 * - plain characters go to the active terminal's input buffer
 * - ctrl chords drive kernel debug actions (panic test, breakpoint,
 *   screen clear, cursor toggle, log level, triple-escape exit)
 * - alt+digit selects the virtual terminal with that number
 */

use bitflags::bitflags;
use pc_keyboard::{DecodedKey, HandleControl, KeyCode, KeyEvent, KeyState, Keyboard, ScancodeSet1, layouts};
use spin::Mutex;
use x86_64::instructions::port::Port;

use crate::arch::x86_64::interrupts;
use crate::components::tty;
use crate::drivers::display::vga;
use crate::utils::{logger, power};

/// PS/2 controller data port.
const KBD_PORT_DATA: u16 = 0x60;

/// Presses of ctrl+escape in a row that exit the kernel.
const EXIT_PRESSES: u32 = 3;

bitflags! {
    /// Currently held (or latched, for caps lock) modifier keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL  = 1 << 1;
        const ALT   = 1 << 2;
        const CAPS  = 1 << 3;
    }
}

struct KeyboardState {
    decoder: Keyboard<layouts::Us104Key, ScancodeSet1>,
    modifiers: Modifiers,
    /// Consecutive ctrl+escape presses towards an exit request.
    escape_presses: u32,
}

static KEYBOARD: Mutex<Option<KeyboardState>> = Mutex::new(None);

/// Initialize the decoder state and hook the keyboard interrupt.
pub fn init() {
    log::info!("keyboard: initializing");
    *KEYBOARD.lock() = Some(KeyboardState {
        decoder: Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore),
        modifiers: Modifiers::empty(),
        escape_presses: 0,
    });
    interrupts::irq_register(
        interrupts::IRQ_KEYBOARD,
        interrupts::isr_entry_keyboard,
        keyboard_irq_handler,
    );
}

/// Keyboard IRQ handler: read one scan code, decode, route.
fn keyboard_irq_handler() {
    let scancode = unsafe { Port::<u8>::new(KBD_PORT_DATA).read() };

    let mut guard = KEYBOARD.lock();
    let Some(state) = guard.as_mut() else {
        return;
    };

    let Ok(Some(event)) = state.decoder.add_byte(scancode) else {
        return;
    };
    state.track_modifiers(&event);

    let Some(DecodedKey::Unicode(ch)) = state.decoder.process_keyevent(event) else {
        return;
    };
    let modifiers = state.modifiers;
    let escape_presses = state.escape_presses;
    // The chord handlers take other kernel locks; release ours first.
    drop(guard);

    route_key(ch, modifiers, escape_presses);
}

impl KeyboardState {
    fn track_modifiers(&mut self, event: &KeyEvent) {
        let held = match event.state {
            KeyState::Down | KeyState::SingleShot => true,
            KeyState::Up => false,
        };
        match event.code {
            KeyCode::LShift | KeyCode::RShift => self.modifiers.set(Modifiers::SHIFT, held),
            KeyCode::LControl | KeyCode::RControl => self.modifiers.set(Modifiers::CTRL, held),
            KeyCode::LAlt | KeyCode::RAltGr => self.modifiers.set(Modifiers::ALT, held),
            KeyCode::CapsLock => {
                if held {
                    self.modifiers.toggle(Modifiers::CAPS);
                }
            }
            _ => {}
        }
    }
}

fn route_key(ch: char, modifiers: Modifiers, escape_presses: u32) {
    if modifiers.contains(Modifiers::CTRL) {
        ctrl_command(ch, escape_presses);
        return;
    }
    if modifiers.contains(Modifiers::ALT) {
        alt_command(ch);
        return;
    }
    if ch.is_ascii() {
        tty::input_char(ch as u8);
    }
}

fn set_escape_presses(count: u32) {
    if let Some(state) = KEYBOARD.lock().as_mut() {
        state.escape_presses = count;
    }
}

/// Kernel debug chords on the ctrl key.
fn ctrl_command(ch: char, escape_presses: u32) {
    match ch {
        'p' | 'P' => panic!("test panic"),
        'b' | 'B' => power::breakpoint(),
        'k' | 'K' => vga::clear(),
        'c' | 'C' => {
            if vga::cursor_enabled() {
                vga::cursor_disable();
            } else {
                vga::cursor_enable();
            }
        }
        '+' => {
            logger::raise_level();
        }
        '-' => {
            logger::lower_level();
        }
        '=' | '\u{1b}' => {
            log::trace!("keyboard: kernel escape pressed");
            let presses = escape_presses + 1;
            if presses >= EXIT_PRESSES {
                power::exit();
            }
            set_escape_presses(presses);
        }
        _ => {
            if escape_presses != 0 {
                log::trace!("keyboard: kernel escape reset");
                set_escape_presses(0);
            }
        }
    }
}

/// Terminal switching on the alt key.
fn alt_command(ch: char) {
    if let Some(digit) = ch.to_digit(10) {
        tty::select(digit as usize);
    }
}
