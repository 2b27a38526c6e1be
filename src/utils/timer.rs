/*
 * System Timer
 *
 * Tracks the global tick count (one tick per PIT interrupt, 100 Hz) and
 * drives a small table of registered callbacks. Callback slots come from a
 * fixed pool allocated through an id queue, so registration can fail when
 * the pool is exhausted.
 *
 * A callback registered with interval `n` fires on every tick divisible by
 * `n`. `repeat` bounds how many times it fires; -1 repeats forever.
 *
 * Consumers: the scheduler accounting pass (interval 1, forever) and the
 * terminal refresh (interval 50, forever).
 */

use spin::Mutex;

use crate::arch::x86_64::interrupts;
use crate::utils::queue::IdQueue;

/// Maximum number of registered timer callbacks.
pub const TIMERS_MAX: usize = 16;

#[derive(Clone, Copy)]
struct TimerSlot {
    /// Function to call when the interval occurs. None marks a free slot.
    callback: Option<fn()>,
    /// Tick interval between calls.
    interval: u32,
    /// Remaining calls; -1 repeats forever.
    repeat: i32,
}

impl TimerSlot {
    const EMPTY: Self = Self {
        callback: None,
        interval: 0,
        repeat: 0,
    };
}

/// Fixed table of timer callbacks plus the global tick counter.
pub struct TimerWheel {
    slots: [TimerSlot; TIMERS_MAX],
    allocator: IdQueue<TIMERS_MAX>,
    ticks: u32,
}

impl TimerWheel {
    pub fn new() -> Self {
        let mut allocator = IdQueue::new();
        for id in 0..TIMERS_MAX {
            allocator.enqueue(id);
        }
        Self {
            slots: [TimerSlot::EMPTY; TIMERS_MAX],
            allocator,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Register `callback` to run every `interval` ticks, `repeat` times
    /// (-1 forever). Returns the timer id, or None when the pool is
    /// exhausted or the interval is zero.
    pub fn register(&mut self, callback: fn(), interval: u32, repeat: i32) -> Option<usize> {
        if interval == 0 {
            log::error!("timer: invalid zero interval");
            return None;
        }
        let Some(id) = self.allocator.dequeue() else {
            log::error!("timer: unable to allocate a timer");
            return None;
        };
        self.slots[id] = TimerSlot {
            callback: Some(callback),
            interval,
            repeat,
        };
        Some(id)
    }

    /// Release a timer slot back to the pool.
    pub fn unregister(&mut self, id: usize) -> bool {
        if id >= TIMERS_MAX || self.slots[id].callback.is_none() {
            log::error!("timer: callback id out of range or unused: {}", id);
            return false;
        }
        self.slots[id] = TimerSlot::EMPTY;
        self.allocator.enqueue(id)
    }

    /// Advance one tick and collect the callbacks that are due. The caller
    /// invokes them after releasing the timer lock so that callbacks may
    /// register or unregister timers themselves.
    pub fn tick(&mut self) -> heapless::Vec<fn(), TIMERS_MAX> {
        self.ticks = self.ticks.wrapping_add(1);

        let mut due = heapless::Vec::new();
        for id in 0..TIMERS_MAX {
            let Some(callback) = self.slots[id].callback else {
                continue;
            };
            if self.ticks % self.slots[id].interval != 0 {
                continue;
            }
            let _ = due.push(callback);
            if self.slots[id].repeat > 0 {
                self.slots[id].repeat -= 1;
            }
            if self.slots[id].repeat == 0 {
                self.unregister(id);
            }
        }
        due
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

static TIMERS: Mutex<Option<TimerWheel>> = Mutex::new(None);

/// Initialize the timer table and hook the PIT interrupt.
pub fn init() {
    log::info!("timer: initializing");
    *TIMERS.lock() = Some(TimerWheel::new());
    interrupts::irq_register(
        interrupts::IRQ_TIMER,
        interrupts::isr_entry_timer,
        timer_irq_handler,
    );
}

fn with<R>(f: impl FnOnce(&mut TimerWheel) -> R) -> R {
    let mut guard = TIMERS.lock();
    let wheel = guard.as_mut().expect("timer not initialized");
    f(wheel)
}

/// Ticks elapsed since boot.
pub fn get_ticks() -> u32 {
    with(|wheel| wheel.ticks())
}

/// Register a callback; see [`TimerWheel::register`].
pub fn callback_register(callback: fn(), interval: u32, repeat: i32) -> Option<usize> {
    with(|wheel| wheel.register(callback, interval, repeat))
}

pub fn callback_unregister(id: usize) -> bool {
    with(|wheel| wheel.unregister(id))
}

/// Timer IRQ handler, dispatched from the common kernel entry. Due
/// callbacks run outside the timer lock.
fn timer_irq_handler() {
    let due = with(|wheel| wheel.tick());
    for callback in due {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::sync::atomic::{AtomicU32, Ordering};

    // Callbacks are plain fn pointers, so each test that counts firings
    // gets its own counter; the tests run on parallel threads.
    static CADENCE_FIRED: AtomicU32 = AtomicU32::new(0);
    static FINITE_FIRED: AtomicU32 = AtomicU32::new(0);

    fn cadence_fire() {
        CADENCE_FIRED.fetch_add(1, Ordering::SeqCst);
    }

    fn finite_fire() {
        FINITE_FIRED.fetch_add(1, Ordering::SeqCst);
    }

    fn noop_fire() {}

    fn run_ticks(wheel: &mut TimerWheel, n: u32) {
        for _ in 0..n {
            for callback in wheel.tick() {
                callback();
            }
        }
    }

    #[test]
    fn interval_cadence() {
        let mut wheel = TimerWheel::new();
        wheel.register(cadence_fire, 10, -1).unwrap();

        run_ticks(&mut wheel, 9);
        assert_eq!(CADENCE_FIRED.load(Ordering::SeqCst), 0);
        run_ticks(&mut wheel, 1);
        assert_eq!(CADENCE_FIRED.load(Ordering::SeqCst), 1);
        run_ticks(&mut wheel, 25);
        assert_eq!(CADENCE_FIRED.load(Ordering::SeqCst), 3);
        assert_eq!(wheel.ticks(), 35);
    }

    #[test]
    fn finite_repeat_retires_slot() {
        let mut wheel = TimerWheel::new();
        let id = wheel.register(finite_fire, 1, 3).unwrap();

        run_ticks(&mut wheel, 10);
        assert_eq!(FINITE_FIRED.load(Ordering::SeqCst), 3);

        // The slot was released, so unregistering again is an error.
        assert!(!wheel.unregister(id));
    }

    #[test]
    fn pool_exhaustion() {
        let mut wheel = TimerWheel::new();
        for _ in 0..TIMERS_MAX {
            assert!(wheel.register(noop_fire, 1, -1).is_some());
        }
        assert!(wheel.register(noop_fire, 1, -1).is_none());

        // Releasing one slot makes registration possible again.
        assert!(wheel.unregister(0));
        assert!(wheel.register(noop_fire, 1, -1).is_some());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut wheel = TimerWheel::new();
        assert!(wheel.register(noop_fire, 0, -1).is_none());
    }
}
