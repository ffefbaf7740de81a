//! BOOT button as a "skip" input.
//!
//! The button is edge-triggered from the GPIO interrupt so a press is
//! seen even while the CPU is busy inside a synchronous decode. The
//! handler raises [`CANCEL`] (polled by the decoder between MCUs) and
//! signals [`SKIP`] (awaited by the refresh loop while idle).

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use esp_hal::gpio::{Event, Input, Io};
use esp_hal::time::{Duration, Instant};

const DEBOUNCE_MS: u64 = 250;

static BUTTON: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));
static LAST_PRESS: Mutex<Cell<Option<Instant>>> = Mutex::new(Cell::new(None));

pub static CANCEL: AtomicBool = AtomicBool::new(false);
pub static SKIP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub fn install(io: &mut Io<'_>, mut button: Input<'static>) {
    io.set_interrupt_handler(skip_handler);
    critical_section::with(|cs| {
        button.listen(Event::FallingEdge);
        BUTTON.borrow_ref_mut(cs).replace(button);
    });
}

/// Forget any press from the previous cycle.
pub fn rearm() {
    CANCEL.store(false, Ordering::Relaxed);
    SKIP.reset();
}

pub fn pressed() -> bool {
    CANCEL.load(Ordering::Relaxed)
}

#[esp_hal::handler]
fn skip_handler() {
    critical_section::with(|cs| {
        let mut slot = BUTTON.borrow_ref_mut(cs);
        let Some(button) = slot.as_mut() else {
            return;
        };
        if !button.is_interrupt_set() {
            return;
        }
        button.clear_interrupt();

        let last = LAST_PRESS.borrow(cs);
        if let Some(prev) = last.get()
            && prev.elapsed() < Duration::from_millis(DEBOUNCE_MS)
        {
            return;
        }
        last.set(Some(Instant::now()));

        CANCEL.store(true, Ordering::Relaxed);
        SKIP.signal(());
    });
}
