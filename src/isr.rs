//! Global-singleton convenience wrapper around [`crate::fsm::Mbus`].
//!
//! `Mbus` itself is an owned struct with no built-in mutual exclusion: a
//! platform that wants the classic "one static driver, called from interrupt
//! vectors" shape wraps it in a `critical_section::Mutex<RefCell<Option<...>>>`
//! by hand, exactly as this module does, substituting `Mbus`'s two edge
//! handlers for a single `tick`.
//!
//! None of this is required to use the core FSM: a platform with more than
//! one ring interface, or one that already owns its mutual exclusion some
//! other way, can embed `Mbus` directly and skip this module entirely.

use core::cell::RefCell;
use critical_section::Mutex;

use crate::config::{Callbacks, MBusConfig, PlatformOps};
use crate::error::MBusError;
use crate::fsm::{Mbus, RxSlot};

/// Builds the empty `Mutex<RefCell<Option<Mbus<...>>>>` a caller declares as
/// a `static` and later fills in with [`global_mbus_setup`].
///
/// # Example
/// ```rust
/// use mbus_core::config::{GpioId, PlatformOps, Callbacks};
/// use mbus_core::error::MBusError;
/// use mbus_core::fsm::Mbus;
/// use mbus_core::isr::global_mbus_init;
///
/// struct Gpio;
/// impl PlatformOps for Gpio {
///     fn set_gpio_val(&mut self, _idx: GpioId, _level: bool) {}
/// }
/// struct App;
/// impl Callbacks for App {
///     fn on_send_done(&mut self, _bytes_sent: usize, _err: MBusError) {}
///     fn on_recv(&mut self, _buf_idx: usize) {}
///     fn on_error(&mut self, _err: MBusError) {}
/// }
///
/// static NODE: critical_section::Mutex<core::cell::RefCell<Option<Mbus<Gpio, App, 2>>>> =
///     global_mbus_init::<Gpio, App, 2>();
/// ```
pub const fn global_mbus_init<P: PlatformOps, C: Callbacks, const N: usize>()
-> Mutex<RefCell<Option<Mbus<P, C, N>>>> {
    Mutex::new(RefCell::new(None))
}

/// Constructs an `Mbus` from `cfg`/`platform`/`callbacks`/`recv_slots` and
/// installs it into the global static declared with [`global_mbus_init`].
///
/// Call this once, outside of interrupt context, before enabling the CLKIN
/// and DIN edge interrupts.
pub fn global_mbus_setup<P: PlatformOps, C: Callbacks, const N: usize>(
    global: &'static Mutex<RefCell<Option<Mbus<P, C, N>>>>,
    cfg: MBusConfig,
    platform: P,
    callbacks: C,
    recv_slots: [RxSlot; N],
) {
    critical_section::with(|cs| {
        let _ = global
            .borrow(cs)
            .replace(Some(Mbus::new(cfg, platform, callbacks, recv_slots)));
    });
}

/// Forwards a CLKIN edge to the global `Mbus`, if one has been installed.
///
/// Intended to be called directly from the platform's CLKIN edge interrupt
/// vector. A no-op if [`global_mbus_setup`] has not run yet.
pub fn global_mbus_on_clk_edge<P: PlatformOps, C: Callbacks, const N: usize>(
    global: &'static Mutex<RefCell<Option<Mbus<P, C, N>>>>,
    new_level: bool,
) {
    critical_section::with(|cs| {
        if let Some(mbus) = global.borrow(cs).borrow_mut().as_mut() {
            mbus.on_clk_edge(new_level);
        }
    });
}

/// Forwards a DIN edge to the global `Mbus`, if one has been installed.
///
/// Intended to be called directly from the platform's DIN edge interrupt
/// vector. A no-op if [`global_mbus_setup`] has not run yet.
pub fn global_mbus_on_din_edge<P: PlatformOps, C: Callbacks, const N: usize>(
    global: &'static Mutex<RefCell<Option<Mbus<P, C, N>>>>,
    new_level: bool,
) {
    critical_section::with(|cs| {
        if let Some(mbus) = global.borrow(cs).borrow_mut().as_mut() {
            mbus.on_din_edge(new_level);
        }
    });
}

/// Arbitrates for the bus and queues `buf` on the global `Mbus`.
///
/// Returns `false` if no `Mbus` has been installed yet; otherwise behaves
/// exactly like [`Mbus::send`], including the synchronous `on_send_done`
/// callback when the bus is already busy.
pub fn global_mbus_send<P: PlatformOps, C: Callbacks, const N: usize>(
    global: &'static Mutex<RefCell<Option<Mbus<P, C, N>>>>,
    buf: &'static [u8],
    is_priority: bool,
) -> bool {
    critical_section::with(|cs| {
        if let Some(mbus) = global.borrow(cs).borrow_mut().as_mut() {
            mbus.send(buf, is_priority);
            true
        } else {
            false
        }
    })
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::config::GpioId;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec as StdVec;

    const CLKOUT: GpioId = GpioId::new(0);
    const DOUT: GpioId = GpioId::new(1);

    struct RecordingPlatform;
    impl PlatformOps for RecordingPlatform {
        fn set_gpio_val(&mut self, _idx: GpioId, _level: bool) {}
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        send_done: StdVec<(usize, MBusError)>,
    }
    impl Callbacks for RecordingCallbacks {
        fn on_send_done(&mut self, bytes_sent: usize, err: MBusError) {
            self.send_done.push((bytes_sent, err));
        }
        fn on_recv(&mut self, _buf_idx: usize) {}
        fn on_error(&mut self, _err: MBusError) {}
    }

    static CRIT: StdMutex<bool> = StdMutex::new(true);

    struct TestCriticalSection;
    critical_section::set_impl!(TestCriticalSection);

    unsafe impl critical_section::Impl for TestCriticalSection {
        unsafe fn acquire() -> critical_section::RawRestoreState {
            let val = CRIT.lock().unwrap();
            *val
        }
        unsafe fn release(_token: critical_section::RawRestoreState) {
            CRIT.clear_poison();
        }
    }

    #[test]
    fn uninitialized_global_ignores_edges_and_rejects_send() {
        static NODE: Mutex<RefCell<Option<Mbus<RecordingPlatform, RecordingCallbacks, 1>>>> =
            global_mbus_init::<RecordingPlatform, RecordingCallbacks, 1>();

        global_mbus_on_clk_edge(&NODE, false);
        global_mbus_on_din_edge(&NODE, false);
        static BUF: [u8; 1] = [0];
        assert!(!global_mbus_send(&NODE, &BUF, false));
    }

    #[test]
    fn setup_installs_driver_and_edges_reach_it() {
        static NODE: Mutex<RefCell<Option<Mbus<RecordingPlatform, RecordingCallbacks, 1>>>> =
            global_mbus_init::<RecordingPlatform, RecordingCallbacks, 1>();

        let cfg = MBusConfig::new(CLKOUT, DOUT, 0x3, 0);
        let slots = [RxSlot::new(vec![0u8; 4].leak())];
        global_mbus_setup(&NODE, cfg, RecordingPlatform, RecordingCallbacks::default(), slots);

        static BUF: [u8; 1] = [0xAB];
        assert!(global_mbus_send(&NODE, &BUF, false));

        critical_section::with(|cs| {
            let guard = NODE.borrow(cs).borrow();
            let mbus = guard.as_ref().unwrap();
            assert_eq!(mbus.logical(), crate::fsm::Logical::Transmit);
        });
    }
}
