//! # mbus-core
//!
//! A portable, `no_std`, interrupt-driven core for **MBus**: a two-wire
//! (CLKIN/CLKOUT/DIN/DOUT), chip-to-chip, daisy-chained ring bus for deeply
//! embedded systems.
//!
//! This crate is the bit-banging protocol state machine only. It contains:
//! - arbitration for bus ownership, including a priority round ([`fsm`])
//! - address decoding (short 4-bit and long 24-bit unicast prefixes, plus
//!   broadcast channels) ([`fsm`], [`consts`])
//! - bit-by-bit forwarding of messages that are not addressed to this node
//! - transmission of the caller's byte buffer when this node is the sender
//! - reception into one of a fixed set of caller-owned buffer slots
//! - the end-of-message / acknowledge control-bit exchange and the
//!   interrupt-request protocol a node uses to abort a transaction (for
//!   example, when no receive buffer is available)
//!
//! Everything else — GPIO direction and interrupt setup, the enumeration
//! protocol that assigns short prefixes, message framing above a single
//! transaction, and any executor or event loop — is out of scope and lives
//! in the platform shim that calls into this crate.
//!
//! ## Crate features
//! | Feature       | Description |
//! |---------------|-------------|
//! | `global` (default) | Pulls in `critical-section` and [`isr`], a `Mutex<RefCell<Option<Mbus<...>>>>` convenience wrapper for the classic "one static driver called from interrupt vectors" shape |
//! | `std`          | Disables `#![no_std]`; only affects host-side testing, nothing in the core borrows an allocator either way |
//! | `defmt-0-3`    | Routes the crate's trace logging through `defmt` instead of `log` |
//! | `log`          | Routes the crate's trace logging through the `log` facade |
//!
//! ## Usage
//!
//! ```rust
//! use mbus_core::config::{Callbacks, GpioId, MBusConfig, PlatformOps};
//! use mbus_core::error::MBusError;
//! use mbus_core::fsm::{Mbus, RxSlot};
//!
//! struct Gpio;
//! impl PlatformOps for Gpio {
//!     fn set_gpio_val(&mut self, _idx: GpioId, _level: bool) {
//!         // drive the real pin here
//!     }
//! }
//!
//! struct App;
//! impl Callbacks for App {
//!     fn on_send_done(&mut self, _bytes_sent: usize, _err: MBusError) {}
//!     fn on_recv(&mut self, _buf_idx: usize) {}
//!     fn on_error(&mut self, _err: MBusError) {}
//! }
//!
//! # fn slot() -> &'static mut [u8] { Box::leak(vec![0u8; 8].into_boxed_slice()) }
//! let cfg = MBusConfig::new(GpioId::new(0), GpioId::new(1), 0x3, 0);
//! let mut mbus: Mbus<Gpio, App, 2> = Mbus::new(
//!     cfg,
//!     Gpio,
//!     App,
//!     [RxSlot::new(slot()), RxSlot::new(slot())],
//! );
//!
//! // Wire these two up to the platform's CLKIN/DIN edge interrupts.
//! // Both lines idle high, so the first edge observed on each is a falling edge:
//! mbus.on_clk_edge(false);
//! mbus.on_din_edge(false);
//! ```
//!
//! ## Status
//!
//! The FSM core is complete and unit-tested against concrete protocol
//! scenarios. The enumeration layer referenced by
//! [`config::MBusConfig::participate_in_enumeration`] is not implemented
//! here; those fields are reserved for a higher layer.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "global")]
pub use critical_section;

/// Routes a single trace-level log line through whichever of `log`/`defmt`
/// is enabled, or drops it entirely if neither is. Kept as a macro (rather
/// than a function) so the format arguments are never evaluated at all when
/// logging is compiled out — important in interrupt-context code.
#[doc(hidden)]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            $crate::log::trace!($($arg)*);
        }
        #[cfg(feature = "defmt-0-3")]
        {
            $crate::defmt::trace!($($arg)*);
        }
        #[cfg(not(any(feature = "log", feature = "defmt-0-3")))]
        {}
    };
}

#[cfg(feature = "log")]
#[doc(hidden)]
pub use log;

#[cfg(feature = "defmt-0-3")]
#[doc(hidden)]
pub use defmt;

pub mod config;
pub mod consts;
pub mod error;
pub mod fsm;
#[cfg(feature = "global")]
pub mod isr;
