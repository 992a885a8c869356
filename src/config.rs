//! Configuration surface and platform/client trait boundaries.
//!
//! The C source threads a `set_gpio_val` function pointer and three callback
//! function pointers through a single `struct MBus_t`. This port splits that
//! contract into two traits — [`PlatformOps`] (what the FSM needs from the
//! GPIO shim) and [`Callbacks`] (what the FSM hands back to the client) —
//! which a caller implements once on whatever types own the real hardware
//! and application state, rather than wiring up raw function pointers plus
//! an opaque context pointer.

use crate::error::MBusError;

/// Opaque identifier for a GPIO line, assigned by the platform shim.
///
/// MBus itself never interprets this value; it is handed back verbatim to
/// [`PlatformOps::set_gpio_val`] so the shim can resolve it to whatever pin
/// abstraction the platform uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpioId(pub u32);

impl GpioId {
    /// Wraps a raw platform-specific GPIO index.
    pub const fn new(idx: u32) -> Self {
        Self(idx)
    }

    /// Returns the raw platform-specific GPIO index.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// GPIO operations the core requires from the platform shim.
///
/// Implementations are invoked synchronously from within [`crate::fsm::Mbus::on_clk_edge`]
/// and [`crate::fsm::Mbus::on_din_edge`]; they must be callable safely from interrupt
/// context and must not block.
pub trait PlatformOps {
    /// Drives the GPIO identified by `idx` (CLKOUT or DOUT) to `level`.
    fn set_gpio_val(&mut self, idx: GpioId, level: bool);
}

/// Completion callbacks delivered by the core.
///
/// All three methods are invoked synchronously, either from within an edge
/// handler at the unique transition into `BEGIN_IDLE`, or synchronously from
/// [`crate::fsm::Mbus::send`] when the bus is busy. Implementations must be short and
/// interrupt-safe.
pub trait Callbacks {
    /// A `send` transmission completed (successfully or not).
    ///
    /// `bytes_sent` is the number of bytes actually clocked out; `err` is
    /// `NoError` on success, or `BusBusy` if the call was rejected
    /// synchronously because a transaction was already in progress.
    fn on_send_done(&mut self, bytes_sent: usize, err: MBusError);

    /// A message addressed to us was received in full.
    ///
    /// `buf_idx` identifies which of the configured receive slots holds the
    /// message; `recv_buffer_lengths[buf_idx]` has already been written to
    /// the negative byte count by the time this fires.
    fn on_recv(&mut self, buf_idx: usize);

    /// The FSM latched a fatal or recoverable error.
    fn on_error(&mut self, err: MBusError);
}

/// Caller-owned configuration, expected to live for the lifetime of the process.
///
/// Mirrors `struct MBus_t` minus the function pointers (now [`PlatformOps`]
/// and [`Callbacks`] trait implementations held alongside this struct by
/// [`crate::fsm::Mbus`]) and minus the receive-buffer arrays (now owned directly by
/// [`crate::fsm::Mbus`] and sized by its const generic buffer count).
#[derive(Debug, Clone)]
pub struct MBusConfig {
    /// GPIO line driven to mirror/forward the bus clock.
    pub clkout_gpio: GpioId,
    /// GPIO line driven with outgoing data.
    pub dout_gpio: GpioId,
    /// Whether this node takes part in the (not-yet-implemented) enumeration
    /// protocol that assigns short prefixes dynamically.
    ///
    /// Reserved for a future enumeration layer; the FSM in this crate never
    /// reads this field.
    pub participate_in_enumeration: bool,
    /// Whether this node should observe every message on the bus rather
    /// than only ones addressed to it (not-yet-implemented).
    ///
    /// Reserved for a future enumeration layer; the FSM in this crate never
    /// reads this field.
    pub promiscuous_mode: bool,
    /// Bit vector of subscribed broadcast channels; bit *k* set means
    /// subscribed to channel *k* (0..16).
    pub broadcast_channels: u16,
    /// 4-bit unicast short prefix. Only the low nibble is significant.
    pub short_prefix: u8,
    /// 24-bit unicast long prefix, right-aligned in a 32-bit field. The top
    /// byte is reserved and must be zero.
    pub full_prefix: u32,
}

impl MBusConfig {
    /// Builds a configuration with the given addressing parameters and all
    /// other fields at their conservative defaults
    /// (`participate_in_enumeration = true`, `promiscuous_mode = false`,
    /// no broadcast subscriptions).
    pub const fn new(clkout_gpio: GpioId, dout_gpio: GpioId, short_prefix: u8, full_prefix: u32) -> Self {
        Self {
            clkout_gpio,
            dout_gpio,
            participate_in_enumeration: true,
            promiscuous_mode: false,
            broadcast_channels: 0,
            short_prefix,
            full_prefix,
        }
    }
}
