//! The MBus finite-state machine: the single, non-reentrant core that drives
//! arbitration, address decoding, data transfer, and end-of-message control
//! bit exchange from nothing but two edge notifications.
//!
//! Nothing in this module runs on a timer or polling loop. [`Mbus::on_clk_edge`]
//! and [`Mbus::on_din_edge`] are the only two entry points that ever advance
//! [`State`]; the platform shim supplies bit-level timing entirely by
//! calling them from its GPIO edge interrupts.

use crate::config::{Callbacks, MBusConfig, PlatformOps};
use crate::consts;
use crate::error::MBusError;

/// The 25 discrete phases of a single MBus transaction.
///
/// Declared in transaction order so that the ordinal comparisons in
/// [`Mbus::on_din_edge`] (`state < RequestInterrupt`, `state <= BeginControl`)
/// pick out the right sub-ranges of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum State {
    /// Quiescent: no transaction in progress.
    #[default]
    Idle,
    /// One edge past Idle; cursors are reset here.
    PreArb,
    /// Ordinary (active-low) arbitration bit.
    Arbitration,
    /// Priority (active-high) arbitration bit, drive half.
    PrioDrive,
    /// Priority arbitration bit, latch half; resolves the contest.
    PrioLatch,
    /// Reserved arbitration slot, drive half.
    ArbReservedDrive,
    /// Reserved arbitration slot, latch half.
    ArbReservedLatch,
    /// Short (4-bit) address, drive half.
    DriveShortAddr,
    /// Short (4-bit) address, latch half.
    LatchShortAddr,
    /// Long (24-bit) address, drive half.
    DriveLongAddr,
    /// Long (24-bit) address, latch half.
    LatchLongAddr,
    /// Payload byte, drive half.
    DriveData,
    /// Payload byte, latch half.
    LatchData,
    /// Hold CLKOUT high, begin requesting the teardown sequence.
    RequestInterrupt,
    /// Hold CLKOUT high, second half-period.
    RequestingInterrupt,
    /// Hold CLKOUT high, awaiting the DIN interrupt pattern.
    RequestedInterrupt,
    /// Interrupt pattern observed; collapses into `BeginControl` on the next
    /// CLKIN edge (see `DESIGN.md` for why these two states share one arm).
    PreBeginControl,
    /// See [`State::PreBeginControl`].
    BeginControl,
    /// Drive CB0 (End-of-Message / !EoM).
    DriveCb0,
    /// Latch CB0.
    LatchCb0,
    /// Drive CB1 (Error / Ack).
    DriveCb1,
    /// Latch CB1.
    LatchCb1,
    /// Drive the idle-return bit.
    DriveIdle,
    /// Latch the idle-return bit; dispatches the completion callback.
    BeginIdle,
    /// Terminal: a synch error was latched. Only a fresh `Mbus` recovers.
    Error,
}

/// The node's role in the transaction currently occupying the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logical {
    /// Mirroring bits from DIN to DOUT; the message is not ours.
    #[default]
    Forward,
    /// We are the sender.
    Transmit,
    /// We are the addressed recipient.
    Receive,
    /// Provisionally addressed via a broadcast channel, pending the channel check.
    ReceiveBroadcast,
    /// We initiated the current interrupt-request / control-bit teardown.
    Interrupter,
}

/// One client-owned receive slot.
///
/// Mirrors the signed-length wire convention exactly as documented: `length
/// > 0` means the slot is available for writing up to that many bytes;
/// `length <= 0` means it holds a captured message of `-length` bytes (or
/// was never armed, for an initial `0`). Clients re-arm a slot by writing a
/// positive `length`; the core never touches a slot while it is non-positive.
#[derive(Debug)]
pub struct RxSlot {
    /// See the struct-level docs for the sign convention.
    pub length: i32,
    /// Decoded address recorded when the core claims this slot: the short
    /// prefix occupies the high byte, or the full 24-bit prefix occupies
    /// the low bits, depending on which path claimed it.
    pub addr: u32,
    /// Backing storage for the payload.
    pub buf: &'static mut [u8],
}

impl RxSlot {
    /// Wraps `buf` as an armed, empty slot (`length` set to its full capacity).
    pub fn new(buf: &'static mut [u8]) -> Self {
        let length = buf.len() as i32;
        Self {
            length,
            addr: 0,
            buf,
        }
    }
}

/// The MBus core: a single-owner finite-state machine parameterized by the
/// platform GPIO shim (`P`), the client's completion callbacks (`C`), and
/// the number of receive slots it manages (`N`).
///
/// There is exactly one of these per node. A platform that needs more than
/// one MBus node instantiates more than one `Mbus`; nothing here is a
/// process-wide singleton unless the caller opts into the `global` feature's
/// convenience wrapper (see [`crate::isr`]).
#[derive(Debug)]
pub struct Mbus<P: PlatformOps, C: Callbacks, const N: usize> {
    cfg: MBusConfig,
    platform: P,
    callbacks: C,
    recv_slots: [RxSlot; N],

    state: State,
    logical: Logical,
    last_clkin: bool,
    last_din: bool,
    last_dout: bool,
    interrupt_count: u32,
    error: MBusError,

    tx_buf: Option<&'static [u8]>,
    tx_length: usize,
    tx_priority: bool,
    tx_bit_idx: u8,
    tx_byte_idx: usize,

    rx_addr: u32,
    rx_bit_idx: u8,
    rx_byte_idx: usize,
    rx_buf_idx: Option<usize>,

    ack: bool,
}

impl<P: PlatformOps, C: Callbacks, const N: usize> Mbus<P, C, N> {
    /// Wires up a fresh FSM. Corresponds to `MBus_init`: zeroes every FSM
    /// field, sets `last_clkin`/`last_din`/`last_dout` to 1, and leaves
    /// `state` at `Idle`. There is no in-place reset; recovering from
    /// [`State::Error`] means constructing a new `Mbus`.
    pub fn new(cfg: MBusConfig, platform: P, callbacks: C, recv_slots: [RxSlot; N]) -> Self {
        Self {
            cfg,
            platform,
            callbacks,
            recv_slots,
            state: State::Idle,
            logical: Logical::Forward,
            last_clkin: true,
            last_din: true,
            last_dout: true,
            interrupt_count: 0,
            error: MBusError::NoError,
            tx_buf: None,
            tx_length: 0,
            tx_priority: false,
            tx_bit_idx: 0,
            tx_byte_idx: 0,
            rx_addr: 0,
            rx_bit_idx: 0,
            rx_byte_idx: 0,
            rx_buf_idx: None,
            ack: false,
        }
    }

    /// Current FSM phase.
    pub fn state(&self) -> State {
        self.state
    }

    /// Current role in the transaction occupying the bus, if any.
    pub fn logical(&self) -> Logical {
        self.logical
    }

    /// Last error latched by the FSM (`NoError` if none).
    pub fn error(&self) -> MBusError {
        self.error
    }

    /// Borrows one of the configured receive slots, e.g. to read back a
    /// completed message or to re-arm it by writing a positive `length`.
    pub fn recv_slot(&self, idx: usize) -> &RxSlot {
        &self.recv_slots[idx]
    }

    /// Mutably borrows one of the configured receive slots.
    pub fn recv_slot_mut(&mut self, idx: usize) -> &mut RxSlot {
        &mut self.recv_slots[idx]
    }

    fn set_dout(&mut self, level: bool) {
        self.last_dout = level;
        self.platform.set_gpio_val(self.cfg.dout_gpio, level);
    }

    fn set_clkout(&mut self, level: bool) {
        self.platform.set_gpio_val(self.cfg.clkout_gpio, level);
    }

    /// Scans the configured slots in index order for the first one with a
    /// positive `length`.
    fn claim_rx_buffer(&self) -> Option<usize> {
        self.recv_slots.iter().position(|slot| slot.length > 0)
    }

    /// Arbitrates for the bus and queues `buf` for transmission.
    ///
    /// `buf` must remain valid until the completion callback fires; there is
    /// no allocator here to take ownership of it, so the caller keeps it
    /// alive until `on_send_done`.
    ///
    /// If the FSM is not [`State::Idle`], the call fails synchronously with
    /// [`MBusError::BusBusy`] and nothing about the in-progress transaction
    /// is disturbed — including any transmission already latched from an
    /// earlier `send`.
    pub fn send(&mut self, buf: &'static [u8], is_priority: bool) {
        if self.state == State::Idle {
            self.tx_length = buf.len();
            self.tx_buf = Some(buf);
            self.tx_priority = is_priority;
            self.logical = Logical::Transmit;
            // Signals intent to arbitrate; picked up on the next CLKIN edge.
            self.set_dout(false);
        } else {
            self.callbacks.on_send_done(0, MBusError::BusBusy);
        }
    }

    /// Call on every CLKIN transition, with the new level.
    ///
    /// Latches [`State::Error`] with [`MBusError::ClockSynchError`] if the
    /// reported level matches the previous one (a stuck or double-fired
    /// interrupt); otherwise advances the FSM by exactly one half-bit.
    pub fn on_clk_edge(&mut self, new_level: bool) {
        if self.state == State::Error {
            return;
        }
        if self.last_clkin == new_level {
            self.state = State::Error;
            self.error = MBusError::ClockSynchError;
            crate::trace!("mbus: duplicate CLKIN level, latching ClockSynchError");
            return;
        }
        self.last_clkin = new_level;
        self.interrupt_count = 0;

        match self.state {
            State::Idle => {
                self.state = State::PreArb;
                self.tx_bit_idx = 0;
                self.tx_byte_idx = 0;
                self.rx_addr = 0;
                self.rx_bit_idx = 0;
                self.rx_byte_idx = 0;
                self.rx_buf_idx = None;
                self.ack = false;
            }
            State::PreArb => {
                self.state = State::Arbitration;
            }
            State::Arbitration => {
                self.state = State::PrioDrive;
                if !self.last_din {
                    // Someone else is arbitrating; we did not win outright.
                    self.logical = Logical::Forward;
                } else if !self.last_dout {
                    // Won ordinary arbitration.
                    self.logical = Logical::Transmit;
                } else {
                    self.logical = Logical::Forward;
                }
            }
            State::PrioDrive => {
                self.state = State::PrioLatch;
                if self.tx_priority {
                    self.set_dout(true);
                }
            }
            State::PrioLatch => {
                self.state = State::ArbReservedDrive;
                if self.logical == Logical::Transmit {
                    if !self.tx_priority && self.last_din {
                        // Preempted by a priority sender.
                        self.logical = Logical::Forward;
                    }
                } else if self.tx_priority && !self.last_din {
                    // Promoted by priority.
                    self.logical = Logical::Transmit;
                }
                // Address bytes are already part of the buffer; skip straight to data.
                if self.logical == Logical::Transmit {
                    self.state = State::DriveData;
                }
            }
            State::ArbReservedDrive => {
                self.state = State::ArbReservedLatch;
            }
            State::ArbReservedLatch => {
                self.state = State::DriveShortAddr;
            }
            State::DriveShortAddr => {
                self.state = State::LatchShortAddr;
            }
            State::LatchShortAddr => {
                self.state = State::DriveShortAddr;
                self.rx_addr = (self.rx_addr << 1) | self.last_din as u32;
                self.rx_bit_idx += 1;
                if self.rx_bit_idx == consts::SHORT_PREFIX_BITS {
                    if self.rx_addr == consts::LONG_ADDR_ESCAPE {
                        self.state = State::DriveLongAddr;
                    } else if self.rx_addr == self.cfg.short_prefix as u32 {
                        self.logical = Logical::Receive;
                    } else if self.rx_addr == 0 {
                        self.logical = Logical::ReceiveBroadcast;
                    } else {
                        self.logical = Logical::Forward;
                    }
                } else if self.rx_bit_idx == consts::SHORT_ADDR_BITS {
                    self.state = State::DriveData;
                    self.finish_address_decode(self.rx_addr << 24);
                }
            }
            State::DriveLongAddr => {
                self.state = State::LatchLongAddr;
            }
            State::LatchLongAddr => {
                self.state = State::DriveLongAddr;
                self.rx_addr = (self.rx_addr << 1) | self.last_din as u32;
                self.rx_bit_idx += 1;
                if self.rx_bit_idx == consts::LONG_PREFIX_BITS {
                    let significant = self.rx_addr & consts::LONG_PREFIX_MASK;
                    if significant == self.cfg.full_prefix {
                        self.logical = Logical::Receive;
                    } else if significant == 0 {
                        self.logical = Logical::ReceiveBroadcast;
                    } else {
                        self.logical = Logical::Forward;
                    }
                } else if self.rx_bit_idx == consts::LONG_ADDR_BITS {
                    self.state = State::DriveData;
                    // rx_bit_idx is never reset on the short->long escape, so by
                    // now rx_addr holds escape(4) ++ prefix(24) ++ channel(4):
                    // the trailing channel nibble has pushed the prefix left by
                    // 4 bits since it was checked above. Shift it back out and
                    // mask off the escape nibble so only the 24-bit prefix is
                    // recorded, matching the short-address path storing only
                    // its meaningful bits.
                    let prefix = (self.rx_addr >> 4) & consts::LONG_PREFIX_MASK;
                    self.finish_address_decode(prefix);
                }
            }
            State::DriveData => {
                self.state = State::LatchData;
                if self.logical == Logical::Transmit {
                    if let Some(buf) = self.tx_buf {
                        let bit = (buf[self.tx_byte_idx] >> self.tx_bit_idx) & 1 != 0;
                        self.set_dout(bit);
                        self.tx_bit_idx += 1;
                        if self.tx_bit_idx == 8 {
                            self.tx_bit_idx = 0;
                            self.tx_byte_idx += 1;
                        }
                    }
                }
            }
            State::LatchData => {
                self.state = State::DriveData;
                if self.logical == Logical::Transmit && self.tx_byte_idx == self.tx_length {
                    self.state = State::RequestInterrupt;
                    self.error = MBusError::NoError;
                }
                if self.logical == Logical::Receive {
                    if let Some(idx) = self.rx_buf_idx {
                        if (self.rx_byte_idx as i32) > self.recv_slots[idx].length {
                            // Overruns the buffer; abort and NAK.
                            self.state = State::RequestInterrupt;
                            self.logical = Logical::Transmit;
                            self.error = MBusError::RecvOverflow;
                        } else {
                            let bit = self.last_din as u8;
                            self.recv_slots[idx].buf[self.rx_byte_idx] |= bit << self.rx_bit_idx;
                            self.rx_bit_idx += 1;
                            if self.rx_bit_idx == 8 {
                                self.rx_bit_idx = 0;
                                self.rx_byte_idx += 1;
                            }
                        }
                    }
                }
            }
            State::RequestInterrupt => {
                if !self.last_clkin {
                    self.state = State::RequestingInterrupt;
                }
            }
            State::RequestingInterrupt => {
                if !self.last_clkin {
                    self.state = State::RequestedInterrupt;
                }
            }
            State::RequestedInterrupt => {}
            // The interrupt pattern was already observed on DIN; both of
            // these collapse into DRIVE_CB0 on this same CLKIN edge.
            State::PreBeginControl | State::BeginControl => {
                self.state = State::DriveCb0;
            }
            State::DriveCb0 => {
                self.state = State::LatchCb0;
                if self.logical == Logical::Interrupter {
                    self.set_dout(self.error == MBusError::NoError);
                }
            }
            State::LatchCb0 => {
                self.state = State::DriveCb1;
                self.ack = self.last_din;
                if self.logical == Logical::Receive {
                    // Switch to TX mode to send CB1.
                    self.logical = Logical::Transmit;
                } else if self.error == MBusError::NoError {
                    self.logical = Logical::Forward;
                }
            }
            State::DriveCb1 => {
                self.state = State::LatchCb1;
                if self.logical == Logical::Interrupter {
                    if self.error == MBusError::RecvOverflow {
                        self.set_dout(true);
                    }
                } else if self.logical == Logical::Transmit && self.ack {
                    self.set_dout(false);
                }
            }
            State::LatchCb1 => {
                self.state = State::DriveIdle;
                self.logical = Logical::Forward;
                if self.tx_byte_idx > 0 {
                    self.ack = self.last_din;
                }
            }
            State::DriveIdle => {
                self.state = State::BeginIdle;
            }
            State::BeginIdle => {
                self.state = if self.last_din {
                    State::Idle
                } else {
                    State::PreArb
                };
            }
            State::Error => {}
        }

        if matches!(
            self.state,
            State::RequestInterrupt | State::RequestingInterrupt | State::RequestedInterrupt
        ) {
            self.set_clkout(true);
        } else {
            let level = self.last_clkin;
            self.set_clkout(level);
        }

        if self.state == State::BeginIdle {
            if self.error != MBusError::NoError {
                let err = self.error;
                crate::trace!("mbus: idle transition dispatching on_error({})", err);
                self.callbacks.on_error(err);
            } else if self.tx_byte_idx > 0 {
                crate::trace!(
                    "mbus: idle transition dispatching on_send_done({} bytes)",
                    self.tx_byte_idx
                );
                self.callbacks.on_send_done(self.tx_byte_idx, self.error);
            } else if self.rx_byte_idx > 0 {
                if let Some(idx) = self.rx_buf_idx {
                    self.recv_slots[idx].length = -(self.rx_byte_idx as i32);
                    crate::trace!("mbus: idle transition dispatching on_recv(slot {})", idx);
                    self.callbacks.on_recv(idx);
                }
            }
        }
    }

    /// Shared tail of the short- and long-address paths once the header is
    /// fully accumulated: resolves a provisional broadcast match against
    /// the subscribed channel set, then claims a receive slot or requests
    /// an interrupt if none is free.
    fn finish_address_decode(&mut self, recorded_addr: u32) {
        if self.logical == Logical::ReceiveBroadcast {
            let channel = self.rx_addr & consts::BROADCAST_CHANNEL_MASK;
            if self.cfg.broadcast_channels & (1 << channel) != 0 {
                self.logical = Logical::Receive;
            } else {
                self.logical = Logical::Forward;
            }
        }
        if self.logical == Logical::Receive {
            match self.claim_rx_buffer() {
                Some(idx) => {
                    self.rx_buf_idx = Some(idx);
                    self.recv_slots[idx].addr = recorded_addr;
                    self.rx_bit_idx = 0;
                }
                None => {
                    self.state = State::RequestInterrupt;
                    self.error = MBusError::RecvOverflow;
                }
            }
        }
    }

    /// Call on every DIN transition, with the new level.
    ///
    /// Latches [`State::Error`] with [`MBusError::DataSynchError`] on a
    /// repeated level, same as [`Mbus::on_clk_edge`]. Counts consecutive
    /// rising edges to detect the interrupt-request pattern, and forwards
    /// DIN to DOUT (the ring's bit-forwarding behavior) whenever we are not
    /// actively transmitting.
    pub fn on_din_edge(&mut self, new_level: bool) {
        if self.state == State::Error {
            return;
        }
        if self.last_din == new_level {
            self.state = State::Error;
            self.error = MBusError::DataSynchError;
            crate::trace!("mbus: duplicate DIN level, latching DataSynchError");
            return;
        }
        self.last_din = new_level;

        if self.last_din {
            self.interrupt_count += 1;
        }

        if self.interrupt_count >= consts::INTERRUPT_REQUEST_THRESHOLD {
            if self.state == State::RequestedInterrupt {
                self.logical = Logical::Interrupter;
            }
            self.state = State::PreBeginControl;
        }

        if self.state < State::RequestInterrupt {
            if self.logical != Logical::Transmit {
                self.set_dout(self.last_din);
            }
        } else if self.state <= State::BeginControl {
            self.set_dout(self.last_din);
        } else if self.logical != Logical::Transmit {
            self.set_dout(self.last_din);
        }
    }
}
