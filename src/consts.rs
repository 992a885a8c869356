//! Protocol-level constants for address widths, escape values, and the
//! interrupt-request pulse threshold.

/// Bit position at which the 4-bit short prefix (or escape nibble) has been
/// fully accumulated and can be classified.
pub const SHORT_PREFIX_BITS: u8 = 4;

/// Bit position at which a full short header (prefix nibble + channel
/// nibble) has been accumulated; the FSM advances to `DRIVE_DATA` here
/// unless it jumped to the long-address path at [`SHORT_PREFIX_BITS`].
pub const SHORT_ADDR_BITS: u8 = 8;

/// Short-prefix value (low nibble `0xF`) that escapes into the long-address
/// path instead of being matched as an ordinary unicast prefix.
pub const LONG_ADDR_ESCAPE: u32 = 0xF;

/// Bit position at which the 24 significant long-prefix bits have been
/// accumulated and can be classified.
pub const LONG_PREFIX_BITS: u8 = 28;

/// Bit position at which a full long header has been accumulated; the FSM
/// advances to `DRIVE_DATA` here.
pub const LONG_ADDR_BITS: u8 = 32;

/// Mask selecting the broadcast channel nibble out of a decoded short or
/// long address.
pub const BROADCAST_CHANNEL_MASK: u32 = 0xF;

/// Mask selecting the 24 significant bits of a long prefix.
pub const LONG_PREFIX_MASK: u32 = 0x00FF_FFFF;

/// Number of consecutive DIN rising edges, with no intervening CLKIN edge
/// resetting the count, that constitute an interrupt-request pattern from a
/// peer (or from ourselves, when we are the one requesting the interrupt).
pub const INTERRUPT_REQUEST_THRESHOLD: u32 = 3;
