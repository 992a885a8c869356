//! Error kinds reported by the MBus core.

/// Errors that can be observed through `Callbacks::on_error` or
/// `Callbacks::on_send_done`, or returned by internal bookkeeping.
///
/// `NoError` doubles as the "no error occurred" sentinel carried alongside a
/// successful `on_send_done`, matching the wire protocol's CB0/CB1 semantics
/// where an error kind (rather than an `Option`) is threaded through the
/// control-bit exchange.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum MBusError {
    /// No error occurred.
    #[default]
    #[error("no error")]
    NoError,
    /// `send` was called while a transaction was already in progress.
    #[error("bus is busy with another transaction")]
    BusBusy,
    /// The same level was reported twice in a row on CLKIN.
    #[error("clock line reported the same level twice in a row")]
    ClockSynchError,
    /// The same level was reported twice in a row on DIN.
    #[error("data line reported the same level twice in a row")]
    DataSynchError,
    /// A message arrived addressed to us but no receive buffer was available.
    #[error("no receive buffer was available for an addressed message")]
    RecvOverflow,
    /// The transaction was aborted by an interrupt request from a peer.
    #[error("transaction was interrupted")]
    Interrupted,
}
