//! Status codes and errors for the onion service client core
use thiserror::Error;

/// Outcome of asking for a descriptor fetch.
///
/// This is the full set of reasons a fetch attempt can end, including the
/// non-fatal ones. Only [`FetchStatus::Launched`] means a directory request
/// is now in flight.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum FetchStatus {
    /// A descriptor fetch has been launched.
    Launched,
    /// A usable descriptor is already in the cache; no fetch is needed.
    HaveDesc,
    /// Every responsible directory for this service has already been tried.
    NoHsdirs,
    /// The configuration forbids fetching descriptors.
    NotAllowed,
    /// We are missing a live consensus or minimum directory information.
    MissingInfo,
    /// A directory request for this service is already in flight.
    Pending,
    /// An internal error occurred while trying to fetch.
    Error,
}

impl FetchStatus {
    /// Return true iff waiter streams should be closed when a fetch attempt
    /// ends with this status.
    ///
    /// The statuses outside this set either keep the waiters parked
    /// (`MissingInfo`, `Pending`) or mean they are already progressing
    /// (`Launched`, `HaveDesc`).
    pub(crate) fn closes_waiters(self) -> bool {
        matches!(
            self,
            FetchStatus::NoHsdirs | FetchStatus::NotAllowed | FetchStatus::Error
        )
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FetchStatus::Launched => "Descriptor fetch launched",
            FetchStatus::HaveDesc => "Already have descriptor",
            FetchStatus::NoHsdirs => "No more HSDir available to query",
            FetchStatus::NotAllowed => "Fetching descriptors is not allowed",
            FetchStatus::MissingInfo => "Missing directory information",
            FetchStatus::Pending => "Pending descriptor fetch",
            FetchStatus::Error => "Internal error",
        };
        write!(f, "{}", msg)
    }
}

/// Outcome of a rendezvous state machine entry point.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum HandshakeOutcome {
    /// The transition succeeded, or was queued successfully.
    Success,
    /// Transient failure: a recovery action (descriptor refetch,
    /// re-extension to another introduction point) has been scheduled.
    Transient,
    /// Permanent failure: the affected circuits have been marked for close.
    Permanent,
}

/// A descriptor could not be accepted.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DescError {
    /// The body could not be decoded or decrypted with the subcredential.
    #[error("descriptor could not be decoded or decrypted")]
    Unparseable,

    /// The signing-key certificate did not validate with the blinded key,
    /// or is outside its validity window.
    ///
    /// Without this check, anyone knowing the subcredential and onion
    /// address could forge a descriptor.
    #[error("descriptor signing key certificate does not validate: {0}")]
    BadSigningCert(String),
}

/// The client-side rendezvous key material could not be computed.
#[derive(Clone, Debug, Error)]
#[error("unable to compute the rendezvous key material")]
#[non_exhaustive]
pub struct HsNtorError {}

/// A cell or request could not be handed to the circuit layer.
///
/// The usual cause is a circuit that is already closing.
#[derive(Clone, Debug, Error)]
#[error("unable to send on circuit: {reason}")]
#[non_exhaustive]
pub struct SendError {
    /// Short description of what went wrong.
    pub reason: &'static str,
}

impl SendError {
    /// Make a new `SendError` with the given reason.
    pub fn new(reason: &'static str) -> Self {
        SendError { reason }
    }
}

/// Reason attached when a circuit is marked for close.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CloseReason {
    /// The circuit finished its purpose and is no longer needed.
    Finished,
    /// The peer violated the protocol.
    TorProtocol,
    /// An internal error forced the close.
    Internal,
}

/// Reason attached when an entry stream is unattached and closed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum EndStreamReason {
    /// The onion service could not be resolved to a usable descriptor.
    ResolveFailed,
}

/// Kinds of introduction point failure recorded in the failure cache.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum IntroPointFailureKind {
    /// The introduction point nack'd or otherwise misbehaved.
    ///
    /// This is the only kind raised inside this crate.
    Generic,
    /// The introduction circuit timed out (reported by the circuit layer).
    Timeout,
    /// The introduction point could not be reached (reported by the
    /// circuit layer).
    Unreachable,
}
