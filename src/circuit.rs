//! Per-circuit identities and the core's view of its circuits.
//!
//! The circuit layer owns the circuits; for every circuit taking part in
//! a rendezvous attempt the core keeps a small state entry keyed by the
//! layer's handle: the hidden-service purpose, the identity material tied
//! to the circuit, and bookkeeping timestamps.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

use crate::ident::{HsId, HsNtorClientKeypair, IntroAuthKey, IntroEncKey, RendCookie};

/// Hidden-service purpose of a client circuit.
///
/// These advance monotonically along the intro track
/// (`Introducing` → `IntroAckWait` → `IntroAcked`) or the rend track
/// (`EstablishRend` → `RendReady`[`IntroAcked`] → `RendJoined`), except
/// that a nack moves an intro circuit back to `Introducing` for
/// re-extension.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CircPurpose {
    /// Intro circuit built; INTRODUCE1 not yet sent.
    Introducing,
    /// INTRODUCE1 sent; awaiting INTRODUCE_ACK.
    IntroAckWait,
    /// INTRODUCE_ACK received; the intro circuit is done.
    IntroAcked,
    /// Rend circuit built; ESTABLISH_RENDEZVOUS sent (or about to be).
    EstablishRend,
    /// RENDEZVOUS_ESTABLISHED received; awaiting RENDEZVOUS2.
    RendReady,
    /// Same as `RendReady`, but the INTRODUCE_ACK was already observed.
    RendReadyIntroAcked,
    /// RENDEZVOUS2 authenticated; end-to-end keys installed.
    RendJoined,
}

impl CircPurpose {
    /// Return true iff this is a purpose an intro circuit can have.
    pub(crate) fn is_intro(self) -> bool {
        matches!(
            self,
            CircPurpose::Introducing | CircPurpose::IntroAckWait | CircPurpose::IntroAcked
        )
    }

    /// Return true iff a rendezvous circuit with this purpose has
    /// completed its ESTABLISH_RENDEZVOUS exchange.
    pub(crate) fn is_established_rend(self) -> bool {
        matches!(
            self,
            CircPurpose::RendReady | CircPurpose::RendReadyIntroAcked | CircPurpose::RendJoined
        )
    }
}

/// Identity material attached to an introduction circuit.
#[derive(Clone, Debug)]
pub(crate) struct IntroIdent {
    /// The service this circuit introduces to.
    pub(crate) identity_pk: HsId,
    /// The authentication key of the introduction point the circuit
    /// currently ends at.
    ///
    /// `None` until the opened circuit has been matched against the
    /// descriptor (and again, briefly, after a re-extension).
    pub(crate) intro_auth_pk: Option<IntroAuthKey>,
    /// The rendezvous cookie of the paired rendezvous circuit.
    ///
    /// Set when INTRODUCE1 is sent; it is how the INTRODUCE_ACK handler
    /// finds the other half of the pair.
    pub(crate) rendezvous_cookie: Option<RendCookie>,
}

/// Identity material attached to a rendezvous circuit.
#[derive(Clone, Debug)]
pub(crate) struct RendIdent {
    /// The service this rendezvous is for.
    pub(crate) identity_pk: HsId,
    /// The cookie this circuit gave its rendezvous point.
    pub(crate) rendezvous_cookie: RendCookie,
    /// Our ephemeral keypair for the rendezvous handshake.
    pub(crate) rendezvous_client_kp: HsNtorClientKeypair,
    /// The auth key of the introduction point used for this attempt.
    ///
    /// Copied over when INTRODUCE1 is sent; the RENDEZVOUS2 handshake
    /// needs it.
    pub(crate) intro_auth_pk: Option<IntroAuthKey>,
    /// The encryption key of the introduction point used for this
    /// attempt. Also copied over when INTRODUCE1 is sent.
    pub(crate) intro_enc_pk: Option<IntroEncKey>,
}

/// The identity material of one core-managed circuit.
#[derive(Clone, Debug)]
pub(crate) enum CircIdent {
    /// An introduction circuit.
    Intro(IntroIdent),
    /// A rendezvous circuit.
    Rend(RendIdent),
}

/// The core's state for one circuit.
#[derive(Clone, Debug)]
pub(crate) struct CircEntry {
    /// The circuit's hidden-service purpose.
    pub(crate) purpose: CircPurpose,
    /// The identity material attached to the circuit.
    pub(crate) ident: CircIdent,
    /// When the circuit last entered a state the building-expiry logic
    /// cares about.
    pub(crate) dirty_since: Option<Instant>,
    /// Whether we have already asked the circuit layer to close this
    /// circuit. Guarantees close-exactly-once.
    pub(crate) marked_for_close: bool,
}

impl CircEntry {
    /// Return the intro identity, if this is an intro circuit.
    pub(crate) fn intro_ident(&self) -> Option<&IntroIdent> {
        match &self.ident {
            CircIdent::Intro(ident) => Some(ident),
            CircIdent::Rend(_) => None,
        }
    }

    /// Return the intro identity mutably, if this is an intro circuit.
    pub(crate) fn intro_ident_mut(&mut self) -> Option<&mut IntroIdent> {
        match &mut self.ident {
            CircIdent::Intro(ident) => Some(ident),
            CircIdent::Rend(_) => None,
        }
    }

    /// Return the rend identity, if this is a rendezvous circuit.
    pub(crate) fn rend_ident(&self) -> Option<&RendIdent> {
        match &self.ident {
            CircIdent::Rend(ident) => Some(ident),
            CircIdent::Intro(_) => None,
        }
    }

    /// Return the rend identity mutably, if this is a rendezvous circuit.
    pub(crate) fn rend_ident_mut(&mut self) -> Option<&mut RendIdent> {
        match &mut self.ident {
            CircIdent::Rend(ident) => Some(ident),
            CircIdent::Intro(_) => None,
        }
    }

    /// The service this circuit belongs to.
    pub(crate) fn service(&self) -> HsId {
        match &self.ident {
            CircIdent::Intro(ident) => ident.identity_pk,
            CircIdent::Rend(ident) => ident.identity_pk,
        }
    }
}

/// The core's state entries for all its circuits, keyed by the circuit
/// layer's handles.
#[derive(Debug)]
pub(crate) struct CircuitTable<C> {
    /// The entries.
    entries: HashMap<C, CircEntry>,
}

impl<C> Default for CircuitTable<C> {
    fn default() -> Self {
        CircuitTable {
            entries: HashMap::new(),
        }
    }
}

impl<C: Copy + Eq + Hash + Debug> CircuitTable<C> {
    /// Insert (or replace) the entry for `circ`.
    pub(crate) fn insert(&mut self, circ: C, entry: CircEntry) {
        self.entries.insert(circ, entry);
    }

    /// Return the entry for `circ`, if the core is tracking it.
    pub(crate) fn get(&self, circ: C) -> Option<&CircEntry> {
        self.entries.get(&circ)
    }

    /// Return the entry for `circ` mutably.
    pub(crate) fn get_mut(&mut self, circ: C) -> Option<&mut CircEntry> {
        self.entries.get_mut(&circ)
    }

    /// Drop the entry for `circ`, returning it.
    pub(crate) fn remove(&mut self, circ: C) -> Option<CircEntry> {
        self.entries.remove(&circ)
    }
}
