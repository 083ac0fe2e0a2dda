//! Collaborator interfaces for the client core.
//!
//! The core is a logic engine: everything that touches the network, the
//! consensus, real cryptography, or user streams lives behind the traits
//! here. A host daemon implements them once; the test suite implements
//! them with a recording mock.
//!
//! Circuits, streams, and directory requests are identified by `Copy`
//! handles owned by the respective layer. The core keeps its own state
//! tables keyed by those handles; it never owns a circuit.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Instant, SystemTime};

use crate::desc::{DescSigningCert, HsDescriptor, IntroPointDesc};
use crate::err::{CloseReason, DescError, EndStreamReason, HsNtorError, SendError};
use crate::ident::{
    BlindedId, Curve25519Public, Ed25519Identity, HsId, HsNtorClientKeypair, IntroAuthKey,
    IntroEncKey, NtorRendKeys, RendCookie, RsaIdentity, Subcredential, TimePeriod,
};
use crate::relay_info::ExtendTarget;

/// Access to the host's clocks.
pub trait Clock {
    /// Return the current monotonic time.
    fn now(&self) -> Instant;

    /// Return the current wall-clock time.
    fn wallclock(&self) -> SystemTime;
}

/// A view onto the network consensus and node directory.
pub trait NetDirView {
    /// Return true iff a live consensus is available.
    fn have_live_consensus(&self) -> bool;

    /// Return true iff we have enough directory information to build
    /// circuits.
    fn have_minimum_dir_info(&self) -> bool;

    /// Return the current time period.
    fn current_time_period(&self) -> TimePeriod;

    /// Return the directories responsible for `blinded_id` during
    /// `period`, in hash-ring order.
    fn responsible_hsdirs(&self, blinded_id: &BlindedId, period: TimePeriod)
        -> Vec<Ed25519Identity>;

    /// Return true iff the identified relay supports acting as a v3
    /// rendezvous point.
    fn node_supports_v3_rendezvous(&self, id: &RsaIdentity) -> bool;
}

/// The hidden-service cryptography the core delegates.
pub trait HsCrypto {
    /// Derive the blinded key for `service` during `period`.
    fn blind(&self, service: &HsId, period: TimePeriod) -> BlindedId;

    /// Derive the subcredential for `service` and `blinded_id`.
    fn subcredential(&self, service: &HsId, blinded_id: &BlindedId) -> Subcredential;

    /// Generate a fresh ephemeral keypair for one rendezvous attempt.
    fn rend_client_keypair(&mut self) -> HsNtorClientKeypair;

    /// Complete the client side of the hidden service ntor handshake,
    /// yielding the key seed and the expected RENDEZVOUS2 MAC.
    fn hs_ntor_client_finish(
        &self,
        intro_auth_pk: &IntroAuthKey,
        client_kp: &HsNtorClientKeypair,
        intro_enc_pk: &IntroEncKey,
        server_pk: &Curve25519Public,
    ) -> Result<NtorRendKeys, HsNtorError>;
}

/// The descriptor codec.
pub trait DescCodec {
    /// Decode and decrypt a descriptor body fetched from an HSDir.
    fn decode_descriptor(
        &self,
        body: &[u8],
        subcredential: &Subcredential,
    ) -> Result<HsDescriptor, DescError>;

    /// Check that `cert` is cross-signed by `blinded_id` and time-valid
    /// at `now`.
    fn check_signing_cert(
        &self,
        cert: &DescSigningCert,
        blinded_id: &BlindedId,
        now: SystemTime,
    ) -> Result<(), DescError>;
}

/// The circuit layer: transport, path selection, and cell construction.
pub trait CircuitLayer {
    /// Handle naming one circuit.
    type CircId: Copy + Eq + Hash + Debug;

    /// Handle naming one in-flight directory request.
    type DirRequestId: Copy + Eq + Debug;

    /// Launch an anonymous directory request fetching the descriptor
    /// named by `resource` (the base64 blinded key) from `hsdir`.
    fn launch_anonymous_hsdesc_request(
        &mut self,
        hsdir: &Ed25519Identity,
        resource: &str,
        service: &HsId,
    ) -> Result<Self::DirRequestId, SendError>;

    /// Mark an in-flight directory request for close.
    fn close_dir_request(&mut self, request: Self::DirRequestId);

    /// Build and send an INTRODUCE1 cell on `intro_circ`, introducing to
    /// `ip` and asking the service to meet us at `rend_circ`'s rendezvous
    /// point.
    fn send_introduce1(
        &mut self,
        intro_circ: Self::CircId,
        rend_circ: Self::CircId,
        ip: &IntroPointDesc,
        subcredential: &Subcredential,
    ) -> Result<(), SendError>;

    /// Send an ESTABLISH_RENDEZVOUS cell carrying `cookie` on `rend_circ`.
    fn send_establish_rendezvous(
        &mut self,
        rend_circ: Self::CircId,
        cookie: &RendCookie,
    ) -> Result<(), SendError>;

    /// Install end-to-end encryption derived from `ntor_key_seed` on the
    /// rendezvous circuit and finalize it.
    fn setup_e2e_rend_circ(
        &mut self,
        rend_circ: Self::CircId,
        ntor_key_seed: &[u8; 32],
    ) -> Result<(), SendError>;

    /// Extend an open circuit to a new final hop.
    fn extend_to_new_exit(
        &mut self,
        circ: Self::CircId,
        target: &ExtendTarget,
    ) -> Result<(), SendError>;

    /// Return how many RELAY_EARLY cells the circuit may still send.
    fn remaining_relay_early_cells(&self, circ: Self::CircId) -> u8;

    /// Return true iff the circuit is closing or already closed.
    fn circuit_is_closing(&self, circ: Self::CircId) -> bool;

    /// Mark a circuit for close with the given reason.
    fn mark_for_close(&mut self, circ: Self::CircId, reason: CloseReason);

    /// Path-bias accounting: we attempted to use this circuit.
    fn pathbias_count_use_attempt(&mut self, circ: Self::CircId);

    /// Path-bias accounting: this circuit was successfully used.
    fn pathbias_mark_use_success(&mut self, circ: Self::CircId);
}

/// The user stream subsystem.
pub trait StreamLayer {
    /// Handle naming one entry stream.
    type StreamId: Copy + Eq + Hash + Debug;

    /// Unattach the stream and close it for `reason`.
    fn mark_unattached(&mut self, stream: Self::StreamId, reason: EndStreamReason);

    /// Mark the stream as waiting for a circuit to attach to.
    fn mark_pending_circuit(&mut self, stream: Self::StreamId);

    /// Remove the stream from the circuit pending set.
    fn mark_non_pending_circuit(&mut self, stream: Self::StreamId);

    /// Ask the attacher to try attaching pending streams now.
    fn attach_pending_streams(&mut self);
}

/// Control-port event sink.
pub trait ControlEvents {
    /// A descriptor fetch was requested from `hsdir` for `service`.
    fn desc_requested_event(
        &mut self,
        service: &HsId,
        base64_blinded_id: &str,
        hsdir: &Ed25519Identity,
    );
}

/// Everything the client core needs from its host, bundled.
///
/// Blanket-implemented for any type providing all of the collaborator
/// traits; hosts and tests implement those on a single environment type.
pub trait ClientEnv:
    Clock + NetDirView + HsCrypto + DescCodec + CircuitLayer + StreamLayer + ControlEvents
{
}

impl<T> ClientEnv for T where
    T: Clock + NetDirView + HsCrypto + DescCodec + CircuitLayer + StreamLayer + ControlEvents
{
}

/// Shorthand for the circuit handle type of an environment.
pub(crate) type CircIdOf<E> = <E as CircuitLayer>::CircId;

/// Shorthand for the directory request handle type of an environment.
pub(crate) type DirRequestIdOf<E> = <E as CircuitLayer>::DirRequestId;

/// Shorthand for the stream handle type of an environment.
pub(crate) type StreamIdOf<E> = <E as StreamLayer>::StreamId;
