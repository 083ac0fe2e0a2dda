#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![doc = include_str!("../README.md")]
// @@ begin lint list maintained by maint/add_warning @@
#![allow(renamed_and_removed_lints)] // @@REMOVE_WHEN(ci_arti_stable)
#![allow(unknown_lints)] // @@REMOVE_WHEN(ci_arti_nightly)
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::cargo_common_metadata)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![warn(clippy::rc_buffer)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::trait_duplication_in_bounds)]
#![deny(clippy::unchecked_duration_subtraction)]
#![deny(clippy::unnecessary_wraps)]
#![warn(clippy::unseparated_literal_suffix)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::let_unit_value)] // This can reasonably be done for explicitness
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::significant_drop_in_scrutinee)] // arti/-/merge_requests/588/#note_2812945
#![allow(clippy::result_large_err)] // temporary workaround for arti#587
#![allow(clippy::needless_raw_string_hashes)] // complained-about code is fine, often best
#![allow(clippy::needless_lifetimes)] // See arti#1765
//! <!-- @@ end lint list maintained by maint/add_warning @@ -->

use std::collections::{HashMap, HashSet};

mod cache;
mod cell;
mod circmap;
mod circuit;
mod desc;
pub mod env;
mod err;
mod fetch;
mod ident;
mod intro;
mod relay_info;
mod rend;
mod streams;

#[cfg(test)]
pub(crate) mod mocks;

pub use cache::IntroPointFailureState;
pub use cell::IntroduceAckStatus;
pub use circuit::CircPurpose;
pub use desc::{DescSigningCert, HsDescriptor, IntroPointDesc, LinkSpec};
pub use err::{
    CloseReason, DescError, EndStreamReason, FetchStatus, HandshakeOutcome, HsNtorError,
    IntroPointFailureKind, SendError,
};
pub use ident::{
    BlindedId, Curve25519Public, Ed25519Identity, HsId, HsNtorClientKeypair, IntroAuthKey,
    IntroEncKey, NtorRendKeys, RendCookie, RsaIdentity, Subcredential, TimePeriod,
};
pub use relay_info::{ExtendTarget, InvalidTarget};
pub use streams::WaiterState;

use cache::ClientCache;
use circmap::RendCircMap;
use circuit::CircuitTable;
use env::{CircIdOf, ClientEnv, Clock as _, DirRequestIdOf, StreamIdOf};
use streams::WaiterTable;

/// Configuration for the client core.
///
/// Construct with [`Default::default`] and assign the fields you need.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct HsClientConfig {
    /// Whether fetching onion service descriptors is allowed at all.
    ///
    /// When false, every connection request fails with
    /// [`FetchStatus::NotAllowed`].
    pub fetch_descriptors: bool,

    /// Relays (by legacy identity) we must not use as introduction
    /// points.
    pub exclude_nodes: HashSet<RsaIdentity>,

    /// Whether `exclude_nodes` is a hard requirement.
    ///
    /// When false, an excluded introduction point may still be used as a
    /// last resort if nothing else is usable.
    pub strict_nodes: bool,

    /// Whether circuits may extend to internal (non-public) addresses.
    pub allow_internal_addresses: bool,
}

impl Default for HsClientConfig {
    fn default() -> Self {
        HsClientConfig {
            fetch_descriptors: true,
            exclude_nodes: HashSet::new(),
            strict_nodes: false,
            allow_internal_addresses: false,
        }
    }
}

/// The client-side rendezvous engine for v3 onion services.
///
/// One `HsClient` holds the process-wide client context: the descriptor
/// cache, the introduction point failure cache, the history of HSDirs
/// already queried, the per-circuit identities, the rendezvous-cookie
/// map, and the registry of user streams waiting for a descriptor or a
/// circuit.
///
/// Entry points are grouped by concern:
///
/// * descriptor fetching: [`refetch_hsdesc`](HsClient::refetch_hsdesc),
///   [`descriptor_fetched`](HsClient::descriptor_fetched),
///   [`descriptor_fetch_failed`](HsClient::descriptor_fetch_failed);
/// * the rendezvous state machine:
///   [`intro_circ_opened`](HsClient::intro_circ_opened),
///   [`rend_circ_opened`](HsClient::rend_circ_opened),
///   [`send_introduce1`](HsClient::send_introduce1),
///   [`receive_introduce_ack`](HsClient::receive_introduce_ack),
///   [`receive_rendezvous_established`](HsClient::receive_rendezvous_established),
///   [`receive_rendezvous2`](HsClient::receive_rendezvous2),
///   [`reextend_intro_circuit`](HsClient::reextend_intro_circuit);
/// * stream orchestration:
///   [`connection_request`](HsClient::connection_request),
///   [`dir_info_changed`](HsClient::dir_info_changed),
///   [`note_connection_succeeded`](HsClient::note_connection_succeeded),
///   [`purge_state`](HsClient::purge_state).
///
/// Every entry point runs to completion without blocking; all waiting is
/// expressed by parking streams and resuming them from a later event.
pub struct HsClient<E: ClientEnv> {
    /// The collaborator environment.
    env: E,
    /// Configuration.
    config: HsClientConfig,
    /// Descriptors, introduction point failures, HSDir query history.
    cache: ClientCache,
    /// Per-circuit hidden-service state, keyed by the layer's handles.
    circuits: CircuitTable<CircIdOf<E>>,
    /// Rendezvous cookie → rendezvous circuit.
    rend_circs: RendCircMap<CircIdOf<E>>,
    /// User streams waiting for a descriptor or a circuit.
    waiters: WaiterTable<StreamIdOf<E>>,
    /// In-flight descriptor fetches, at most one per service.
    pending_fetches: HashMap<HsId, DirRequestIdOf<E>>,
}

impl<E: ClientEnv> HsClient<E> {
    /// Make a new client core using `env` for everything it cannot do
    /// itself.
    pub fn new(env: E, config: HsClientConfig) -> Self {
        HsClient {
            env,
            config,
            cache: ClientCache::default(),
            circuits: CircuitTable::default(),
            rend_circs: RendCircMap::default(),
            waiters: WaiterTable::default(),
            pending_fetches: HashMap::new(),
        }
    }

    /// Return a reference to the collaborator environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Return a mutable reference to the collaborator environment.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Return the configuration.
    pub fn config(&self) -> &HsClientConfig {
        &self.config
    }

    /// Perform housekeeping: reclaim expired cache records.
    ///
    /// Call this occasionally from a timer; nothing depends on it for
    /// correctness.
    pub fn run_housekeeping(&mut self) {
        let now = self.env.now();
        self.cache.cleanup(now);
    }
}
