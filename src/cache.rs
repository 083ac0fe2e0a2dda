//! Client-side caches: descriptors, introduction point failures, and the
//! history of HSDirs already queried.
//!
//! These are process-wide state with a well-defined lifecycle: created at
//! startup, mutated only from the event loop, and purged whole when the
//! user asks for a new identity.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::desc::HsDescriptor;
use crate::err::IntroPointFailureKind;
use crate::ident::{Ed25519Identity, HsId, IntroAuthKey};

/// How many times an introduction point may be unreachable before we stop
/// considering it.
pub(crate) const MAX_INTRO_POINT_REACHABILITY_FAILURES: u32 = 5;

/// How long an introduction point failure record stays relevant.
///
/// After this window the introduction point becomes usable again, so a
/// service whose introduction points all misbehaved briefly is retried.
pub(crate) const INTRO_FAILURE_MAX_AGE: Duration = Duration::from_secs(2 * 60);

/// Failure state for one `(service, introduction point)` pair.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct IntroPointFailureState {
    /// The introduction point nack'd or otherwise misbehaved.
    pub error: bool,
    /// The introduction circuit timed out.
    pub timed_out: bool,
    /// How many times the introduction point was unreachable.
    pub unreachable_count: u32,
}

impl IntroPointFailureState {
    /// Apply one observed failure to this record.
    fn note(&mut self, kind: IntroPointFailureKind) {
        match kind {
            IntroPointFailureKind::Generic => self.error = true,
            IntroPointFailureKind::Timeout => self.timed_out = true,
            IntroPointFailureKind::Unreachable => {
                self.unreachable_count = self.unreachable_count.saturating_add(1);
            }
        }
    }
}

/// One failure record plus the time it was first created.
///
/// The TTL runs from creation, not from the latest failure.
#[derive(Copy, Clone, Debug)]
struct IntroFailureEntry {
    /// The failure flags and counters.
    state: IntroPointFailureState,
    /// When this record was created.
    created: Instant,
}

impl IntroFailureEntry {
    /// Return true iff this record is past its useful life at `now`.
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= INTRO_FAILURE_MAX_AGE
    }
}

/// The client's process-wide caches.
#[derive(Debug, Default)]
pub(crate) struct ClientCache {
    /// Decoded descriptors by service identity.
    descs: HashMap<HsId, HsDescriptor>,
    /// Introduction point failure records.
    intro_state: HashMap<(HsId, IntroAuthKey), IntroFailureEntry>,
    /// Which HSDirs we have already queried, per base64 blinded key.
    hsdir_history: HashMap<String, HashSet<Ed25519Identity>>,
}

impl ClientCache {
    /// Look up the cached descriptor for `service`.
    pub(crate) fn lookup_descriptor(&self, service: &HsId) -> Option<&HsDescriptor> {
        self.descs.get(service)
    }

    /// Store (or replace) the cached descriptor for `service`.
    pub(crate) fn store_descriptor(&mut self, service: HsId, desc: HsDescriptor) {
        self.descs.insert(service, desc);
    }

    /// Drop every cached descriptor.
    pub(crate) fn purge_descriptors(&mut self) {
        self.descs.clear();
    }

    /// Record a failure of `kind` for the given introduction point.
    ///
    /// An expired record is restarted rather than extended, so the TTL
    /// keeps its meaning.
    pub(crate) fn note_intro_failure(
        &mut self,
        service: &HsId,
        auth_key: &IntroAuthKey,
        kind: IntroPointFailureKind,
        now: Instant,
    ) {
        let entry = self
            .intro_state
            .entry((*service, *auth_key))
            .or_insert(IntroFailureEntry {
                state: IntroPointFailureState::default(),
                created: now,
            });
        if entry.expired(now) {
            entry.state = IntroPointFailureState::default();
            entry.created = now;
        }
        entry.state.note(kind);
    }

    /// Return the live failure state for the given introduction point,
    /// if any. Expired records count as absent.
    pub(crate) fn find_intro_failure(
        &self,
        service: &HsId,
        auth_key: &IntroAuthKey,
        now: Instant,
    ) -> Option<IntroPointFailureState> {
        self.intro_state
            .get(&(*service, *auth_key))
            .filter(|entry| !entry.expired(now))
            .map(|entry| entry.state)
    }

    /// Drop every introduction point failure record.
    pub(crate) fn purge_intro_failures(&mut self) {
        self.intro_state.clear();
    }

    /// Record that `hsdir` has been queried for `base64_blinded_id`.
    pub(crate) fn note_hsdir_tried(&mut self, base64_blinded_id: &str, hsdir: &Ed25519Identity) {
        self.hsdir_history
            .entry(base64_blinded_id.to_owned())
            .or_default()
            .insert(*hsdir);
    }

    /// Return true iff `hsdir` has already been queried for
    /// `base64_blinded_id`.
    pub(crate) fn hsdir_was_tried(&self, base64_blinded_id: &str, hsdir: &Ed25519Identity) -> bool {
        self.hsdir_history
            .get(base64_blinded_id)
            .is_some_and(|tried| tried.contains(hsdir))
    }

    /// Forget which HSDirs were queried for `base64_blinded_id`, so a
    /// later retry may use all of them again.
    pub(crate) fn purge_hsdir_tried(&mut self, base64_blinded_id: &str) {
        self.hsdir_history.remove(base64_blinded_id);
    }

    /// Forget the entire HSDir query history.
    pub(crate) fn purge_hsdir_history(&mut self) {
        self.hsdir_history.clear();
    }

    /// Drop expired failure records.
    ///
    /// This is space reclamation, not correctness: lookups already treat
    /// expired records as absent.
    pub(crate) fn cleanup(&mut self, now: Instant) {
        let before = self.intro_state.len();
        self.intro_state.retain(|_, entry| !entry.expired(now));
        let dropped = before - self.intro_state.len();
        if dropped > 0 {
            debug!("dropped {} expired intro point failure records", dropped);
        }
    }
}
