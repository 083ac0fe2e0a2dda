//! The waiter registry: user streams parked until a descriptor or a
//! circuit is available, and the orchestration that moves them.
//!
//! The stream subsystem owns the streams; this module tracks, per stream
//! handle, which service it wants and which coarse state it is in, and
//! tells the stream layer about every transition.

use std::time::Instant;

use safelog::sensitive as sv;
use tor_error::{internal, ErrorReport as _};
use tracing::{debug, info, warn};

use crate::env::{CircuitLayer as _, ClientEnv, Clock as _, StreamIdOf, StreamLayer as _};
use crate::err::{EndStreamReason, FetchStatus};
use crate::ident::HsId;
use crate::HsClient;

/// Coarse state of one waiting stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum WaiterState {
    /// Parked until a usable descriptor for its service is cached.
    AwaitingDescriptor,
    /// Descriptor available; waiting for the attacher and its circuits.
    AwaitingCircuit,
    /// Successfully attached to a joined circuit.
    Attached,
}

/// One tracked stream.
#[derive(Clone, Debug)]
pub(crate) struct Waiter<S> {
    /// The stream layer's handle for this stream.
    pub(crate) stream: S,
    /// The onion service the stream wants to reach.
    pub(crate) service: HsId,
    /// Where the stream is in its life.
    pub(crate) state: WaiterState,
    /// Last time this stream made progress.
    ///
    /// Reset when a descriptor arrives so the host's stream expiry does
    /// not reap a stream that is finally progressing.
    pub(crate) last_activity: Instant,
}

/// All tracked streams.
///
/// A scan-based registry: lookups iterate. The number of simultaneously
/// waiting streams is small, and a scan keeps one source of truth.
#[derive(Debug)]
pub(crate) struct WaiterTable<S> {
    /// The tracked streams.
    pub(crate) entries: Vec<Waiter<S>>,
}

impl<S> Default for WaiterTable<S> {
    fn default() -> Self {
        WaiterTable {
            entries: Vec::new(),
        }
    }
}

impl<E: ClientEnv> HsClient<E> {
    /// A user stream wants to reach `service`.
    ///
    /// The stream is registered and either moved straight to waiting for
    /// a circuit (if a usable descriptor is already cached) or parked
    /// while a descriptor fetch is arranged. The returned status is the
    /// fetch status; fatal statuses will already have closed the stream.
    pub fn connection_request(&mut self, stream: StreamIdOf<E>, service: HsId) -> FetchStatus {
        // A handle may be reused after a close; drop any stale entry.
        self.waiters.entries.retain(|w| w.stream != stream);

        let now = self.env.now();
        let usable = self
            .cache
            .lookup_descriptor(&service)
            .map_or(false, |desc| self.any_intro_points_usable(&service, desc));

        if usable {
            self.waiters.entries.push(Waiter {
                stream,
                service,
                state: WaiterState::AwaitingCircuit,
                last_activity: now,
            });
            self.env.mark_pending_circuit(stream);
            return FetchStatus::HaveDesc;
        }

        self.waiters.entries.push(Waiter {
            stream,
            service,
            state: WaiterState::AwaitingDescriptor,
            last_activity: now,
        });
        self.env.mark_non_pending_circuit(stream);
        self.refetch_hsdesc(&service)
    }

    /// Put every stream of `service` that is waiting on a circuit back to
    /// waiting for a descriptor.
    ///
    /// Used when the cached descriptor turned out to be useless after
    /// all and a refetch is under way.
    pub(crate) fn flag_all_conn_wait_desc(&mut self, service: &HsId) {
        let mut i = 0;
        while i < self.waiters.entries.len() {
            let waiter = &mut self.waiters.entries[i];
            i += 1;
            if waiter.service != *service || waiter.state != WaiterState::AwaitingCircuit {
                continue;
            }
            waiter.state = WaiterState::AwaitingDescriptor;
            let stream = waiter.stream;
            self.env.mark_non_pending_circuit(stream);
        }
    }

    /// A descriptor for `service` has just been cached; wake the streams
    /// parked on it.
    ///
    /// If the descriptor has no usable introduction points the waiters
    /// are closed instead, and the HSDir request history is purged so the
    /// next user attempt may query the directories again.
    pub(crate) fn wake_waiters_on_descriptor(&mut self, service: &HsId) {
        // We were just called because the descriptor was stored; not
        // finding one means a bigger problem.
        let usable = match self.cache.lookup_descriptor(service) {
            None => {
                warn!(
                    "{}",
                    internal!("woken for a descriptor that is not in the cache").report()
                );
                return;
            }
            Some(desc) => self.any_intro_points_usable(service, desc),
        };

        let now = self.env.now();
        let mut purge_history = false;
        let mut i = 0;
        while i < self.waiters.entries.len() {
            let waiter = &mut self.waiters.entries[i];
            if waiter.service != *service || waiter.state != WaiterState::AwaitingDescriptor {
                i += 1;
                continue;
            }

            if !usable {
                info!("Hidden service descriptor is unusable. Closing streams.");
                let stream = waiter.stream;
                self.waiters.entries.remove(i);
                self.env
                    .mark_unattached(stream, EndStreamReason::ResolveFailed);
                // We can't use the descriptor, so remove the directory
                // request history; otherwise the next attempt would be
                // blocked from asking the HSDirs again.
                purge_history = true;
                continue;
            }

            info!("Descriptor has arrived. Launching circuits.");
            // The stream can now proceed; reset its activity time so it
            // is considered fresh and not closed too early.
            waiter.state = WaiterState::AwaitingCircuit;
            waiter.last_activity = now;
            let stream = waiter.stream;
            self.env.mark_pending_circuit(stream);
            i += 1;
        }

        if purge_history {
            self.purge_hsdir_request_history(service);
        }
    }

    /// Close every stream of `service` still waiting on a descriptor.
    pub(crate) fn close_all_waiters_for(&mut self, service: &HsId, status: FetchStatus) {
        let mut count = 0_u32;
        let mut i = 0;
        while i < self.waiters.entries.len() {
            let waiter = &self.waiters.entries[i];
            if waiter.service != *service || waiter.state != WaiterState::AwaitingDescriptor {
                i += 1;
                continue;
            }
            let stream = waiter.stream;
            self.waiters.entries.remove(i);
            self.env
                .mark_unattached(stream, EndStreamReason::ResolveFailed);
            count += 1;
        }

        if count > 0 {
            info!(
                "Closed {} streams for service {} for reason resolve failed. \
                 Fetch status: {}.",
                count,
                sv(*service),
                status
            );
        }
    }

    /// The directory information changed; retry every stream still
    /// waiting for a descriptor.
    pub fn dir_info_changed(&mut self) {
        // We possibly have a live consensus or the minimum directory
        // information now, so some stalled fetches may work this time.
        let snapshot: Vec<(StreamIdOf<E>, HsId)> = self
            .waiters
            .entries
            .iter()
            .filter(|w| w.state == WaiterState::AwaitingDescriptor)
            .map(|w| (w.stream, w.service))
            .collect();

        for (stream, service) in snapshot {
            // A refetch for an earlier stream can close later ones (for
            // example on an internal error), so check the entry is still
            // there.
            let still_parked = self
                .waiters
                .entries
                .iter()
                .any(|w| w.stream == stream && w.state == WaiterState::AwaitingDescriptor);
            if !still_parked {
                continue;
            }

            let status = self.refetch_hsdesc(&service);
            if status == FetchStatus::HaveDesc {
                // This cannot happen in theory: when a descriptor
                // arrives, the waiters are woken immediately, which moves
                // them out of the descriptor-wait state.
                warn!(
                    "{}",
                    internal!("parked waiter found an already-usable descriptor").report()
                );
            }
            // On an error, either the streams were closed or we are still
            // missing directory information; parked streams will be
            // retried on the next change.
        }
    }

    /// Purge all potentially remotely-detectable client state. Called on
    /// the user's new-identity signal.
    ///
    /// Idempotent: a second call finds nothing left to do.
    pub fn purge_state(&mut self) {
        // Cancel in-flight descriptor fetches first; once done, nothing
        // can race a late-arriving body against the purges below.
        for (service, request) in self.pending_fetches.drain() {
            debug!(
                "Marking for close a directory connection fetching a hidden \
                 service descriptor for service {}.",
                sv(service)
            );
            self.env.close_dir_request(request);
        }
        info!("Hidden service client descriptor fetches cancelled.");

        // Purge the introduction point state cache.
        self.cache.purge_intro_failures();
        // Purge the descriptor cache.
        self.cache.purge_descriptors();
        // Purge the HSDir request history.
        self.cache.purge_hsdir_history();

        info!("Hidden service client state has been purged.");
    }

    /// A circuit successfully connected to `service` on behalf of some
    /// stream.
    ///
    /// Purges the HSDir request history for the service, so later
    /// fetches are unrestricted. The introduction point failure state is
    /// deliberately left alone: reaching the service through one
    /// introduction point says nothing about the others, and those
    /// records expire on their own.
    pub fn note_connection_succeeded(&mut self, service: &HsId) {
        self.purge_hsdir_request_history(service);
    }

    /// The stream subsystem is done with `stream`; stop tracking it.
    pub fn stream_closed(&mut self, stream: StreamIdOf<E>) {
        self.waiters.entries.retain(|w| w.stream != stream);
    }
}
