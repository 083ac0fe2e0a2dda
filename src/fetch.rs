//! Fetching onion service descriptors: eligibility, directory choice, and
//! result handling.
//!
//! At most one descriptor fetch is in flight per service at any time;
//! that is enforced by the `Pending` gate check together with the
//! `pending_fetches` table that tags every launched request with its
//! service.

use safelog::sensitive as sv;
use tracing::{debug, info, warn};

use crate::env::{
    CircuitLayer as _, ClientEnv, Clock as _, ControlEvents as _, DescCodec as _, HsCrypto as _,
    NetDirView as _,
};
use crate::err::FetchStatus;
use crate::ident::HsId;
use crate::HsClient;

impl<E: ClientEnv> HsClient<E> {
    /// Decide whether a descriptor fetch for `service` may be issued now.
    ///
    /// The order of the checks is significant: the later ones consult
    /// progressively more expensive state.
    fn can_refetch_desc(&self, service: &HsId) -> Result<(), FetchStatus> {
        // Are we configured to fetch descriptors?
        if !self.config.fetch_descriptors {
            warn!(
                "We received an onion address for a hidden service descriptor \
                 but we are configured to not fetch."
            );
            return Err(FetchStatus::NotAllowed);
        }

        // Without a live consensus we can't do any client actions. It is
        // needed to compute the hashring for a service.
        if !self.env.have_live_consensus() {
            info!(
                "Can't fetch descriptor for service {} because we are missing a \
                 live consensus. Stalling connection.",
                sv(*service)
            );
            return Err(FetchStatus::MissingInfo);
        }

        if !self.env.have_minimum_dir_info() {
            info!(
                "Can't fetch descriptor for service {} because we don't have \
                 enough descriptors. Stalling connection.",
                sv(*service)
            );
            return Err(FetchStatus::MissingInfo);
        }

        // Is fetching a descriptor for this service useful to us right now?
        if let Some(desc) = self.cache.lookup_descriptor(service) {
            if self.any_intro_points_usable(service, desc) {
                info!(
                    "We would fetch a hidden service descriptor but we already \
                     have a usable descriptor."
                );
                return Err(FetchStatus::HaveDesc);
            }
        }

        // Don't try to refetch while we have a pending request for it.
        if self.pending_fetches.contains_key(service) {
            info!("Already a pending directory request. Waiting on it.");
            return Err(FetchStatus::Pending);
        }

        Ok(())
    }

    /// Pick a responsible HSDir for `service` that we have not queried
    /// yet, and launch an anonymous descriptor fetch to it.
    fn fetch_v3_desc(&mut self, service: &HsId) -> FetchStatus {
        let period = self.env.current_time_period();
        let blinded = self.env.blind(service, period);
        let resource = blinded.to_base64();

        let responsible = self.env.responsible_hsdirs(&blinded, period);
        debug!(
            "Found {} responsible HSDirs and about to pick one.",
            responsible.len()
        );

        // First responsible directory we have not tried for this blinded
        // key; the ring order makes this deterministic.
        let hsdir = responsible
            .iter()
            .find(|&hsdir| !self.cache.hsdir_was_tried(&resource, hsdir));
        let Some(hsdir) = hsdir else {
            info!("Couldn't pick a v3 hsdir.");
            return FetchStatus::NoHsdirs;
        };

        let request = match self
            .env
            .launch_anonymous_hsdesc_request(hsdir, &resource, service)
        {
            Ok(request) => request,
            Err(err) => {
                warn!("Unable to launch a descriptor fetch request: {}", err);
                return FetchStatus::Error;
            }
        };

        self.cache.note_hsdir_tried(&resource, hsdir);
        self.pending_fetches.insert(*service, request);

        info!(
            "Descriptor fetch request for service {} with blinded key {} to \
             directory {}",
            sv(*service),
            sv(resource.as_str()),
            sv(*hsdir)
        );

        // Fire a REQUESTED event on the control port.
        self.env.desc_requested_event(service, &resource, hsdir);

        FetchStatus::Launched
    }

    /// Launch a descriptor fetch for `service`, if one is allowed and
    /// needed.
    ///
    /// If the attempt ends in a state that cannot recover by waiting
    /// (no directories left, fetching disallowed, internal error), the
    /// streams waiting on this service are closed and the HSDir history
    /// is purged so a later user-initiated retry starts fresh.
    pub fn refetch_hsdesc(&mut self, service: &HsId) -> FetchStatus {
        let status = match self.can_refetch_desc(service) {
            Err(status) => status,
            Ok(()) => self.fetch_v3_desc(service),
        };

        if status.closes_waiters() {
            self.close_all_waiters_for(service, status);
            // Remove HSDir fetch attempts so that we can retry later if
            // the user wants us to, regardless of whether we closed any
            // streams.
            self.purge_hsdir_request_history(service);
        }
        status
    }

    /// A descriptor body for `service` has arrived from a directory.
    ///
    /// Recomputes the blinded key and subcredential for the current
    /// period, decodes the body, verifies the signing-key certificate
    /// against the blinded key, stores the result, and wakes the waiting
    /// streams. A body that fails validation is dropped.
    pub fn descriptor_fetched(&mut self, service: &HsId, body: &[u8]) {
        // Whatever happens next, the request is no longer in flight.
        self.pending_fetches.remove(service);

        let period = self.env.current_time_period();
        let blinded = self.env.blind(service, period);
        let subcredential = self.env.subcredential(service, &blinded);

        let desc = match self.env.decode_descriptor(body, &subcredential) {
            Ok(desc) => desc,
            Err(err) => {
                warn!(
                    "Failed to decode descriptor for service {}: {}",
                    sv(*service),
                    err
                );
                return;
            }
        };

        // Make sure the descriptor signing key cross-certifies with the
        // computed blinded key. Without this validation, anyone knowing
        // the subcredential and onion address could forge a descriptor.
        let now = self.env.wallclock();
        if let Err(err) = self
            .env
            .check_signing_cert(desc.signing_key_cert(), &blinded, now)
        {
            warn!(
                "Descriptor signing key certificate signature doesn't validate \
                 with computed blinded key: {}",
                err
            );
            return;
        }

        debug!("Stored descriptor for service {}", sv(*service));
        self.cache.store_descriptor(*service, desc);
        self.wake_waiters_on_descriptor(service);
    }

    /// The directory subsystem reports that the fetch for `service` ended
    /// with `status` instead of a descriptor.
    ///
    /// For the fatal statuses the waiting streams are closed and the
    /// HSDir history purged; otherwise the waiters stay parked until the
    /// directory information changes.
    pub fn descriptor_fetch_failed(&mut self, service: &HsId, status: FetchStatus) {
        self.pending_fetches.remove(service);

        info!(
            "Descriptor fetch for service {} failed: {}",
            sv(*service),
            status
        );

        if status.closes_waiters() {
            self.close_all_waiters_for(service, status);
            self.purge_hsdir_request_history(service);
        }
    }

    /// Forget which HSDirs were already queried for `service`.
    ///
    /// Uses the blinded key of the *current* period. It is possible we
    /// just moved to a new time period, in which case the previous
    /// period's history is left to expire on its own; nobody will ask for
    /// it again.
    pub(crate) fn purge_hsdir_request_history(&mut self, service: &HsId) {
        let period = self.env.current_time_period();
        let blinded = self.env.blind(service, period);
        self.cache.purge_hsdir_tried(&blinded.to_base64());
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::mixed_attributes_style)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_duration_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::mocks::{make_client, make_descriptor, service_id};

    #[test]
    fn gate_checks_in_order() {
        let mut client = make_client();
        let service = service_id(1);

        // Configuration wins over everything else.
        client.config.fetch_descriptors = false;
        client.env.state_mut().have_live_consensus = false;
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::NotAllowed);

        client.config.fetch_descriptors = true;
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::MissingInfo);

        client.env.state_mut().have_live_consensus = true;
        client.env.state_mut().have_minimum_dir_info = false;
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::MissingInfo);

        client.env.state_mut().have_minimum_dir_info = true;
        client
            .cache
            .store_descriptor(service, make_descriptor(&service, 2));
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::HaveDesc);
    }

    #[test]
    fn launch_records_request_and_event() {
        let mut client = make_client();
        let service = service_id(1);

        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::Launched);
        assert!(client.pending_fetches.contains_key(&service));

        let state = client.env.state();
        assert_eq!(state.launched_dir_requests.len(), 1);
        let (hsdir, resource, for_service) = state.launched_dir_requests[0].clone();
        assert_eq!(for_service, service);
        // The resource is the URL-safe unpadded base64 blinded key.
        assert_eq!(resource.len(), 43);
        // The control port heard about it, naming the same directory.
        assert_eq!(state.desc_requested_events.len(), 1);
        assert_eq!(state.desc_requested_events[0].2, hsdir);
    }

    #[test]
    fn second_refetch_is_pending() {
        let mut client = make_client();
        let service = service_id(1);

        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::Launched);
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::Pending);
        // Still only one request ever launched.
        assert_eq!(client.env.state().launched_dir_requests.len(), 1);
    }

    #[test]
    fn exhausting_hsdirs_reports_no_hsdirs() {
        let mut client = make_client();
        let service = service_id(1);
        // The mock network has three responsible HSDirs.
        for _ in 0..3 {
            assert_eq!(client.refetch_hsdesc(&service), FetchStatus::Launched);
            // Pretend each fetch failed without a body.
            client.descriptor_fetch_failed(&service, FetchStatus::MissingInfo);
        }
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::NoHsdirs);
        assert_eq!(client.env.state().launched_dir_requests.len(), 3);

        // The history was purged along with the NoHsdirs failure, so a
        // later retry starts over.
        assert_eq!(client.refetch_hsdesc(&service), FetchStatus::Launched);
    }

    #[test]
    fn fetched_descriptor_is_validated_and_stored() {
        let mut client = make_client();
        let service = service_id(1);
        client
            .env
            .state_mut()
            .decodable
            .insert(b"body".to_vec(), make_descriptor(&service, 2));

        client.refetch_hsdesc(&service);
        client.descriptor_fetched(&service, b"body");

        assert!(client.cache.lookup_descriptor(&service).is_some());
        assert!(!client.pending_fetches.contains_key(&service));
    }

    #[test]
    fn undecodable_descriptor_is_dropped() {
        let mut client = make_client();
        let service = service_id(1);

        client.refetch_hsdesc(&service);
        client.descriptor_fetched(&service, b"garbage");

        assert!(client.cache.lookup_descriptor(&service).is_none());
    }

    #[test]
    fn bad_signing_cert_rejects_descriptor() {
        let mut client = make_client();
        let service = service_id(1);
        client
            .env
            .state_mut()
            .decodable
            .insert(b"body".to_vec(), make_descriptor(&service, 2));
        client.env.state_mut().signing_cert_valid = false;

        client.refetch_hsdesc(&service);
        client.descriptor_fetched(&service, b"body");

        assert!(client.cache.lookup_descriptor(&service).is_none());
    }
}
