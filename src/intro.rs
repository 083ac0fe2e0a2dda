//! Choosing introduction points from a descriptor.
//!
//! An introduction point is *usable* if its failure-cache record (if any)
//! shows no error, no timeout, and fewer unreachability failures than the
//! threshold. Selection among usable points is uniformly at random, with
//! a deliberate last-resort policy for excluded nodes.

use rand::{CryptoRng, Rng};
use safelog::sensitive as sv;
use tracing::{info, warn};

use crate::cache::MAX_INTRO_POINT_REACHABILITY_FAILURES;
use crate::desc::{HsDescriptor, IntroPointDesc};
use crate::env::{ClientEnv, Clock as _};
use crate::err::IntroPointFailureKind;
use crate::ident::{HsId, IntroAuthKey, RsaIdentity};
use crate::relay_info::{ipt_to_extend_target, ExtendTarget};
use crate::HsClient;

impl<E: ClientEnv> HsClient<E> {
    /// Record a failure of the given introduction point.
    ///
    /// The handshake records [`Generic`](IntroPointFailureKind::Generic)
    /// failures itself; this entry point exists for the circuit layer,
    /// which observes timeouts and unreachability.
    pub fn note_intro_point_failure(
        &mut self,
        service: &HsId,
        auth_key: &IntroAuthKey,
        kind: IntroPointFailureKind,
    ) {
        let now = self.env.now();
        self.cache.note_intro_failure(service, auth_key, kind, now);
    }

    /// Return true iff `ip` is usable for `service` according to the
    /// failure cache.
    pub(crate) fn intro_point_is_usable(&self, service: &HsId, ip: &IntroPointDesc) -> bool {
        let now = self.env.now();
        let Some(state) = self.cache.find_intro_failure(service, ip.auth_key(), now) else {
            // Never had any problem with it, so: usable.
            return true;
        };
        if state.error {
            info!(
                "Intro point with auth key {} had an error. Not usable",
                sv(*ip.auth_key())
            );
            return false;
        }
        if state.timed_out {
            info!(
                "Intro point with auth key {} timed out. Not usable",
                sv(*ip.auth_key())
            );
            return false;
        }
        if state.unreachable_count >= MAX_INTRO_POINT_REACHABILITY_FAILURES {
            info!(
                "Intro point with auth key {} unreachable. Not usable",
                sv(*ip.auth_key())
            );
            return false;
        }
        true
    }

    /// Return true iff at least one introduction point in `desc` is
    /// usable for `service`.
    pub(crate) fn any_intro_points_usable(&self, service: &HsId, desc: &HsDescriptor) -> bool {
        desc.intro_points()
            .iter()
            .any(|ip| self.intro_point_is_usable(service, ip))
    }

    /// Pick an introduction point for `service` and translate it into an
    /// extend target, uniformly at random among the usable ones.
    ///
    /// Returns `None` if there is no cached descriptor, or no usable
    /// introduction point that we are able and allowed to extend to.
    pub fn pick_intro_for_service(&self, service: &HsId) -> Option<ExtendTarget> {
        self.pick_intro_with_rng(service, &mut rand::thread_rng())
    }

    /// As [`pick_intro_for_service`](HsClient::pick_intro_for_service),
    /// with a caller-supplied source of randomness.
    pub(crate) fn pick_intro_with_rng<R: Rng + CryptoRng>(
        &self,
        service: &HsId,
        rng: &mut R,
    ) -> Option<ExtendTarget> {
        let desc = match self.cache.lookup_descriptor(service) {
            Some(desc) => desc,
            None => {
                info!(
                    "Unable to randomly select an introduction point for service {} \
                     because the descriptor is missing. We can't connect.",
                    sv(*service)
                );
                return None;
            }
        };
        if !self.any_intro_points_usable(service, desc) {
            info!(
                "Unable to randomly select an introduction point for service {} \
                 because the descriptor has no usable intro points. We can't connect.",
                sv(*service)
            );
            return None;
        }

        let mut candidates: Vec<&IntroPointDesc> = desc.intro_points().iter().collect();
        let mut excluded: Option<ExtendTarget> = None;
        while !candidates.is_empty() {
            // Pick a random intro point and immediately remove it from
            // the candidate list so we don't pick it again if we have to
            // iterate more.
            let idx = rng.gen_range(0..candidates.len());
            let ip = candidates.swap_remove(idx);

            if !self.intro_point_is_usable(service, ip) {
                continue;
            }

            let target = match ipt_to_extend_target(ip, self.config.allow_internal_addresses) {
                Ok(target) => target,
                Err(err) => {
                    info!(
                        "Unable to select introduction point with auth key {} for \
                         service {}, because we could not extend to it: {}",
                        sv(*ip.auth_key()),
                        sv(*service),
                        err
                    );
                    continue;
                }
            };

            if self.config.exclude_nodes.contains(target.rsa_id()) {
                // Keep the most recent excluded pick around: if nothing
                // else works out and the exclusion is not strict, we will
                // use it after all.
                excluded = Some(target);
                continue;
            }

            return Some(target);
        }

        if self.config.strict_nodes {
            warn!(
                "Every introduction point for service {} is in the ExcludeNodes set \
                 and StrictNodes is set. We can't connect.",
                sv(*service)
            );
            None
        } else {
            warn!(
                "Every introduction point for service {} is unusable, excluded, or \
                 impossible to extend to.",
                sv(*service)
            );
            excluded
        }
    }
}

/// Find the introduction point in `desc` whose authentication key is
/// `auth_key`.
pub(crate) fn find_intro_by_auth_key<'d>(
    desc: &'d HsDescriptor,
    auth_key: &IntroAuthKey,
) -> Option<&'d IntroPointDesc> {
    desc.intro_points()
        .iter()
        .find(|ip| ip.auth_key() == auth_key)
}

/// Find the introduction point in `desc` whose first legacy identity link
/// specifier is `legacy_id`.
///
/// Not every relay has an ed25519 identity in every descriptor, so newly
/// opened introduction circuits are matched to their descriptor entry by
/// the legacy digest of the chosen exit. The lists are short; a linear
/// scan is fine.
pub(crate) fn find_intro_by_legacy_id<'d>(
    desc: &'d HsDescriptor,
    legacy_id: &RsaIdentity,
) -> Option<&'d IntroPointDesc> {
    desc.intro_points()
        .iter()
        .find(|ip| ip.legacy_id() == Some(legacy_id))
}
