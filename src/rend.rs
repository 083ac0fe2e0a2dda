//! The rendezvous state machine: driving a paired introduction circuit
//! and rendezvous circuit through the INTRODUCE1 / INTRODUCE_ACK /
//! RENDEZVOUS2 exchanges.
//!
//! The two circuits advance independently and their events may interleave
//! in either order; the pairing is the rendezvous cookie, resolved
//! through the [`RendCircMap`](crate::circmap::RendCircMap). Permanent
//! failures mark both circuits for close exactly once.

use safelog::sensitive as sv;
use tor_error::{internal, ErrorReport as _};
use tracing::{info, warn};

use crate::cell::{parse_introduce_ack, parse_rendezvous2, IntroduceAckStatus};
use crate::circuit::{CircEntry, CircIdent, CircPurpose, IntroIdent, RendIdent};
use crate::env::{
    CircIdOf, CircuitLayer as _, ClientEnv, Clock as _, HsCrypto as _, NetDirView as _,
    StreamLayer as _,
};
use crate::err::{CloseReason, HandshakeOutcome, IntroPointFailureKind};
use crate::ident::{HsId, IntroAuthKey, RendCookie, RsaIdentity};
use crate::intro::{find_intro_by_auth_key, find_intro_by_legacy_id};
use crate::HsClient;

impl<E: ClientEnv> HsClient<E> {
    /// Ask the circuit layer to close `circ`, unless it is already
    /// closing.
    ///
    /// All closes go through here so that a circuit is marked for close
    /// exactly once however many failure paths run.
    pub(crate) fn mark_circ_for_close(&mut self, circ: CircIdOf<E>, reason: CloseReason) {
        if self.circ_is_closing(circ) {
            return;
        }
        if let Some(entry) = self.circuits.get_mut(circ) {
            entry.marked_for_close = true;
        }
        self.env.mark_for_close(circ, reason);
    }

    /// Return true iff `circ` is already closing, as far as we or the
    /// circuit layer know.
    fn circ_is_closing(&self, circ: CircIdOf<E>) -> bool {
        self.circuits
            .get(circ)
            .map_or(false, |entry| entry.marked_for_close)
            || self.env.circuit_is_closing(circ)
    }

    /// An introduction circuit to `chosen_exit` has opened for `service`.
    ///
    /// Label the circuit with the authentication key of the introduction
    /// point it ends at, by looking the chosen exit up in the cached
    /// descriptor, then ask the attacher to make progress. Also called
    /// after a re-extension, in which case the existing pair glue is
    /// kept.
    pub fn intro_circ_opened(
        &mut self,
        circ: CircIdOf<E>,
        service: &HsId,
        chosen_exit: &RsaIdentity,
    ) {
        info!("Introduction circuit has opened. Attaching streams.");

        let auth_key = match self.cache.lookup_descriptor(service) {
            None => {
                // Opening an intro circuit without the descriptor is no
                // good...
                warn!(
                    "{}",
                    internal!("introduction circuit opened without a cached descriptor").report()
                );
                None
            }
            Some(desc) => match find_intro_by_legacy_id(desc, chosen_exit) {
                Some(ip) => Some(*ip.auth_key()),
                None => {
                    warn!(
                        "{}",
                        internal!("no intro point matches the opened circuit's exit").report()
                    );
                    None
                }
            },
        };

        match self.circuits.get_mut(circ) {
            Some(entry) => {
                // A re-extended circuit: refresh the label, keep the glue.
                entry.purpose = CircPurpose::Introducing;
                if let Some(ident) = entry.intro_ident_mut() {
                    ident.intro_auth_pk = auth_key;
                } else {
                    warn!(
                        "{}",
                        internal!("rendezvous circuit reported as an intro circuit").report()
                    );
                }
            }
            None => {
                self.circuits.insert(
                    circ,
                    CircEntry {
                        purpose: CircPurpose::Introducing,
                        ident: CircIdent::Intro(IntroIdent {
                            identity_pk: *service,
                            intro_auth_pk: auth_key,
                            rendezvous_cookie: None,
                        }),
                        dirty_since: None,
                        marked_for_close: false,
                    },
                );
            }
        }

        self.env.attach_pending_streams();
    }

    /// A rendezvous circuit to `rend_point` has opened for `service`.
    ///
    /// Verify the rendezvous point speaks v3 rendezvous, pick a fresh
    /// cookie and client keypair, send ESTABLISH_RENDEZVOUS, and register
    /// the circuit under its cookie.
    pub fn rend_circ_opened(
        &mut self,
        circ: CircIdOf<E>,
        service: &HsId,
        rend_point: &RsaIdentity,
    ) {
        // Check that we didn't accidentally choose a node that does not
        // understand the v3 rendezvous protocol.
        if !self.env.node_supports_v3_rendezvous(rend_point) {
            warn!(
                "{}",
                internal!("chose a rendezvous point without v3 rendezvous support").report()
            );
            return;
        }

        info!("Rendezvous circuit has opened to {}.", sv(*rend_point));

        let cookie = RendCookie::random(&mut rand::thread_rng());
        let keypair = self.env.rend_client_keypair();
        self.circuits.insert(
            circ,
            CircEntry {
                purpose: CircPurpose::EstablishRend,
                ident: CircIdent::Rend(RendIdent {
                    identity_pk: *service,
                    rendezvous_cookie: cookie,
                    rendezvous_client_kp: keypair,
                    intro_auth_pk: None,
                    intro_enc_pk: None,
                }),
                dirty_since: None,
                marked_for_close: false,
            },
        );

        match self.env.send_establish_rendezvous(circ, &cookie) {
            Ok(()) => {
                // Register the circuit in the circuit map now that it is
                // still alive.
                if self.rend_circs.register(cookie, circ).is_some() {
                    warn!("{}", internal!("rendezvous cookie collision").report());
                }
            }
            Err(err) => {
                info!("Unable to send ESTABLISH_RENDEZVOUS: {}", err);
                self.mark_circ_for_close(circ, CloseReason::Internal);
            }
        }
    }

    /// Validate that `circ` is a correct introduction circuit and return
    /// its service and authentication key.
    fn intro_circ_is_ok(&self, circ: CircIdOf<E>) -> Option<(HsId, IntroAuthKey)> {
        let Some(entry) = self.circuits.get(circ) else {
            warn!(
                "{}",
                internal!("INTRODUCE1 requested on an untracked circuit").report()
            );
            return None;
        };
        if !entry.purpose.is_intro() {
            warn!(
                "{}",
                internal!("INTRODUCE1 requested on a non-introduction circuit").report()
            );
            return None;
        }
        let Some(ident) = entry.intro_ident() else {
            warn!(
                "{}",
                internal!("introduction circuit with a rendezvous identity").report()
            );
            return None;
        };
        let Some(auth_key) = ident.intro_auth_pk else {
            warn!(
                "{}",
                internal!("introduction circuit has no authentication key").report()
            );
            return None;
        };
        Some((ident.identity_pk, auth_key))
    }

    /// Send an INTRODUCE1 cell along `intro_circ`, and give `rend_circ`
    /// the key material it will need for the RENDEZVOUS2 handshake.
    ///
    /// Called by the attacher when both circuits of a pair are ready.
    /// Returns [`Transient`](HandshakeOutcome::Transient) if the cached
    /// descriptor had no usable introduction points and a refetch has
    /// been kicked off instead, and
    /// [`Permanent`](HandshakeOutcome::Permanent) if both circuits have
    /// been marked for close.
    pub fn send_introduce1(
        &mut self,
        intro_circ: CircIdOf<E>,
        rend_circ: CircIdOf<E>,
    ) -> HandshakeOutcome {
        let Some((service, auth_key)) = self.intro_circ_is_ok(intro_circ) else {
            return self.close_pair_internal(intro_circ, rend_circ);
        };

        info!("Sending INTRODUCE1 cell to service {}", sv(service));

        // 1) Get the descriptor from our cache, and make sure it still
        //    has something we can use.
        let usable = self
            .cache
            .lookup_descriptor(&service)
            .map_or(false, |desc| self.any_intro_points_usable(&service, desc));
        if !usable {
            info!(
                "Request to {} didn't have a usable descriptor. Trying to \
                 fetch a new one.",
                sv(service)
            );
            self.refetch_hsdesc(&service);
            // We just triggered a refetch; make sure every stream is back
            // waiting for that descriptor.
            self.flag_all_conn_wait_desc(&service);
            return HandshakeOutcome::Transient;
        }

        // The rendezvous circuit must be one of ours, with its cookie.
        let cookie = self
            .circuits
            .get(rend_circ)
            .and_then(|entry| entry.rend_ident())
            .map(|ident| ident.rendezvous_cookie);
        let Some(cookie) = cookie else {
            warn!(
                "{}",
                internal!("INTRODUCE1 requested without a rendezvous circuit").report()
            );
            return self.close_pair_internal(intro_circ, rend_circ);
        };

        // 2) Find which intro point in the descriptor this circuit is
        //    connected to, and send the cell.
        /// What happened while the descriptor was borrowed.
        enum SendStep {
            /// Cell sent; remember the intro point's encryption key.
            Sent(crate::ident::IntroEncKey),
            /// The circuit's intro point vanished from the descriptor.
            MissingIp,
            /// The circuit layer could not send the cell.
            SendFailed,
        }
        let step = {
            let Some(desc) = self.cache.lookup_descriptor(&service) else {
                // Checked usable just above; cannot happen.
                return self.close_pair_internal(intro_circ, rend_circ);
            };
            match find_intro_by_auth_key(desc, &auth_key) {
                None => SendStep::MissingIp,
                Some(ip) => {
                    match self
                        .env
                        .send_introduce1(intro_circ, rend_circ, ip, desc.subcredential())
                    {
                        Ok(()) => SendStep::Sent(*ip.enc_key()),
                        Err(err) => {
                            info!("Unable to send INTRODUCE1: {}", err);
                            SendStep::SendFailed
                        }
                    }
                }
            }
        };

        let enc_key = match step {
            SendStep::MissingIp => {
                // If we have a descriptor for this circuit's ident, we
                // must have a valid intro point object. Permanent error.
                warn!(
                    "{}",
                    internal!("intro circuit's intro point missing from descriptor").report()
                );
                return self.close_pair_internal(intro_circ, rend_circ);
            }
            SendStep::SendFailed => {
                // The intro circuit is already marked for close; make
                // sure the rest of the pair follows.
                return self.close_pair_internal(intro_circ, rend_circ);
            }
            SendStep::Sent(enc_key) => enc_key,
        };

        // 3) The cell is out. Copy the introduction point authentication
        //    and encryption keys into the rendezvous circuit identity so
        //    we can compute the ntor keys when RENDEZVOUS2 arrives, and
        //    glue the pair together by cookie on the intro side.
        if let Some(ident) = self
            .circuits
            .get_mut(rend_circ)
            .and_then(|entry| entry.rend_ident_mut())
        {
            ident.intro_auth_pk = Some(auth_key);
            ident.intro_enc_pk = Some(enc_key);
        }
        let now = self.env.now();
        if let Some(entry) = self.circuits.get_mut(intro_circ) {
            if let Some(ident) = entry.intro_ident_mut() {
                ident.rendezvous_cookie = Some(cookie);
            }
            // Now, we wait for an ACK or NAK on this circuit.
            entry.purpose = CircPurpose::IntroAckWait;
            entry.dirty_since = Some(now);
        }
        self.env.pathbias_count_use_attempt(intro_circ);

        HandshakeOutcome::Success
    }

    /// Mark both circuits of a pair for close after an internal failure.
    fn close_pair_internal(
        &mut self,
        intro_circ: CircIdOf<E>,
        rend_circ: CircIdOf<E>,
    ) -> HandshakeOutcome {
        self.mark_circ_for_close(intro_circ, CloseReason::Internal);
        self.mark_circ_for_close(rend_circ, CloseReason::Internal);
        HandshakeOutcome::Permanent
    }

    /// A RENDEZVOUS_ESTABLISHED cell arrived on `circ`.
    ///
    /// The circuit becomes ready to receive RENDEZVOUS2; pending streams
    /// are kicked so the INTRODUCE side makes progress.
    pub fn receive_rendezvous_established(
        &mut self,
        circ: CircIdOf<E>,
        _payload: &[u8],
    ) -> HandshakeOutcome {
        let now = self.env.now();
        let purpose = self.circuits.get(circ).map(|entry| entry.purpose);
        if purpose != Some(CircPurpose::EstablishRend) {
            warn!(
                "Got a RENDEZVOUS_ESTABLISHED but we were not expecting one. \
                 Closing circuit."
            );
            self.mark_circ_for_close(circ, CloseReason::TorProtocol);
            return HandshakeOutcome::Permanent;
        }

        info!("Received a RENDEZVOUS_ESTABLISHED. This circuit is now ready for rendezvous.");
        if let Some(entry) = self.circuits.get_mut(circ) {
            entry.purpose = CircPurpose::RendReady;
            // Record when the circuit entered the ready state; the
            // building-expiry logic keys off this.
            entry.dirty_since = Some(now);
        }

        // From a path bias point of view, this circuit is now
        // successfully used. Waiting any longer opens us up to attacks
        // from malicious services: they could induce us to attempt a
        // connection and then never reply to our rendezvous request.
        self.env.pathbias_mark_use_success(circ);

        // If we already have the introduction circuit built, make sure we
        // send the INTRODUCE cell now.
        self.env.attach_pending_streams();

        HandshakeOutcome::Success
    }

    /// An INTRODUCE_ACK cell arrived on `circ`.
    ///
    /// On success the paired rendezvous circuit is promoted and the intro
    /// circuit closed; on a nack the failure is recorded and the intro
    /// circuit re-extended to another introduction point when possible.
    pub fn receive_introduce_ack(&mut self, circ: CircIdOf<E>, payload: &[u8]) -> HandshakeOutcome {
        let purpose = self.circuits.get(circ).map(|entry| entry.purpose);
        if purpose != Some(CircPurpose::IntroAckWait) {
            warn!("Unexpected INTRODUCE_ACK on circuit.");
            self.mark_circ_for_close(circ, CloseReason::TorProtocol);
            return HandshakeOutcome::Permanent;
        }

        let outcome = match parse_introduce_ack(payload) {
            Err(err) => {
                info!("Unparseable INTRODUCE_ACK: {}", err);
                HandshakeOutcome::Transient
            }
            Ok(IntroduceAckStatus::SUCCESS) => {
                self.handle_introduce_ack_success(circ);
                HandshakeOutcome::Success
            }
            Ok(
                status @ (IntroduceAckStatus::NOT_RECOGNIZED
                | IntroduceAckStatus::BAD_MESSAGE_FORMAT
                | IntroduceAckStatus::CANT_RELAY),
            ) => {
                self.handle_introduce_ack_bad(circ, status);
                // We are going to see whether we have to close the
                // circuits (IP and RP) or can re-extend to a new intro
                // point.
                self.close_or_reextend_intro_circ(circ)
            }
            Ok(status) => {
                info!("Unknown INTRODUCE_ACK status code {}", u16::from(status));
                HandshakeOutcome::Transient
            }
        };

        // For path bias: this circuit was used successfully. NACK or ACK
        // both count.
        self.env.pathbias_mark_use_success(circ);

        outcome
    }

    /// Handle an INTRODUCE_ACK success status: promote the paired
    /// rendezvous circuit and retire the intro circuit.
    fn handle_introduce_ack_success(&mut self, intro_circ: CircIdOf<E>) {
        info!("Received INTRODUCE_ACK ack! Informing rendezvous");

        let now = self.env.now();
        let cookie = self
            .circuits
            .get(intro_circ)
            .and_then(|entry| entry.intro_ident())
            .and_then(|ident| ident.rendezvous_cookie);

        // Get the established rendezvous circuit for this cookie.
        let rend_circ = cookie
            .and_then(|cookie| self.rend_circs.by_cookie(&cookie))
            .filter(|rc| {
                self.circuits
                    .get(*rc)
                    .map_or(false, |entry| entry.purpose.is_established_rend())
            });

        match rend_circ {
            None => {
                // The rendezvous circuit may have collapsed while the
                // INTRODUCE1 was in flight.
                warn!("Can't find any rendezvous circuit. Stopping");
            }
            Some(rend_circ) => {
                if let Some(entry) = self.circuits.get_mut(rend_circ) {
                    // It is possible to get a RENDEZVOUS2 cell before the
                    // INTRODUCE_ACK, in which case the circuit is already
                    // joined and transmitting data; leave it alone.
                    if entry.purpose != CircPurpose::RendJoined {
                        entry.purpose = CircPurpose::RendReadyIntroAcked;
                        entry.dirty_since = Some(now);
                    }
                }
            }
        }

        // We don't need the intro circuit anymore. It did what it had to
        // do!
        if let Some(entry) = self.circuits.get_mut(intro_circ) {
            entry.purpose = CircPurpose::IntroAcked;
        }
        self.mark_circ_for_close(intro_circ, CloseReason::Finished);
    }

    /// Handle an INTRODUCE_ACK failure status: note the failure in the
    /// introduction point failure cache.
    fn handle_introduce_ack_bad(&mut self, circ: CircIdOf<E>, status: IntroduceAckStatus) {
        info!("Received INTRODUCE_ACK nack. Reason: {}", status);

        // It's a NAK. The introduction point didn't relay our request.
        let keys = {
            let Some(entry) = self.circuits.get_mut(circ) else {
                return;
            };
            entry.purpose = CircPurpose::Introducing;
            entry
                .intro_ident()
                .and_then(|ident| Some((ident.identity_pk, ident.intro_auth_pk?)))
        };

        if let Some((service, auth_key)) = keys {
            let now = self.env.now();
            self.cache
                .note_intro_failure(&service, &auth_key, IntroPointFailureKind::Generic, now);
        }
    }

    /// After a nack: re-extend the intro circuit to a different usable
    /// introduction point, or close the pair if none is left.
    fn close_or_reextend_intro_circ(&mut self, intro_circ: CircIdOf<E>) -> HandshakeOutcome {
        let Some(entry) = self.circuits.get(intro_circ) else {
            return HandshakeOutcome::Permanent;
        };
        let service = entry.service();
        let cookie = entry.intro_ident().and_then(|ident| ident.rendezvous_cookie);

        let can_reextend = match self.cache.lookup_descriptor(&service) {
            None => {
                // We can't continue without a descriptor.
                warn!(
                    "{}",
                    internal!("nack handling found no cached descriptor").report()
                );
                false
            }
            Some(desc) => self.any_intro_points_usable(&service, desc),
        };

        if can_reextend && self.reextend_intro_circuit(intro_circ) == HandshakeOutcome::Success {
            return HandshakeOutcome::Transient;
        }

        // Change the intro circuit purpose before closing so that no
        // second intro-point-failure event is reported, which would
        // trigger an extra descriptor fetch. The circuit can already be
        // closed on failure to re-extend.
        if !self.circ_is_closing(intro_circ) {
            if let Some(entry) = self.circuits.get_mut(intro_circ) {
                entry.purpose = CircPurpose::IntroAcked;
            }
            self.mark_circ_for_close(intro_circ, CloseReason::Finished);
        }

        // Close the related rendezvous circuit. It might have collapsed
        // while the INTRODUCE_ACK was in flight, so we can't expect one
        // every time.
        if let Some(rend_circ) = cookie.and_then(|cookie| self.rend_circs.by_cookie(&cookie)) {
            self.mark_circ_for_close(rend_circ, CloseReason::Finished);
        }

        HandshakeOutcome::Permanent
    }

    /// Extend the introduction circuit `circ` to another valid
    /// introduction point for its service, or close it so a fresh intro
    /// circuit gets launched.
    ///
    /// Returns [`Success`](HandshakeOutcome::Success) on success or
    /// possible success. On [`Permanent`](HandshakeOutcome::Permanent)
    /// failure the intro circuit is closed or closing, and the caller is
    /// responsible for the paired rendezvous circuit.
    pub fn reextend_intro_circuit(&mut self, circ: CircIdOf<E>) -> HandshakeOutcome {
        let Some(service) = self.circuits.get(circ).map(|entry| entry.service()) else {
            warn!(
                "{}",
                internal!("re-extension requested on an untracked circuit").report()
            );
            return HandshakeOutcome::Permanent;
        };

        let Some(target) = self.pick_intro_for_service(&service) else {
            warn!("No usable introduction points left. Closing.");
            self.mark_circ_for_close(circ, CloseReason::Internal);
            return HandshakeOutcome::Permanent;
        };

        if self.env.remaining_relay_early_cells(circ) > 0 {
            info!("Re-extending introduction circuit to {}.", sv(*target.rsa_id()));
            match self.env.extend_to_new_exit(circ, &target) {
                Ok(()) => {
                    // We were able to extend: update the timestamp so the
                    // circuit is not expired too early. The intro circuit
                    // is short-lived, it just needs to hold long enough
                    // to introduce.
                    let now = self.env.now();
                    if let Some(entry) = self.circuits.get_mut(circ) {
                        entry.dirty_since = Some(now);
                    }
                    HandshakeOutcome::Success
                }
                Err(err) => {
                    info!("Unable to re-extend introduction circuit: {}", err);
                    HandshakeOutcome::Permanent
                }
            }
        } else {
            info!("Closing intro circuit (out of RELAY_EARLY cells).");
            self.mark_circ_for_close(circ, CloseReason::Finished);
            // The stream attacher will launch a new intro circuit.
            HandshakeOutcome::Success
        }
    }

    /// A RENDEZVOUS2 cell arrived on `circ`.
    ///
    /// Computes the client-side rendezvous keys, verifies the
    /// authentication MAC in constant time, installs the end-to-end
    /// encryption, and joins the circuit. Any failure closes the circuit
    /// with a protocol error; no key material is installed.
    pub fn receive_rendezvous2(&mut self, circ: CircIdOf<E>, payload: &[u8]) -> HandshakeOutcome {
        // The circuit can be in either state: a RENDEZVOUS2 cell may
        // arrive before the INTRODUCE_ACK has been received.
        let purpose = self.circuits.get(circ).map(|entry| entry.purpose);
        if !matches!(
            purpose,
            Some(CircPurpose::RendReady | CircPurpose::RendReadyIntroAcked)
        ) {
            warn!("Unexpected RENDEZVOUS2 cell on circuit. Closing circuit.");
            self.mark_circ_for_close(circ, CloseReason::TorProtocol);
            return HandshakeOutcome::Permanent;
        }

        info!("Got RENDEZVOUS2 cell from hidden service.");

        let (server_pk, auth_mac) = match parse_rendezvous2(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                info!("Invalid RENDEZVOUS2: {}", err);
                self.mark_circ_for_close(circ, CloseReason::TorProtocol);
                return HandshakeOutcome::Permanent;
            }
        };

        // Collect the handshake inputs recorded when INTRODUCE1 was sent.
        let inputs = self
            .circuits
            .get(circ)
            .and_then(|entry| entry.rend_ident())
            .and_then(|ident| {
                Some((
                    ident.intro_auth_pk?,
                    ident.intro_enc_pk?,
                    ident.rendezvous_client_kp.clone(),
                ))
            });
        let Some((intro_auth_pk, intro_enc_pk, client_kp)) = inputs else {
            warn!(
                "{}",
                internal!("RENDEZVOUS2 on a circuit that never introduced").report()
            );
            self.mark_circ_for_close(circ, CloseReason::TorProtocol);
            return HandshakeOutcome::Permanent;
        };

        let keys = match self.env.hs_ntor_client_finish(
            &intro_auth_pk,
            &client_kp,
            &intro_enc_pk,
            &server_pk,
        ) {
            Ok(keys) => keys,
            Err(_) => {
                info!("Unable to compute the rendezvous keys.");
                self.mark_circ_for_close(circ, CloseReason::TorProtocol);
                return HandshakeOutcome::Permanent;
            }
        };

        // Critical check: the MAC must match what we computed with what
        // we got. Constant-time, and nothing is installed before it
        // passes.
        if !keys.mac_is_good(&auth_mac) {
            info!("Invalid MAC in RENDEZVOUS2. Rejecting cell.");
            self.mark_circ_for_close(circ, CloseReason::TorProtocol);
            return HandshakeOutcome::Permanent;
        }

        // Set up the e2e encryption on the circuit and finalize it.
        if let Err(err) = self.env.setup_e2e_rend_circ(circ, keys.ntor_key_seed()) {
            info!("Unable to setup the e2e encryption: {}", err);
            self.mark_circ_for_close(circ, CloseReason::TorProtocol);
            return HandshakeOutcome::Permanent;
        }

        // Success. Hidden service connection finalized! The derived keys
        // are wiped when `keys` drops.
        if let Some(entry) = self.circuits.get_mut(circ) {
            entry.purpose = CircPurpose::RendJoined;
        }
        HandshakeOutcome::Success
    }

    /// The circuit layer has reaped `circ`; forget everything about it.
    pub fn circuit_closed(&mut self, circ: CircIdOf<E>) {
        if let Some(entry) = self.circuits.remove(circ) {
            if let CircIdent::Rend(ident) = entry.ident {
                self.rend_circs.unregister(&ident.rendezvous_cookie, circ);
            }
        }
    }
}
