//! A recording mock environment for testing the client core.
//!
//! One `MockEnv` implements every collaborator trait with scripted
//! results and records every outbound call, so tests can drive the state
//! machine event by event and inspect exactly what the core asked its
//! collaborators to do. Everything is single-threaded, so plain
//! `Rc<RefCell<..>>` interior state is enough.

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

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Instant, SystemTime};

use crate::desc::{DescSigningCert, HsDescriptor, IntroPointDesc, LinkSpec};
use crate::env::{Clock, ControlEvents, DescCodec, HsCrypto, NetDirView, StreamLayer};
use crate::env::CircuitLayer;
use crate::err::{CloseReason, DescError, EndStreamReason, HsNtorError, SendError};
use crate::ident::{
    BlindedId, Curve25519Public, Ed25519Identity, HsId, HsNtorClientKeypair, IntroAuthKey,
    IntroEncKey, NtorRendKeys, RendCookie, RsaIdentity, Subcredential, TimePeriod,
};
use crate::relay_info::ExtendTarget;
use crate::{HsClient, HsClientConfig};

/// Scripted behavior and call recordings, shared by reference.
pub(crate) struct MockState {
    /// Current monotonic time.
    pub(crate) now: Instant,
    /// Current wall-clock time.
    pub(crate) wallclock: SystemTime,

    /// Whether a live consensus is available.
    pub(crate) have_live_consensus: bool,
    /// Whether minimum directory information is available.
    pub(crate) have_minimum_dir_info: bool,
    /// The current time period.
    pub(crate) time_period: TimePeriod,
    /// The responsible HSDirs for every service.
    pub(crate) hsdirs: Vec<Ed25519Identity>,
    /// Relays that do not support v3 rendezvous.
    pub(crate) v3_unsupported: HashSet<RsaIdentity>,

    /// Bodies that decode, and what they decode to.
    pub(crate) decodable: HashMap<Vec<u8>, HsDescriptor>,
    /// Whether descriptor signing certs validate.
    pub(crate) signing_cert_valid: bool,

    /// Whether the ntor finish operation fails.
    pub(crate) ntor_fail: bool,
    /// The key seed the ntor finish yields.
    pub(crate) ntor_seed: [u8; 32],
    /// The MAC the ntor finish yields.
    pub(crate) ntor_mac: [u8; 32],
    /// Counter making each generated keypair distinct.
    keypair_counter: u8,

    /// Launched directory requests: (hsdir, resource, service).
    pub(crate) launched_dir_requests: Vec<(Ed25519Identity, String, HsId)>,
    /// Whether launching a directory request fails.
    pub(crate) launch_fails: bool,
    /// Directory requests marked for close.
    pub(crate) closed_dir_requests: Vec<u32>,
    /// Next directory request id.
    next_dir_request: u32,

    /// INTRODUCE1 sends: (intro circ, rend circ, intro point auth key,
    /// subcredential).
    pub(crate) sent_introduce1: Vec<(u32, u32, IntroAuthKey, Subcredential)>,
    /// Whether sending INTRODUCE1 fails.
    pub(crate) introduce1_fails: bool,
    /// ESTABLISH_RENDEZVOUS sends: (rend circ, cookie).
    pub(crate) sent_establish_rend: Vec<(u32, RendCookie)>,
    /// Whether sending ESTABLISH_RENDEZVOUS fails.
    pub(crate) establish_fails: bool,
    /// Installed end-to-end keys: (rend circ, seed).
    pub(crate) e2e_installed: Vec<(u32, [u8; 32])>,
    /// Whether installing end-to-end keys fails.
    pub(crate) e2e_fails: bool,
    /// Re-extensions: (circ, new exit).
    pub(crate) extended: Vec<(u32, RsaIdentity)>,
    /// Whether extending fails.
    pub(crate) extend_fails: bool,
    /// RELAY_EARLY cells left, unless overridden per circuit.
    pub(crate) relay_early_default: u8,
    /// Per-circuit RELAY_EARLY overrides.
    pub(crate) relay_early: HashMap<u32, u8>,
    /// Circuits that are closing, i.e. everything ever marked for close.
    pub(crate) closing_circs: HashSet<u32>,
    /// Mark-for-close calls in order: (circ, reason).
    pub(crate) closed_circs: Vec<(u32, CloseReason)>,
    /// Path-bias "attempted" notes.
    pub(crate) pathbias_attempts: Vec<u32>,
    /// Path-bias "succeeded" notes.
    pub(crate) pathbias_success: Vec<u32>,

    /// Streams unattached and closed: (stream, reason).
    pub(crate) unattached: Vec<(u32, EndStreamReason)>,
    /// Streams marked as waiting for a circuit.
    pub(crate) pending_circuit_marks: Vec<u32>,
    /// Streams removed from the circuit pending set.
    pub(crate) non_pending_circuit_marks: Vec<u32>,
    /// How many times the attacher was kicked.
    pub(crate) attach_kicks: u32,

    /// DESC_REQUESTED control events: (service, blinded b64, hsdir).
    pub(crate) desc_requested_events: Vec<(HsId, String, Ed25519Identity)>,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            now: Instant::now(),
            wallclock: SystemTime::now(),
            have_live_consensus: true,
            have_minimum_dir_info: true,
            time_period: TimePeriod::from(42_u64),
            hsdirs: (0..3_u8)
                .map(|i| Ed25519Identity::new([0xd0 + i; 32]))
                .collect(),
            v3_unsupported: HashSet::new(),
            decodable: HashMap::new(),
            signing_cert_valid: true,
            ntor_fail: false,
            ntor_seed: [0x5e; 32],
            ntor_mac: [0xaa; 32],
            keypair_counter: 0,
            launched_dir_requests: Vec::new(),
            launch_fails: false,
            closed_dir_requests: Vec::new(),
            next_dir_request: 1,
            sent_introduce1: Vec::new(),
            introduce1_fails: false,
            sent_establish_rend: Vec::new(),
            establish_fails: false,
            e2e_installed: Vec::new(),
            e2e_fails: false,
            extended: Vec::new(),
            extend_fails: false,
            relay_early_default: 2,
            relay_early: HashMap::new(),
            closing_circs: HashSet::new(),
            closed_circs: Vec::new(),
            pathbias_attempts: Vec::new(),
            pathbias_success: Vec::new(),
            unattached: Vec::new(),
            pending_circuit_marks: Vec::new(),
            non_pending_circuit_marks: Vec::new(),
            attach_kicks: 0,
            desc_requested_events: Vec::new(),
        }
    }
}

/// The mock environment handed to [`HsClient`].
pub(crate) struct MockEnv {
    /// Shared scripted state and recordings.
    state: Rc<RefCell<MockState>>,
}

impl MockEnv {
    /// Make a fresh environment with default scripting.
    pub(crate) fn new() -> Self {
        MockEnv {
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    /// Borrow the recordings.
    pub(crate) fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    /// Borrow the scripted state mutably.
    pub(crate) fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }
}

impl Clock for MockEnv {
    fn now(&self) -> Instant {
        self.state.borrow().now
    }
    fn wallclock(&self) -> SystemTime {
        self.state.borrow().wallclock
    }
}

impl NetDirView for MockEnv {
    fn have_live_consensus(&self) -> bool {
        self.state.borrow().have_live_consensus
    }
    fn have_minimum_dir_info(&self) -> bool {
        self.state.borrow().have_minimum_dir_info
    }
    fn current_time_period(&self) -> TimePeriod {
        self.state.borrow().time_period
    }
    fn responsible_hsdirs(
        &self,
        _blinded_id: &BlindedId,
        _period: TimePeriod,
    ) -> Vec<Ed25519Identity> {
        self.state.borrow().hsdirs.clone()
    }
    fn node_supports_v3_rendezvous(&self, id: &RsaIdentity) -> bool {
        !self.state.borrow().v3_unsupported.contains(id)
    }
}

impl HsCrypto for MockEnv {
    fn blind(&self, service: &HsId, period: TimePeriod) -> BlindedId {
        // Not real blinding, but deterministic and period-dependent.
        let mut bytes = *service.as_bytes();
        let period_byte = u64::from(period) as u8;
        for b in &mut bytes {
            *b ^= period_byte;
        }
        BlindedId::new(bytes)
    }

    fn subcredential(&self, service: &HsId, blinded_id: &BlindedId) -> Subcredential {
        let mut bytes = *service.as_bytes();
        for (b, blinded) in bytes.iter_mut().zip(blinded_id.as_bytes()) {
            *b = b.wrapping_add(*blinded);
        }
        Subcredential::new(bytes)
    }

    fn rend_client_keypair(&mut self) -> HsNtorClientKeypair {
        let mut state = self.state.borrow_mut();
        state.keypair_counter = state.keypair_counter.wrapping_add(1);
        let n = state.keypair_counter;
        HsNtorClientKeypair::new(Curve25519Public::new([0x60 ^ n; 32]), [0x70 ^ n; 32])
    }

    fn hs_ntor_client_finish(
        &self,
        _intro_auth_pk: &IntroAuthKey,
        _client_kp: &HsNtorClientKeypair,
        _intro_enc_pk: &IntroEncKey,
        _server_pk: &Curve25519Public,
    ) -> Result<NtorRendKeys, HsNtorError> {
        let state = self.state.borrow();
        if state.ntor_fail {
            return Err(HsNtorError {});
        }
        Ok(NtorRendKeys::new(state.ntor_seed, state.ntor_mac))
    }
}

impl DescCodec for MockEnv {
    fn decode_descriptor(
        &self,
        body: &[u8],
        _subcredential: &Subcredential,
    ) -> Result<HsDescriptor, DescError> {
        self.state
            .borrow()
            .decodable
            .get(body)
            .cloned()
            .ok_or(DescError::Unparseable)
    }

    fn check_signing_cert(
        &self,
        _cert: &DescSigningCert,
        _blinded_id: &BlindedId,
        _now: SystemTime,
    ) -> Result<(), DescError> {
        if self.state.borrow().signing_cert_valid {
            Ok(())
        } else {
            Err(DescError::BadSigningCert("scripted failure".to_owned()))
        }
    }
}

impl CircuitLayer for MockEnv {
    type CircId = u32;
    type DirRequestId = u32;

    fn launch_anonymous_hsdesc_request(
        &mut self,
        hsdir: &Ed25519Identity,
        resource: &str,
        service: &HsId,
    ) -> Result<u32, SendError> {
        let mut state = self.state.borrow_mut();
        if state.launch_fails {
            return Err(SendError::new("scripted launch failure"));
        }
        state
            .launched_dir_requests
            .push((*hsdir, resource.to_owned(), *service));
        let id = state.next_dir_request;
        state.next_dir_request += 1;
        Ok(id)
    }

    fn close_dir_request(&mut self, request: u32) {
        self.state.borrow_mut().closed_dir_requests.push(request);
    }

    fn send_introduce1(
        &mut self,
        intro_circ: u32,
        rend_circ: u32,
        ip: &IntroPointDesc,
        subcredential: &Subcredential,
    ) -> Result<(), SendError> {
        let mut state = self.state.borrow_mut();
        if state.introduce1_fails {
            // A failed send means the circuit got marked for close under us.
            state.closing_circs.insert(intro_circ);
            return Err(SendError::new("scripted INTRODUCE1 failure"));
        }
        state
            .sent_introduce1
            .push((intro_circ, rend_circ, *ip.auth_key(), subcredential.clone()));
        Ok(())
    }

    fn send_establish_rendezvous(
        &mut self,
        rend_circ: u32,
        cookie: &RendCookie,
    ) -> Result<(), SendError> {
        let mut state = self.state.borrow_mut();
        if state.establish_fails {
            return Err(SendError::new("scripted ESTABLISH_RENDEZVOUS failure"));
        }
        state.sent_establish_rend.push((rend_circ, *cookie));
        Ok(())
    }

    fn setup_e2e_rend_circ(&mut self, rend_circ: u32, ntor_key_seed: &[u8; 32]) -> Result<(), SendError> {
        let mut state = self.state.borrow_mut();
        if state.e2e_fails {
            return Err(SendError::new("scripted e2e failure"));
        }
        state.e2e_installed.push((rend_circ, *ntor_key_seed));
        Ok(())
    }

    fn extend_to_new_exit(&mut self, circ: u32, target: &ExtendTarget) -> Result<(), SendError> {
        let mut state = self.state.borrow_mut();
        if state.extend_fails {
            return Err(SendError::new("scripted extend failure"));
        }
        state.extended.push((circ, *target.rsa_id()));
        Ok(())
    }

    fn remaining_relay_early_cells(&self, circ: u32) -> u8 {
        let state = self.state.borrow();
        state
            .relay_early
            .get(&circ)
            .copied()
            .unwrap_or(state.relay_early_default)
    }

    fn circuit_is_closing(&self, circ: u32) -> bool {
        self.state.borrow().closing_circs.contains(&circ)
    }

    fn mark_for_close(&mut self, circ: u32, reason: CloseReason) {
        let mut state = self.state.borrow_mut();
        state.closed_circs.push((circ, reason));
        state.closing_circs.insert(circ);
    }

    fn pathbias_count_use_attempt(&mut self, circ: u32) {
        self.state.borrow_mut().pathbias_attempts.push(circ);
    }

    fn pathbias_mark_use_success(&mut self, circ: u32) {
        self.state.borrow_mut().pathbias_success.push(circ);
    }
}

impl StreamLayer for MockEnv {
    type StreamId = u32;

    fn mark_unattached(&mut self, stream: u32, reason: EndStreamReason) {
        self.state.borrow_mut().unattached.push((stream, reason));
    }

    fn mark_pending_circuit(&mut self, stream: u32) {
        self.state.borrow_mut().pending_circuit_marks.push(stream);
    }

    fn mark_non_pending_circuit(&mut self, stream: u32) {
        self.state
            .borrow_mut()
            .non_pending_circuit_marks
            .push(stream);
    }

    fn attach_pending_streams(&mut self) {
        self.state.borrow_mut().attach_kicks += 1;
    }
}

impl ControlEvents for MockEnv {
    fn desc_requested_event(
        &mut self,
        service: &HsId,
        base64_blinded_id: &str,
        hsdir: &Ed25519Identity,
    ) {
        self.state.borrow_mut().desc_requested_events.push((
            *service,
            base64_blinded_id.to_owned(),
            *hsdir,
        ));
    }
}

/// Make a client over a fresh mock environment with default config.
pub(crate) fn make_client() -> HsClient<MockEnv> {
    HsClient::new(MockEnv::new(), HsClientConfig::default())
}

/// A service identity filled with `n`.
pub(crate) fn service_id(n: u8) -> HsId {
    HsId::new([n; 32])
}

/// An introduction point with deterministic keys derived from `k`:
/// auth key `[0x10 + k; 32]`, legacy id `[k; 20]`, a public OR address.
pub(crate) fn ipt_with_keys(k: u8) -> IntroPointDesc {
    IntroPointDesc::new(
        IntroAuthKey::new([0x10 + k; 32]),
        IntroEncKey::new(Curve25519Public::new([0x20 ^ k; 32])),
        Curve25519Public::new([0x30 ^ k; 32]),
        vec![
            LinkSpec::OrPort("203.0.113.1".parse().expect("addr"), 9000 + u16::from(k)),
            LinkSpec::RsaId(RsaIdentity::new([k; 20])),
            LinkSpec::Ed25519Id(Ed25519Identity::new([0x40 ^ k; 32])),
        ],
    )
}

/// A descriptor for `service` with `n_ips` introduction points,
/// numbered from zero.
pub(crate) fn make_descriptor(service: &HsId, n_ips: u8) -> HsDescriptor {
    let intro_points = (0..n_ips).map(ipt_with_keys).collect();
    HsDescriptor::new(
        3,
        DescSigningCert::new(vec![0xc3; 8]),
        intro_points,
        Subcredential::new(*service.as_bytes()),
    )
}
