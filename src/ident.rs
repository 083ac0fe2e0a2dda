//! Identity and key material wrappers used by the onion service client.
//!
//! Each key role gets its own newtype so that one kind of key cannot be
//! mistaken for another. The sensitive intermediates (blinded key,
//! subcredential, rendezvous keypair, derived rendezvous keys) wipe their
//! storage when dropped.

use std::fmt::{self, Debug, Display};

use base64ct::{Base64Unpadded, Base64UrlUnpadded, Encoding};
use data_encoding::BASE32_NOPAD;
use rand::{CryptoRng, RngCore};
use safelog::Redactable;
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Version byte of the onion addresses this crate speaks.
const HS_VERSION_THREE: u8 = 3;

/// Prefix of the onion address checksum preimage.
const ONION_CHECKSUM_PREFIX: &[u8] = b".onion checksum";

/// The identity of a v3 onion service.
///
/// This is the ed25519 public key that is encoded as a `${base32}.onion`
/// address; it is stable across time periods. All actual signature math on
/// it happens behind the [`HsCrypto`](crate::env::HsCrypto) boundary, so
/// the core stores only the raw bytes.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct HsId([u8; 32]);

impl HsId {
    /// Wrap raw identity key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        HsId(bytes)
    }

    /// Return the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the `.onion` address for this identity.
    ///
    /// The address is `base32(pubkey ‖ checksum ‖ version)` where the
    /// checksum is the first two bytes of
    /// `SHA3-256(".onion checksum" ‖ pubkey ‖ version)`.
    pub fn onion_address(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(ONION_CHECKSUM_PREFIX);
        hasher.update(self.0);
        hasher.update([HS_VERSION_THREE]);
        let checksum = hasher.finalize();

        let mut raw = Vec::with_capacity(32 + 2 + 1);
        raw.extend_from_slice(&self.0);
        raw.extend_from_slice(&checksum[..2]);
        raw.push(HS_VERSION_THREE);

        let mut addr = BASE32_NOPAD.encode(&raw).to_ascii_lowercase();
        addr.push_str(".onion");
        addr
    }
}

impl Display for HsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.onion_address())
    }
}

impl Debug for HsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HsId({})", self)
    }
}

impl Redactable for HsId {
    fn display_redacted(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}….onion", &self.onion_address()[..2])
    }
}

/// A period of time during which one blinded key is in use.
///
/// Time periods advance independently of this crate; the current one is
/// supplied by the network view.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
pub struct TimePeriod(u64);

/// The "blinded" identity of an onion service for one time period.
///
/// Derived from `(HsId, TimePeriod)`; used as the descriptor lookup key on
/// the HSDir hash ring and as the signer of descriptor signing-key
/// certificates. Unlinkable across periods to observers who do not know
/// the identity key, so it never outlives the operation that needs it:
/// the storage is wiped on drop.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct BlindedId([u8; 32]);

impl BlindedId {
    /// Wrap raw blinded key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        BlindedId(bytes)
    }

    /// Return the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode this key the way HSDir fetch resources want it:
    /// URL-safe base64 without padding.
    pub fn to_base64(&self) -> String {
        Base64UrlUnpadded::encode_string(&self.0)
    }
}

impl Debug for BlindedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately truncated: blinded keys are linkable state.
        write!(f, "BlindedId({}…)", &self.to_base64()[..4])
    }
}

/// Symmetric material binding descriptor decryption and the introduction
/// handshake to one service in one time period.
///
/// Derived from `(HsId, BlindedId)`. Wiped on drop.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Subcredential([u8; 32]);

impl Subcredential {
    /// Wrap raw subcredential bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Subcredential(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for Subcredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subcredential(…)")
    }
}

/// A rendezvous cookie: 20 uniformly random bytes the client hands to its
/// chosen rendezvous point, which the service must echo to join circuits.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RendCookie([u8; 20]);

impl RendCookie {
    /// Pick a fresh random cookie.
    pub fn random<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0_u8; 20];
        rng.fill_bytes(&mut bytes);
        RendCookie(bytes)
    }

    /// Wrap raw cookie bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        RendCookie(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl Debug for RendCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RendCookie({}…)", hex::encode(&self.0[..2]))
    }
}

/// An ed25519 identity of a relay, as used to name HSDirs and circuit
/// targets.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Ed25519Identity([u8; 32]);

impl Ed25519Identity {
    /// Wrap raw identity bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Ed25519Identity(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Base64Unpadded::encode_string(&self.0))
    }
}

impl Debug for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Identity {{ {} }}", self)
    }
}

impl Redactable for Ed25519Identity {
    fn display_redacted(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", &Base64Unpadded::encode_string(&self.0)[..2])
    }
}

/// A legacy RSA identity digest of a relay (20 bytes).
///
/// Not every relay has a usable ed25519 identity in every descriptor, so
/// introduction points are still matched by this digest.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RsaIdentity([u8; 20]);

impl RsaIdentity {
    /// Wrap raw digest bytes.
    pub fn new(bytes: [u8; 20]) -> Self {
        RsaIdentity(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl Display for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", hex::encode(self.0))
    }
}

impl Debug for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RsaIdentity {{ {} }}", self)
    }
}

impl Redactable for RsaIdentity {
    fn display_redacted(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}…", hex::encode(&self.0[..1]))
    }
}

/// A curve25519 public key, as used for ntor onion keys and the
/// rendezvous handshake.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Zeroize)]
pub struct Curve25519Public([u8; 32]);

impl Curve25519Public {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Curve25519Public(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for Curve25519Public {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Curve25519Public({}…)", hex::encode(&self.0[..4]))
    }
}

/// The authentication key an onion service uses at one introduction point.
///
/// An ed25519 key, included (certified) in the service descriptor; a
/// different one is used at each introduction point. This is the key the
/// per-introduction-point failure cache is indexed by.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct IntroAuthKey([u8; 32]);

impl IntroAuthKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        IntroAuthKey(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for IntroAuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Base64Unpadded::encode_string(&self.0))
    }
}

impl Debug for IntroAuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntroAuthKey {{ {} }}", self)
    }
}

impl Redactable for IntroAuthKey {
    fn display_redacted(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", &Base64Unpadded::encode_string(&self.0)[..2])
    }
}

/// The curve25519 encryption key an onion service uses at one
/// introduction point, consumed by the rendezvous handshake.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Zeroize)]
pub struct IntroEncKey(Curve25519Public);

impl IntroEncKey {
    /// Wrap a curve25519 key.
    pub fn new(key: Curve25519Public) -> Self {
        IntroEncKey(key)
    }

    /// Return the wrapped key.
    pub fn public(&self) -> &Curve25519Public {
        &self.0
    }
}

impl Debug for IntroEncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntroEncKey({:?})", self.0)
    }
}

/// The client's ephemeral curve25519 keypair for one rendezvous attempt.
///
/// Generated by the crypto collaborator when the rendezvous circuit
/// opens; the secret half is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HsNtorClientKeypair {
    /// The public half, sent inside INTRODUCE1.
    public: Curve25519Public,
    /// The secret half, consumed by the ntor finish operation.
    secret: [u8; 32],
}

impl HsNtorClientKeypair {
    /// Wrap a keypair from its halves.
    pub fn new(public: Curve25519Public, secret: [u8; 32]) -> Self {
        HsNtorClientKeypair { public, secret }
    }

    /// Return the public half.
    pub fn public(&self) -> &Curve25519Public {
        &self.public
    }

    /// Return the secret half.
    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }
}

impl Debug for HsNtorClientKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HsNtorClientKeypair({:?}, <secret>)", self.public)
    }
}

/// Key material derived from the client-side hidden service ntor.
///
/// `ntor_key_seed` expands into the end-to-end circuit keys;
/// `rend_auth_mac` must match the MAC carried by RENDEZVOUS2 before
/// anything is installed. Wiped on drop on every exit path.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NtorRendKeys {
    /// Seed for the end-to-end circuit encryption keys.
    ntor_key_seed: [u8; 32],
    /// Expected authentication MAC for the RENDEZVOUS2 cell.
    rend_auth_mac: [u8; 32],
}

impl NtorRendKeys {
    /// Wrap derived key material.
    pub fn new(ntor_key_seed: [u8; 32], rend_auth_mac: [u8; 32]) -> Self {
        NtorRendKeys {
            ntor_key_seed,
            rend_auth_mac,
        }
    }

    /// Return the key seed.
    pub fn ntor_key_seed(&self) -> &[u8; 32] {
        &self.ntor_key_seed
    }

    /// Compare the expected MAC against a received one, in constant time.
    pub fn mac_is_good(&self, received: &[u8; 32]) -> bool {
        self.rend_auth_mac[..].ct_eq(&received[..]).into()
    }
}

impl Debug for NtorRendKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NtorRendKeys(<sensitive>)")
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
    use hex_literal::hex;

    #[test]
    fn onion_address() {
        let pk = hex!("a2afdc3e25eef5afdbde05c62bcf0974584d55c35e3ef38bac27b0bc32a1b2a0");
        let id = HsId::new(pk);
        let addr = id.onion_address();

        // 56 base32 characters plus ".onion".
        assert_eq!(addr.len(), 62);
        assert!(addr.ends_with(".onion"));
        assert_eq!(format!("{}", id), addr);

        // The address must decode back to pubkey ‖ checksum ‖ version,
        // with the checksum matching its definition.
        let raw = BASE32_NOPAD
            .decode(addr[..56].to_ascii_uppercase().as_bytes())
            .unwrap();
        assert_eq!(raw.len(), 35);
        assert_eq!(&raw[..32], &pk);
        assert_eq!(raw[34], 3);
        let mut hasher = Sha3_256::new();
        hasher.update(ONION_CHECKSUM_PREFIX);
        hasher.update(pk);
        hasher.update([3_u8]);
        let checksum = hasher.finalize();
        assert_eq!(&raw[32..34], &checksum[..2]);
    }

    #[test]
    fn blinded_base64_is_urlsafe_unpadded() {
        let mut bytes = [0_u8; 32];
        bytes[0] = 0xfb;
        bytes[31] = 0x7f;
        let blinded = BlindedId::new(bytes);
        let b64 = blinded.to_base64();
        assert_eq!(b64.len(), 43);
        assert!(!b64.contains('='));
        assert!(!b64.contains('+'));
        assert!(!b64.contains('/'));
    }

    #[test]
    fn cookies_are_random() {
        let mut rng = rand::thread_rng();
        let c1 = RendCookie::random(&mut rng);
        let c2 = RendCookie::random(&mut rng);
        assert_ne!(c1, c2);
    }

    #[test]
    fn mac_compare() {
        let keys = NtorRendKeys::new([1; 32], [2; 32]);
        assert!(keys.mac_is_good(&[2; 32]));
        let mut bad = [2; 32];
        bad[31] ^= 1;
        assert!(!keys.mac_is_good(&bad));
    }
}
