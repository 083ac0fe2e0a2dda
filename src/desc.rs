//! The onion service descriptor as seen by the client core.
//!
//! Parsing, decryption, and signature math belong to the descriptor codec
//! collaborator; this module only models the parts the rendezvous engine
//! routes around: the signing-key certificate (opaque), the introduction
//! points, and the subcredential the descriptor was decrypted with.

use std::net::IpAddr;

use crate::ident::{
    Curve25519Public, Ed25519Identity, IntroAuthKey, IntroEncKey, RsaIdentity, Subcredential,
};

/// A decoded onion service descriptor.
#[derive(Clone, Debug)]
pub struct HsDescriptor {
    /// Descriptor format version.
    version: u8,
    /// The signing-key certificate, cross-signed by the blinded key.
    ///
    /// Opaque to the core; the codec collaborator validates it.
    signing_key_cert: DescSigningCert,
    /// The service's introduction points, in descriptor order.
    intro_points: Vec<IntroPointDesc>,
    /// The subcredential this descriptor was decrypted with.
    ///
    /// Kept here because the INTRODUCE1 handshake must be bound to the
    /// same service and period the descriptor came from.
    subcredential: Subcredential,
}

impl HsDescriptor {
    /// Assemble a descriptor from its parts.
    ///
    /// Normally only called by a descriptor codec implementation.
    pub fn new(
        version: u8,
        signing_key_cert: DescSigningCert,
        intro_points: Vec<IntroPointDesc>,
        subcredential: Subcredential,
    ) -> Self {
        HsDescriptor {
            version,
            signing_key_cert,
            intro_points,
            subcredential,
        }
    }

    /// Return the descriptor format version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the signing-key certificate.
    pub fn signing_key_cert(&self) -> &DescSigningCert {
        &self.signing_key_cert
    }

    /// Return the introduction points, in descriptor order.
    pub fn intro_points(&self) -> &[IntroPointDesc] {
        &self.intro_points
    }

    /// Return the subcredential this descriptor was decrypted with.
    pub fn subcredential(&self) -> &Subcredential {
        &self.subcredential
    }
}

/// An encoded descriptor signing-key certificate.
///
/// The core never looks inside; it hands the certificate to the codec
/// together with the blinded key it must be cross-signed by.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DescSigningCert(Vec<u8>);

impl DescSigningCert {
    /// Wrap an encoded certificate.
    pub fn new(encoded: Vec<u8>) -> Self {
        DescSigningCert(encoded)
    }

    /// Return the encoded bytes.
    pub fn as_encoded(&self) -> &[u8] {
        &self.0
    }
}

/// One introduction point from a descriptor.
#[derive(Clone, Debug)]
pub struct IntroPointDesc {
    /// The service's authentication key at this introduction point
    /// (the signed key of the auth-key certificate).
    auth_key: IntroAuthKey,
    /// The service's curve25519 encryption key for this introduction
    /// point, consumed by the rendezvous handshake.
    enc_key: IntroEncKey,
    /// The introduction point relay's ntor onion key, needed to extend
    /// a circuit to it.
    onion_key: Curve25519Public,
    /// The relay's link specifiers, in descriptor order.
    link_specifiers: Vec<LinkSpec>,
}

impl IntroPointDesc {
    /// Assemble an introduction point description.
    pub fn new(
        auth_key: IntroAuthKey,
        enc_key: IntroEncKey,
        onion_key: Curve25519Public,
        link_specifiers: Vec<LinkSpec>,
    ) -> Self {
        IntroPointDesc {
            auth_key,
            enc_key,
            onion_key,
            link_specifiers,
        }
    }

    /// Return the service's authentication key at this introduction point.
    pub fn auth_key(&self) -> &IntroAuthKey {
        &self.auth_key
    }

    /// Return the service's encryption key for this introduction point.
    pub fn enc_key(&self) -> &IntroEncKey {
        &self.enc_key
    }

    /// Return the relay's ntor onion key.
    pub fn onion_key(&self) -> &Curve25519Public {
        &self.onion_key
    }

    /// Return the relay's link specifiers.
    pub fn link_specifiers(&self) -> &[LinkSpec] {
        &self.link_specifiers
    }

    /// Return the first legacy (RSA) identity among the link specifiers,
    /// if there is one.
    pub fn legacy_id(&self) -> Option<&RsaIdentity> {
        self.link_specifiers.iter().find_map(|ls| match ls {
            LinkSpec::RsaId(id) => Some(id),
            _ => None,
        })
    }
}

/// A single link specifier: one way of naming or reaching a relay.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum LinkSpec {
    /// The TCP address of an OR port.
    OrPort(IpAddr, u16),
    /// The legacy identity (RSA identity digest) of the relay.
    RsaId(RsaIdentity),
    /// The ed25519 identity of the relay.
    Ed25519Id(Ed25519Identity),
    /// A link specifier of a type we do not recognize.
    Unrecognized(u8, Vec<u8>),
}
