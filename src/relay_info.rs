//! Translate relay information from the formats used in the onion service
//! protocol into extend targets that the circuit layer can build to.

use std::net::{IpAddr, SocketAddr};

use crate::desc::{IntroPointDesc, LinkSpec};
use crate::ident::{Curve25519Public, Ed25519Identity, RsaIdentity};

/// Everything the circuit layer needs to extend a circuit to one relay:
/// addresses, identities, and the ntor onion key.
#[derive(Clone, Debug)]
pub struct ExtendTarget {
    /// OR port addresses, in link specifier order.
    addrs: Vec<SocketAddr>,
    /// The relay's legacy identity digest.
    rsa_id: RsaIdentity,
    /// The relay's ed25519 identity, when the descriptor listed one.
    ed_id: Option<Ed25519Identity>,
    /// The relay's ntor onion key.
    ntor_onion_key: Curve25519Public,
}

impl ExtendTarget {
    /// Return the usable OR port addresses.
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Return the legacy identity digest.
    pub fn rsa_id(&self) -> &RsaIdentity {
        &self.rsa_id
    }

    /// Return the ed25519 identity, if known.
    pub fn ed_id(&self) -> Option<&Ed25519Identity> {
        self.ed_id.as_ref()
    }

    /// Return the ntor onion key.
    pub fn ntor_onion_key(&self) -> &Curve25519Public {
        &self.ntor_onion_key
    }
}

/// Construct an [`ExtendTarget`] from a provided [`IntroPointDesc`].
///
/// Clients use this to convert an introduction point from the onion
/// service descriptor into a form they can hand to the circuit layer when
/// building or re-extending an introduction circuit.
///
/// Addresses that are not publicly routable are dropped unless
/// `allow_internal` is set; clients never connect to relays directly, so
/// there is no non-anonymous fallback here.
pub(crate) fn ipt_to_extend_target(
    desc: &IntroPointDesc,
    allow_internal: bool,
) -> Result<ExtendTarget, InvalidTarget> {
    let mut addrs = Vec::new();
    let mut rsa_id = None;
    let mut ed_id = None;

    for ls in desc.link_specifiers() {
        match ls {
            LinkSpec::OrPort(addr, port) => {
                if *port == 0 {
                    continue;
                }
                if addr_is_internal(addr) && !allow_internal {
                    continue;
                }
                addrs.push(SocketAddr::new(*addr, *port));
            }
            LinkSpec::RsaId(id) => {
                rsa_id.get_or_insert(*id);
            }
            LinkSpec::Ed25519Id(id) => {
                ed_id.get_or_insert(*id);
            }
            LinkSpec::Unrecognized(_, _) => {}
        }
    }

    let rsa_id = rsa_id.ok_or(InvalidTarget::MissingLegacyId)?;
    if addrs.is_empty() {
        return Err(InvalidTarget::NoUsableAddress);
    }

    Ok(ExtendTarget {
        addrs,
        rsa_id,
        ed_id,
        ntor_onion_key: *desc.onion_key(),
    })
}

/// We were given unusable information about an introduction point.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidTarget {
    /// The link specifiers named no address we may extend to.
    ///
    /// Either there were no OR port specifiers at all, or every address
    /// was internal and extending to internal addresses is disallowed.
    #[error("link specifiers named no usable address")]
    NoUsableAddress,

    /// The link specifiers did not include a legacy identity digest.
    #[error("link specifiers did not include a legacy identity")]
    MissingLegacyId,
}

/// Return true iff `addr` is not publicly routable.
fn addr_is_internal(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let seg0 = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7, unique local
                || (seg0 & 0xfe00) == 0xfc00
                // fe80::/10, link local
                || (seg0 & 0xffc0) == 0xfe80
        }
    }
}
