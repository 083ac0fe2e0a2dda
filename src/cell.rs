//! Minimal decoding for the relay payloads the client core consumes:
//! INTRODUCE_ACK and RENDEZVOUS2.
//!
//! Everything the core *sends* is built by the circuit layer; only what it
//! must interpret is parsed here.

use caret::caret_int;

use crate::ident::Curve25519Public;

caret_int! {
    /// A status code returned in response to an INTRODUCE1 message.
    pub struct IntroduceAckStatus(u16) {
        /// The message was relayed successfully.
        SUCCESS = 0x0000,
        /// The introduction point does not have a live circuit from the
        /// identified service.
        NOT_RECOGNIZED = 0x0001,
        /// There was a failure while parsing the INTRODUCE1 message.
        BAD_MESSAGE_FORMAT = 0x0002,
        /// The introduction point was unable to deliver the message to the
        /// service.
        CANT_RELAY = 0x0003
    }
}

/// Length of the RENDEZVOUS2 handshake information:
/// a 32-byte server curve25519 key followed by a 32-byte auth MAC.
pub(crate) const REND2_HANDSHAKE_LEN: usize = 64;

/// A payload was too short to be the message it claims to be.
#[derive(Clone, Debug, thiserror::Error)]
#[error("truncated {msg} payload: {len} bytes")]
pub(crate) struct TruncatedPayload {
    /// Which message failed to parse.
    pub(crate) msg: &'static str,
    /// How long the payload actually was.
    pub(crate) len: usize,
}

/// Parse an INTRODUCE_ACK payload into its status code.
///
/// Trailing extensions are tolerated and ignored.
pub(crate) fn parse_introduce_ack(
    payload: &[u8],
) -> Result<IntroduceAckStatus, TruncatedPayload> {
    if payload.len() < 2 {
        return Err(TruncatedPayload {
            msg: "INTRODUCE_ACK",
            len: payload.len(),
        });
    }
    let status = u16::from_be_bytes([payload[0], payload[1]]);
    Ok(status.into())
}

/// Parse a RENDEZVOUS2 payload into the server's public key and the
/// authentication MAC.
pub(crate) fn parse_rendezvous2(
    payload: &[u8],
) -> Result<(Curve25519Public, [u8; 32]), TruncatedPayload> {
    if payload.len() < REND2_HANDSHAKE_LEN {
        return Err(TruncatedPayload {
            msg: "RENDEZVOUS2",
            len: payload.len(),
        });
    }
    let mut server_pk = [0_u8; 32];
    server_pk.copy_from_slice(&payload[..32]);
    let mut auth_mac = [0_u8; 32];
    auth_mac.copy_from_slice(&payload[32..64]);
    Ok((Curve25519Public::new(server_pk), auth_mac))
}
