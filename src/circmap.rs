//! Map from rendezvous cookie to the rendezvous circuit that registered
//! it.
//!
//! The introduction circuit and the rendezvous circuit of one attempt are
//! not co-located objects; this map is the back-reference between them.
//! It holds circuit *handles*, never circuits: the circuit layer owns the
//! circuits themselves.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::ident::RendCookie;

/// Cookie → rendezvous circuit handle.
///
/// Written in one place (when ESTABLISH_RENDEZVOUS is sent) and read when
/// an INTRODUCE_ACK needs to find its paired rendezvous circuit.
#[derive(Debug)]
pub(crate) struct RendCircMap<C> {
    /// The registrations.
    by_cookie: HashMap<RendCookie, C>,
}

// (Not derived: `derive(Default)` would needlessly require `C: Default`.)
impl<C> Default for RendCircMap<C> {
    fn default() -> Self {
        RendCircMap {
            by_cookie: HashMap::new(),
        }
    }
}

impl<C: Copy + Eq + Hash + Debug> RendCircMap<C> {
    /// Register `circ` as the rendezvous circuit for `cookie`.
    ///
    /// Returns the handle that was previously registered under this
    /// cookie, if any. (With 20-byte random cookies this only happens if
    /// something has gone quite wrong; callers log it.)
    pub(crate) fn register(&mut self, cookie: RendCookie, circ: C) -> Option<C> {
        self.by_cookie.insert(cookie, circ)
    }

    /// Return the rendezvous circuit registered for `cookie`, if any.
    pub(crate) fn by_cookie(&self, cookie: &RendCookie) -> Option<C> {
        self.by_cookie.get(cookie).copied()
    }

    /// Drop the registration for `cookie` if it names `circ`.
    ///
    /// Used when a circuit goes away: the cookie may meanwhile have been
    /// re-registered by a fresh circuit, which must not be unregistered.
    pub(crate) fn unregister(&mut self, cookie: &RendCookie, circ: C) {
        if self.by_cookie.get(cookie) == Some(&circ) {
            self.by_cookie.remove(cookie);
        }
    }
}
