//! Type-safe identity wrapper and the identity-provider boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Type-safe wrapper for authenticated identity keys.
///
/// Ensures identity keys cannot be accidentally used where entity ids or
/// channel keys are expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(String);

impl IdentityId {
    /// Creates a new IdentityId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for IdentityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Boundary contract for the authentication collaborator.
///
/// Supplies the current authenticated identity and a change stream for
/// sign-in/sign-out events. The registry treats an identity change as a key
/// change requiring teardown-and-recreate of every live channel.
pub trait IdentityProvider: Send + Sync {
    /// The currently authenticated identity, if any.
    fn current(&self) -> Option<IdentityId>;

    /// A watch stream of identity changes. `None` means signed out.
    fn watch(&self) -> watch::Receiver<Option<IdentityId>>;
}

/// Watch-channel backed [`IdentityProvider`].
///
/// The simplest concrete provider: the host application pushes sign-in and
/// sign-out transitions, consumers observe them through the watch stream.
pub struct SessionIdentity {
    tx: watch::Sender<Option<IdentityId>>,
}

impl SessionIdentity {
    /// Create a provider with an initial identity (or signed-out state).
    pub fn new(initial: Option<IdentityId>) -> Arc<Self> {
        let (tx, _rx) = watch::channel(initial);
        Arc::new(Self { tx })
    }

    /// Record a sign-in (or identity switch).
    pub fn sign_in(&self, identity: IdentityId) {
        let _ = self.tx.send(Some(identity));
    }

    /// Record a sign-out.
    pub fn sign_out(&self) {
        let _ = self.tx.send(None);
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<IdentityId> {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<IdentityId>> {
        self.tx.subscribe()
    }
}
