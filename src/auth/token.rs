//! Bearer token sources.
//!
//! The connection manager asks its [`TokenProvider`] for the current token
//! every time `connect()` runs. When none is available the connect attempt
//! fails fast and the caller may try again later.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Source of the bearer token used for the auth handshake.
pub trait TokenProvider: fmt::Debug + Send + Sync + 'static {
    /// Returns the current bearer token, if the user is signed in.
    fn bearer_token(&self) -> Option<String>;
}

/// A token fixed at construction time.
#[derive(Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Wraps a known token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider that never has a token.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}

/// A token slot that can be updated after sign-in or cleared on sign-out.
///
/// Clones share the same slot.
#[derive(Clone, Default)]
pub struct SharedToken {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new token, replacing any previous one.
    pub fn set(&self, token: impl Into<String>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Removes the stored token.
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl fmt::Debug for SharedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("SharedToken").field("present", &present).finish()
    }
}

impl TokenProvider for SharedToken {
    fn bearer_token(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|t| !t.is_empty())
    }
}
