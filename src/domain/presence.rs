//! Presence member tracking per channel.
//!
//! [`PresenceTracker`] holds the set of other members present on each
//! channel. It is mutated only by the protocol state machine; callers get a
//! read-only [`PresenceView`]. The local user's own id is never stored.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use super::MemberId;

/// Member sets keyed by channel name.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    channels: HashMap<String, BTreeSet<MemberId>>,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the members present on `channel`, sorted by id.
    #[must_use]
    pub fn members(&self, channel: &str) -> BTreeSet<MemberId> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    /// Returns `true` if `member` is present on `channel`.
    #[must_use]
    pub fn is_member(&self, channel: &str, member: &MemberId) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|set| set.contains(member))
    }

    /// Replaces the member set of `channel` with `snapshot`, minus `self_id`.
    pub(crate) fn seed<I>(&mut self, channel: &str, snapshot: I, self_id: &MemberId)
    where
        I: IntoIterator<Item = MemberId>,
    {
        let members = snapshot.into_iter().filter(|m| m != self_id).collect();
        self.channels.insert(channel.to_string(), members);
    }

    /// Adds `member` to `channel`. Returns `false` when `member` is the local
    /// user, who is never tracked.
    pub(crate) fn add(&mut self, channel: &str, member: MemberId, self_id: &MemberId) -> bool {
        if &member == self_id {
            return false;
        }
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(member);
        true
    }

    /// Removes `member` from `channel`. Returns `true` if it was present.
    pub(crate) fn remove(&mut self, channel: &str, member: &MemberId) -> bool {
        self.channels
            .get_mut(channel)
            .is_some_and(|set| set.remove(member))
    }

    /// Discards every channel's member set.
    pub(crate) fn clear(&mut self) {
        self.channels.clear();
    }
}

/// Shared, read-only handle onto a [`PresenceTracker`].
///
/// The connection manager holds the write side; every clone of the view
/// observes its latest state.
#[derive(Debug, Clone, Default)]
pub struct PresenceView {
    tracker: Arc<RwLock<PresenceTracker>>,
}

impl PresenceView {
    pub(crate) fn new(tracker: Arc<RwLock<PresenceTracker>>) -> Self {
        Self { tracker }
    }

    /// Returns the members present on `channel`, sorted by id.
    #[must_use]
    pub fn members(&self, channel: &str) -> BTreeSet<MemberId> {
        self.tracker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members(channel)
    }

    /// Returns `true` if `member` is present on `channel`.
    #[must_use]
    pub fn is_member(&self, channel: &str, member: &MemberId) -> bool {
        self.tracker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_member(channel, member)
    }
}
