//! Effects produced by session transitions

/// Work the controller performs after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    /// Initial conversation list load for the new user
    LoadConversations,
    /// Drop every conversation and message held in memory
    PurgeStore,
    /// Sign out at the identity provider and drop the cached credential
    InvalidateCredential,
}
