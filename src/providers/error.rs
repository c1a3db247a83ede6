//! Provider error taxonomy (spec §7).
//!
//! A `thiserror` enum so the session can apply the error-handling policy
//! mechanically (match on variant) instead of string-matching provider
//! error messages, the way the teacher's library-boundary code
//! (e.g. `agent::llm`) uses `thiserror`-free `anyhow::bail!` for a CLI but
//! a typed enum is the better fit here since the *caller* (the session)
//! needs to branch on the failure class, not just log it.

use thiserror::Error;

/// Failure classes a provider client can report. See spec §7 for the
/// handling policy attached to each.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network blip, single 5xx, connection reset: fail the current turn
    /// only, session stays alive.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Malformed frame from the upstream: drop it and continue.
    #[error("protocol error from provider: {0}")]
    Protocol(String),

    /// Cannot establish the connection at session start: fatal for the
    /// session.
    #[error("fatal provider error: {0}")]
    Fatal(String),
}
