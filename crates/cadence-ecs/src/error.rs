//! Failure modes that surface as `Result` rather than an abort.
//! Duplicate add, missing-entity remove, and similar precondition
//! violations abort immediately per spec §7; this enum exists only for
//! the lookup-miss paths that are expected to happen in normal use.

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("entity {0:?} was never minted by this allocator")]
    UnknownEntity(crate::Entity),
}

/// Logs `msg` and aborts the process — the same single
/// abort-with-message primitive `cadence-alloc` uses for precondition
/// violations, reproduced here since component tables have no
/// dependency on the allocator crate.
#[track_caller]
pub(crate) fn abort_with(msg: &str) -> ! {
    tracing::error!(location = %std::panic::Location::caller(), "{msg}");
    std::process::abort()
}
