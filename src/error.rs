// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors that can occur while building or reading a [`crate::Sequence`].
///
/// Every variant here is fatal: none of them are caught and retried inside
/// the core, they abort the current operation and propagate to the caller.
#[derive(Debug)]
pub enum Error {
    /// A precondition was violated: writing through a frozen node, adding
    /// a child of the wrong height, nesting an `ANode` inside another
    /// `ANode`, or closing a [`crate::Builder`] with `allow_annotated_root
    /// = false` when annotations could not be pushed down any further.
    LogicError(&'static str),

    /// An internal consistency check failed: a balance predicate did not
    /// hold after an operation that is supposed to restore it, or a
    /// cumulative-size array drifted from its children. Indicates a bug
    /// in this crate rather than caller misuse.
    InvariantViolation(&'static str),

    /// `ANode::compact` could not reduce the overlay count below `MAX`.
    /// There is no internal fallback for this: it propagates straight to
    /// the caller, who is expected to have sized the overlay window so
    /// this cannot happen in practice.
    Full,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LogicError(msg) => write!(f, "logic error: {msg}"),
            Self::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            Self::Full => write!(f, "ANode is full and cannot be compacted further"),
        }
    }
}

impl std::error::Error for Error {}

/// Sequence result.
pub type Result<T> = std::result::Result<T, Error>;
