use std::io;

/// Errors returned while building a [`crate::HashX`] instance.
#[derive(Debug, thiserror::Error)]
#[expect(clippy::error_impl_error, reason = "re-exported as `hashx::Error`")]
pub enum Error {
    /// Every generation attempt ended with a program that broke the whole-program constraints.
    #[error("program generation failed the whole-program constraints")]
    ProgramConstraints,
    /// A compiled runtime was requested but is not supported here.
    #[error("the requested compiled runtime is not available on this CPU or target")]
    NotAvailable,
    /// The executable memory provider failed to map or protect a code buffer.
    #[error("failed to prepare executable memory: {0}")]
    ExecutableMemory(#[from] io::Error),
}
