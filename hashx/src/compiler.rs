//! Native code backends for generated programs.
//!
//! Both backends produce code equivalent to [`Program::interpret`](crate::Program::interpret)
//! and are only built for x86-64. Elsewhere, compiling returns [`Error::NotAvailable`].
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod assembler;
        mod exec;
        mod x86_64;

        pub(crate) use x86_64::{ScalarProgram, VectorProgram};
    } else {
        mod unsupported;

        pub(crate) use unsupported::{ScalarProgram, VectorProgram};
    }
}
