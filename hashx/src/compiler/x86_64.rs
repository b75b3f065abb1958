//! x86-64 backends.
mod encode;
mod scalar;
mod vector;

use std::ptr;

use crate::{
    compiler::exec::ExecutableBuffer,
    error::Error,
    program::Program,
    register::{RegisterFile, VectorRegisterFile},
};

type ScalarFn = unsafe extern "sysv64" fn(*mut RegisterFile);
type VectorFn = unsafe extern "sysv64" fn(*mut VectorRegisterFile);

/// A program compiled to native code, one hash per call.
#[derive(Debug)]
pub(crate) struct ScalarProgram {
    code: ExecutableBuffer,
}

impl ScalarProgram {
    pub(crate) fn compile(program: &Program) -> Result<Self, Error> {
        let code = scalar::compile(program);
        tracing::debug!(bytes = code.len(), "compiled scalar program");

        Ok(Self {
            code: ExecutableBuffer::new(&code)?,
        })
    }

    pub(crate) fn run(&self, registers: &mut RegisterFile) {
        // SAFETY: the buffer holds a complete function with this signature, which only
        // touches the 64 bytes behind its argument and restores every callee saved register.
        unsafe {
            let f = std::mem::transmute::<*const u8, ScalarFn>(self.code.entry());
            f(ptr::from_mut(registers));
        }
    }
}

/// A program compiled to AVX-512 code, eight hashes per call.
#[derive(Debug)]
pub(crate) struct VectorProgram {
    code: ExecutableBuffer,
}

impl VectorProgram {
    /// # Errors
    /// [`Error::NotAvailable`] if the CPU lacks AVX-512F or AVX-512DQ.
    pub(crate) fn compile(program: &Program) -> Result<Self, Error> {
        if !Self::supported() {
            return Err(Error::NotAvailable);
        }

        let code = vector::compile(program);
        tracing::debug!(bytes = code.len(), "compiled vector program");

        Ok(Self {
            code: ExecutableBuffer::new(&code)?,
        })
    }

    pub(crate) fn supported() -> bool {
        is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512dq")
    }

    pub(crate) fn run(&self, registers: &mut VectorRegisterFile) {
        // SAFETY: the buffer holds a complete function with this signature, `compile` checked
        // the CPU runs it, and it only touches the 512 bytes behind its argument.
        unsafe {
            let f = std::mem::transmute::<*const u8, VectorFn>(self.code.entry());
            f(ptr::from_mut(registers));
        }
    }
}
