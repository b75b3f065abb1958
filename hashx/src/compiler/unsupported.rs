//! Stand-ins for targets without a backend, they can never be constructed.
use std::convert::Infallible;

use crate::{
    error::Error,
    program::Program,
    register::{RegisterFile, VectorRegisterFile},
};

#[derive(Debug)]
pub(crate) struct ScalarProgram(Infallible);

impl ScalarProgram {
    pub(crate) const fn compile(_program: &Program) -> Result<Self, Error> {
        Err(Error::NotAvailable)
    }

    pub(crate) const fn run(&self, _registers: &mut RegisterFile) {
        match self.0 {}
    }
}

#[derive(Debug)]
pub(crate) struct VectorProgram(Infallible);

impl VectorProgram {
    pub(crate) const fn compile(_program: &Program) -> Result<Self, Error> {
        Err(Error::NotAvailable)
    }

    pub(crate) const fn supported() -> bool {
        false
    }

    pub(crate) const fn run(&self, _registers: &mut VectorRegisterFile) {
        match self.0 {}
    }
}
