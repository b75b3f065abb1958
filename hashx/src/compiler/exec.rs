//! Executable memory for compiled programs.
use std::io;

use memmap2::{Mmap, MmapMut};

const PAGE_SIZE: usize = 4096;

/// A read-only, executable copy of generated machine code.
///
/// The mapping is never writable and executable at the same time.
#[derive(Debug)]
pub(crate) struct ExecutableBuffer {
    map: Mmap,
}

impl ExecutableBuffer {
    /// Copies `code` into fresh page aligned memory and makes it executable.
    pub(crate) fn new(code: &[u8]) -> io::Result<Self> {
        let len = code.len().max(1).next_multiple_of(PAGE_SIZE);
        let mut map = MmapMut::map_anon(len)?;
        map[..code.len()].copy_from_slice(code);

        Ok(Self {
            map: map.make_exec()?,
        })
    }

    /// The first byte of the code.
    pub(crate) fn entry(&self) -> *const u8 {
        self.map.as_ptr()
    }
}
