//! Reader for method code items: a uleb128 header, the raw bytecode and
//! the try/catch table.

pub mod code;
pub mod error;
pub mod leb128;
pub mod writer;

use std::fs;
use std::path::Path;

use memmap2::Mmap;

pub use code::{CatchBlock, CodeItem, TryBlock};
pub use error::{Error, Result};
pub use writer::CodeWriter;

enum Storage {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// An immutable bytecode file, memory-mapped when opened from disk.
///
/// Code items borrow from the file, so many methods can be read (and
/// built in parallel) over one shared buffer.
pub struct CodeFile {
    storage: Storage,
}

impl CodeFile {
    /// Map the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        // SAFETY: the mapping is read-only and the file is not modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Io(e.to_string()))?;
        log::debug!("mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self {
            storage: Storage::Mapped(mmap),
        })
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::Mapped(m) => &m[..],
            Storage::Owned(v) => v.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Parse the code item at `offset`.
    pub fn code_item(&self, offset: u32) -> Result<CodeItem<'_>> {
        CodeItem::parse(self.data(), offset)
    }
}
