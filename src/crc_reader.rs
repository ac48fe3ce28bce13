//! Helper adapter that tallies a running CRC-32 and byte count while
//! data streams through it.
//!
//! Unlike a reader that errors out of `read()` at EOF on a CRC mismatch,
//! this one just tallies: the decompression pipeline compares the final
//! count and digest against the Central Directory's recorded values
//! itself, since it also has to check the uncompressed size.

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

/// Wraps a reader, accumulating a CRC-32 and byte count of everything
/// read through it.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    count: u64,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R) -> Self {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    /// Number of bytes read through this adapter so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The CRC-32 of everything read through this adapter so far.
    pub fn digest(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}
