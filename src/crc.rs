//! CRC-32 verification for entry readers.

use std::io::{self, Read};

use crc32fast::Hasher;

/// Reader that hashes everything it reads and verifies the result against an
/// expected CRC-32 when the underlying reader reaches end of stream.
///
/// A mismatch is reported once, as an [`io::ErrorKind::InvalidData`] error
/// wrapping [`crate::Error::CrcMismatch`].
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    expected: u32,
    entry_name: String,
    verified: bool,
}

impl<R: Read> Crc32Reader<R> {
    /// Wraps `inner`, verifying against `expected` at end of stream.
    /// `entry_name` is used for error reporting only.
    pub fn new(inner: R, expected: u32, entry_name: impl Into<String>) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            expected,
            entry_name: entry_name.into(),
            verified: false,
        }
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 {
            if !buf.is_empty() && !self.verified {
                self.verified = true;
                let actual = self.hasher.clone().finalize();
                if actual != self.expected {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        crate::Error::CrcMismatch {
                            entry_name: std::mem::take(&mut self.entry_name),
                            expected: self.expected,
                            actual,
                        },
                    ));
                }
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}
