//! Helpers shared by codec implementations.

use crate::Error;
use bytes::Buf;

/// Returns [Error::EndOfBuffer] unless `buf` holds at least `len` more bytes.
#[inline]
pub fn at_least(buf: &impl Buf, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}
