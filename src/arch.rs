//! Checked integer casts used when translating wire-format fields
//! (always `u16`/`u32`) into the `usize`/`u64` values the rest of the
//! crate works with.

use crate::result::*;

/// A checked cast from some unsigned wire-format integer to `usize`.
///
/// We could use the `cast` crate
/// (<https://docs.rs/cast/0.2.3/cast/>),
/// but this is the only conversion we really need.
pub fn usize<I: Into<u64>>(i: I) -> ZipResult<usize> {
    let i: u64 = i.into();
    usize::try_from(i).map_err(|_| ZipError::TooLarge)
}
