//! `seekzip` reads ZIP archives from any seekable byte source — a file,
//! a `Cursor<Vec<u8>>`, or your own `Read + Seek` wrapper around a range
//! reader — without mapping the whole thing into memory.
//!
//! Opening an archive parses the End Of Central Directory Record and the
//! full Central Directory up front, so every member's metadata is
//! available immediately:
//!
//! ```
//! use std::io::Cursor;
//! use seekzip::Archive;
//!
//! # fn make_test_archive() -> Vec<u8> {
//! #     let mut buf = Vec::new();
//! #     buf.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
//! #     buf.extend_from_slice(&[0u8; 18]);
//! #     buf
//! # }
//! let bytes = make_test_archive();
//! let archive = Archive::open(Cursor::new(bytes))?;
//! for entry in archive.entries() {
//!     println!("{:?} ({} bytes)", entry.name, entry.uncompressed_size);
//! }
//! # Ok::<(), seekzip::result::ZipError>(())
//! ```
//!
//! Member payloads are decompressed on demand with [`Archive::decompress_into`],
//! which streams into any [`std::io::Write`] and verifies both the
//! uncompressed size and the CRC-32 recorded in the Central Directory.

mod arch;
mod crc_reader;
mod datetime;
mod locator;
pub mod read;
pub mod result;
mod spec;

pub use datetime::DateTime;
pub use read::{Archive, Entry};
pub use result::{RecordKind, ZipError, ZipResult};
pub use spec::{CompressionMethod, DeflateLevel, Os};
