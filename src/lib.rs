//! bakedfs: a read-only virtual filesystem over a monolithic binary image.
//!
//! An image is baked once at build time (see [`ImageBuilder`]) and mounted
//! at runtime as an immutable byte buffer, typically memory-mapped flash on
//! a constrained target. Any of thousands of objects is located in O(log n)
//! through a sorted hash table with no runtime index build, and file
//! contents are read either in place (uncompressed) or through a resumable
//! streaming decompressor with full forward/backward seek support.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header: magic, version, table offsets        │
//! ├──────────────────────────────────────────────┤
//! │ Hash table: (hash, offset), sorted by hash   │
//! ├──────────────────────────────────────────────┤
//! │ Sort table: offset per stable object index   │
//! ├──────────────────────────────────────────────┤
//! │ Object records: header, path, payload        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use bakedfs::{ImageBuilder, Volume};
//!
//! let image = ImageBuilder::new()
//!     .add_file("greeting.txt", b"hello")
//!     .build()
//!     .unwrap();
//!
//! let volume = Volume::mount_buffer(image).unwrap();
//! let mut file = volume.open("/greeting.txt").unwrap();
//!
//! let mut buf = [0u8; 16];
//! let n = file.read(&mut buf).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! ```
//!
//! The volume is immutable after mount and freely shared across threads;
//! each [`File`] handle is exclusively owned by its consumer.

pub mod builder;
pub mod decode;
pub mod error;
pub mod file;
pub mod format;
pub mod image;
pub mod lookup;
pub mod volume;

pub use builder::ImageBuilder;
pub use decode::{DeflateDecoder, StreamDecoder};
pub use error::{FsError, Result};
pub use file::File;
pub use format::{CompressionKind, FileFlags, ObjectKind};
pub use image::ImageSource;
pub use lookup::path_hash;
pub use volume::{Stat, Volume};
