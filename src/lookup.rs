//! Hashed path lookup
//!
//! Paths are keyed by a 32-bit DJB2 variant over the separator-free
//! canonical path. The hash table is sorted ascending by hash, so a lookup
//! is a binary search plus, on a hash collision, a linear walk of the
//! contiguous equal-hash run.

use crate::error::Result;
use crate::format::ObjectHeader;
use crate::image::Image;

/// DJB2 hash of a canonical path: seed 5381, `hash = hash * 33 ^ byte`,
/// wrapping 32-bit arithmetic. This exact construction is the compatibility
/// contract with externally generated images; do not change it.
pub fn path_hash(path: &str) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in path.as_bytes() {
        hash = hash.wrapping_mul(33) ^ u32::from(byte);
    }
    hash
}

/// The namespace is keyed on separator-free paths matching how images are
/// built, so leading separators are stripped before hashing.
pub(crate) fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Find the record for `path`. A miss is the ordinary `None` outcome;
/// `Err` is reserved for a corrupt image.
pub(crate) fn resolve(image: &Image, path: &str) -> Result<Option<ObjectHeader>> {
    let path = normalize(path);
    let hash = path_hash(path);
    tracing::trace!("resolving {:?} (hash {:08x})", path, hash);

    let n = image.num_objects() as usize;
    let mut lo = 0usize;
    let mut hi = n;
    let mut found = None;
    while lo < hi {
        let middle = lo + (hi - lo) / 2;
        let (entry_hash, offset) = image.hash_entry(middle)?;
        if entry_hash == hash {
            found = Some((middle, offset));
            break;
        } else if entry_hash < hash {
            lo = middle + 1;
        } else {
            hi = middle;
        }
    }
    let Some((middle, offset)) = found else {
        return Ok(None);
    };

    // Be optimistic and test the entry the search landed on.
    let object = image.object_at(offset as usize)?;
    if object.path_bytes(image.bytes())? == path.as_bytes() {
        return Ok(Some(object));
    }

    // Hash collision: back up to the first entry of the equal-hash run,
    // then walk the run looking for an exact path match.
    tracing::debug!("hash collision on {:08x}, walking the run", hash);
    let skip = middle;
    let mut i = middle;
    while i > 0 && image.hash_entry(i - 1)?.0 == hash {
        i -= 1;
    }
    while i < n {
        let (entry_hash, offset) = image.hash_entry(i)?;
        if entry_hash != hash {
            break;
        }
        if i != skip {
            let object = image.object_at(offset as usize)?;
            if object.path_bytes(image.bytes())? == path.as_bytes() {
                return Ok(Some(object));
            }
        }
        i += 1;
    }
    Ok(None)
}
