//! Set algebra over part lists
//!
//! Every function here compares parts by [`Part::key`], i.e. by the full
//! `(path, file_size, offset, size, actual_size)` tuple. A destination part
//! with the right offset but a different size is therefore not "present":
//! it shows up in `difference(dst, src)` and gets deleted and re-transferred.

use std::collections::{BTreeMap, HashSet};

use super::part::Part;

/// Returns the parts of `a` whose key is absent from `b`, in `a`'s order.
pub fn difference(a: &[Part], b: &[Part]) -> Vec<Part> {
    let keys: HashSet<String> = b.iter().map(Part::key).collect();
    a.iter().filter(|p| !keys.contains(&p.key())).cloned().collect()
}

/// Returns the parts of `a` whose key is also present in `b`, in `a`'s order.
pub fn intersect(a: &[Part], b: &[Part]) -> Vec<Part> {
    let keys: HashSet<String> = b.iter().map(Part::key).collect();
    a.iter().filter(|p| keys.contains(&p.key())).cloned().collect()
}

/// Sorts parts by `(path, offset)`.
///
/// The sort is stable, so parts sharing a path and offset keep their
/// relative order.
pub fn sort_parts(parts: &mut [Part]) {
    parts.sort_by(|a, b| a.path.cmp(&b.path).then(a.offset.cmp(&b.offset)));
}

/// Total number of bytes the parts are meant to hold.
pub fn parts_size(parts: &[Part]) -> u64 {
    parts.iter().map(|p| p.size).sum()
}

/// Groups parts by path, each group sorted by offset.
pub fn group_by_path(parts: Vec<Part>) -> BTreeMap<String, Vec<Part>> {
    let mut groups: BTreeMap<String, Vec<Part>> = BTreeMap::new();
    for part in parts {
        groups.entry(part.path.clone()).or_default().push(part);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|p| p.offset);
    }
    groups
}
