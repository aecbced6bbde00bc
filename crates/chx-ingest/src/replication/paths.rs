//! Sequence number to delta file URL resolution
//!
//! The feed shards delta files by base-1000 digit groups: sequence 4321
//! lives at `000/004/321.osm.gz`. Exactly three zero-padded groups are
//! always produced, so sequence 0 resolves to `000/000/000.osm.gz`.

/// File suffix of one delta file
pub const DELTA_SUFFIX: &str = ".osm.gz";

/// Resolve the delta file URL for a sequence number.
///
/// Deterministic and side-effect free. A negative sequence is clamped to
/// zero; the minutely feed defines sequence 0 as its origin.
pub fn locate(base_url: &str, sequence: i64) -> String {
    let mut remainder = sequence.max(0);
    let mut groups: Vec<String> = Vec::with_capacity(3);

    while remainder > 0 {
        groups.insert(0, format!("{:03}", remainder % 1000));
        remainder /= 1000;
    }
    while groups.len() < 3 {
        groups.insert(0, "000".to_string());
    }

    format!(
        "{}/{}{}",
        base_url.trim_end_matches('/'),
        groups.join("/"),
        DELTA_SUFFIX
    )
}
