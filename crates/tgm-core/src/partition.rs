//! Round-robin work partitioning.

/// Assign item *i* to bucket `i % buckets`.
///
/// Deterministic and stable: near-even load (bucket sizes differ by at most
/// one) without item weights, and reproducible for tests. `buckets == 0`
/// yields no buckets at all; callers treat that as a configuration error
/// before ever getting here.
pub fn round_robin<T>(items: Vec<T>, buckets: usize) -> Vec<Vec<T>> {
    if buckets == 0 {
        return Vec::new();
    }
    let mut out: Vec<Vec<T>> = (0..buckets).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        out[i % buckets].push(item);
    }
    out
}
