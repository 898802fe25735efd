//! Iterative selection algorithms: quickselect over an index permutation,
//! and the median-of-k helper `KDTree` build uses to find a pivot.
//!
//! Recursion is forbidden on cloud-sized structures, so both the
//! k-th-element selection used by `KDTree::build` and `Metrics::median` are
//! written as explicit loops, never as a recursive divide-and-conquer.

/// Partitions `indices[lo..hi]` in place so that, after the call, the
/// element at `indices[k]` is the one that would occupy position `k` in
/// sorted order, `key(indices[lo..k])` are all `<=` it and
/// `key(indices[k..hi])` are all `>=` it. Expected O(n). Never copies or
/// sorts the underlying data; only the index permutation is mutated.
pub fn quickselect_by<T, F>(indices: &mut [usize], k: usize, key: F)
where
    F: Fn(usize) -> T,
    T: PartialOrd + Copy,
{
    let mut lo = 0usize;
    let mut hi = indices.len();
    assert!(k < hi, "k out of bounds for quickselect");

    while hi - lo > 1 {
        let pivot_index = lo + (hi - lo) / 2;
        let pivot_value = key(indices[pivot_index]);
        indices.swap(pivot_index, hi - 1);

        let mut store = lo;
        for i in lo..hi - 1 {
            if key(indices[i]) < pivot_value {
                indices.swap(i, store);
                store += 1;
            }
        }
        indices.swap(store, hi - 1);

        if k < store {
            hi = store;
        } else if k > store {
            lo = store + 1;
        } else {
            return;
        }
    }
}

/// Selects the k-th smallest `f64` from `values` without sorting the whole
/// slice (and without allocating a sorted copy), via quickselect over a
/// freshly built index permutation.
pub fn select_kth(values: &[f64], k: usize) -> f64 {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    quickselect_by(&mut indices, k, |i| values[i]);
    values[indices[k]]
}

/// Linear-time median: for even-length inputs this is the lower of the two
/// middle order statistics, which matches spec's "select_median" contract
/// (a single representative value, not an averaged pair) and keeps the
/// computation to one quickselect pass.
pub fn median(values: &[f64]) -> f64 {
    assert!(!values.is_empty());
    select_kth(values, values.len() / 2)
}
