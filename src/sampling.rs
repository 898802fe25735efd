//! Deterministic stride downsampling for ICP's adaptive working set.

/// Indices `0, k, 2k, ...` into an `n`-point cloud, targeting approximately
/// `target_count` samples. Always includes index 0 and never returns more
/// than `n` indices. Stride (not random sampling) keeps iteration-to-
/// iteration results reproducible for a fixed `target_count`.
pub fn stride_indices(n: usize, target_count: usize) -> Vec<usize> {
    if target_count == 0 || n == 0 {
        return Vec::new();
    }
    if target_count >= n {
        return (0..n).collect();
    }
    let stride = (n as f64 / target_count as f64).ceil() as usize;
    let stride = stride.max(1);
    (0..n).step_by(stride).collect()
}
