//! Exact nearest-neighbor search over a static 3D point set.
//!
//! Construction cycles the split axis through x, y, z by depth and selects
//! the median via iterative quickselect over an index permutation — no
//! coordinate data is copied, and the build uses an explicit work stack
//! rather than recursion so clouds of 200k+ points build without exhausting
//! the call stack.

use ndarray::ArrayView2;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

use crate::error::RegistrationError;
use crate::select::quickselect_by;

struct KdNode {
    point_index: usize,
    axis: u8,
    left: Option<u32>,
    right: Option<u32>,
}

/// A static KD-tree over a target cloud's points.
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<[f32; 3]>,
    root: u32,
}

enum Frame {
    Visit(u32),
    Continue { node: u32, axis_dist_sq: f32 },
}

impl KdTree {
    /// Builds a tree over `points` (an `(n, 3)` view). Fails with
    /// [`RegistrationError::EmptyIndex`] if `points` has zero rows.
    pub fn build(points: ArrayView2<f32>) -> Result<Self, RegistrationError> {
        let n = points.nrows();
        if n == 0 {
            return Err(RegistrationError::EmptyIndex);
        }

        let coords: Vec<[f32; 3]> = points
            .outer_iter()
            .map(|row| [row[0], row[1], row[2]])
            .collect();

        let mut indices: Vec<usize> = (0..n).collect();
        let mut nodes: Vec<KdNode> = Vec::with_capacity(n);
        let mut root = 0u32;

        enum Slot {
            Root,
            Child { parent: u32, is_left: bool },
        }

        // (lo, hi, depth, slot) over the shared `indices` buffer.
        let mut stack: Vec<(usize, usize, usize, Slot)> = vec![(0, n, 0, Slot::Root)];

        while let Some((lo, hi, depth, slot)) = stack.pop() {
            let axis = depth % 3;
            let mid = lo + (hi - lo) / 2;
            quickselect_by(&mut indices[lo..hi], mid - lo, |i| coords[i][axis]);

            let node_index = nodes.len() as u32;
            nodes.push(KdNode {
                point_index: indices[mid],
                axis: axis as u8,
                left: None,
                right: None,
            });

            match slot {
                Slot::Root => root = node_index,
                Slot::Child { parent, is_left } => {
                    if is_left {
                        nodes[parent as usize].left = Some(node_index);
                    } else {
                        nodes[parent as usize].right = Some(node_index);
                    }
                }
            }

            if mid > lo {
                stack.push((
                    lo,
                    mid,
                    depth + 1,
                    Slot::Child {
                        parent: node_index,
                        is_left: true,
                    },
                ));
            }
            if mid + 1 < hi {
                stack.push((
                    mid + 1,
                    hi,
                    depth + 1,
                    Slot::Child {
                        parent: node_index,
                        is_left: false,
                    },
                ));
            }
        }

        Ok(Self {
            nodes,
            points: coords,
            root,
        })
    }

    fn point(&self, index: usize) -> [f32; 3] {
        self.points[index]
    }

    /// The coordinates backing a point index returned by a prior query.
    pub fn point_unchecked(&self, index: usize) -> [f32; 3] {
        self.points[index]
    }

    fn validate_query(q: [f32; 3]) -> Result<(), RegistrationError> {
        if q.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(RegistrationError::InvalidQuery)
        }
    }

    /// Exact nearest neighbor, tie-broken toward the smaller point index.
    pub fn nearest(&self, q: [f32; 3]) -> Result<(usize, f32), RegistrationError> {
        Self::validate_query(q)?;

        let mut best_index = usize::MAX;
        let mut best_dist = f32::INFINITY;
        let mut stack = vec![Frame::Visit(self.root)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Continue { node, axis_dist_sq } => {
                    if axis_dist_sq < best_dist {
                        stack.push(Frame::Visit(node));
                    }
                }
                Frame::Visit(node_idx) => {
                    let node = &self.nodes[node_idx as usize];
                    let p = self.point(node.point_index);
                    let d = squared_distance(q, p);
                    if d < best_dist || (d == best_dist && node.point_index < best_index) {
                        best_dist = d;
                        best_index = node.point_index;
                    }

                    let axis = node.axis as usize;
                    let diff = q[axis] - p[axis];
                    let (near, far) = if diff < 0.0 {
                        (node.left, node.right)
                    } else {
                        (node.right, node.left)
                    };

                    if let Some(far) = far {
                        stack.push(Frame::Continue {
                            node: far,
                            axis_dist_sq: diff * diff,
                        });
                    }
                    if let Some(near) = near {
                        stack.push(Frame::Visit(near));
                    }
                }
            }
        }

        Ok((best_index, best_dist))
    }

    /// The `k` nearest neighbors, sorted by ascending squared distance.
    pub fn nearest_k(&self, q: [f32; 3], k: usize) -> Result<Vec<(usize, f32)>, RegistrationError> {
        Self::validate_query(q)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // Max-heap on distance, capped at size k, so the heap's peek is
        // always the current k-th best distance — the same role `best_dist`
        // plays in `nearest`.
        let mut heap: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(k + 1);
        let mut stack = vec![Frame::Visit(self.root)];

        let bound = |heap: &BinaryHeap<(OrderedFloat<f32>, usize)>| -> f32 {
            if heap.len() < k {
                f32::INFINITY
            } else {
                heap.peek()
                    .map(|(d, _)| d.into_inner())
                    .unwrap_or(f32::INFINITY)
            }
        };

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Continue { node, axis_dist_sq } => {
                    if axis_dist_sq < bound(&heap) {
                        stack.push(Frame::Visit(node));
                    }
                }
                Frame::Visit(node_idx) => {
                    let node = &self.nodes[node_idx as usize];
                    let p = self.point(node.point_index);
                    let d = squared_distance(q, p);

                    heap.push((OrderedFloat(d), node.point_index));
                    if heap.len() > k {
                        heap.pop();
                    }

                    let axis = node.axis as usize;
                    let diff = q[axis] - p[axis];
                    let (near, far) = if diff < 0.0 {
                        (node.left, node.right)
                    } else {
                        (node.right, node.left)
                    };

                    if let Some(far) = far {
                        stack.push(Frame::Continue {
                            node: far,
                            axis_dist_sq: diff * diff,
                        });
                    }
                    if let Some(near) = near {
                        stack.push(Frame::Visit(near));
                    }
                }
            }
        }

        let mut result: Vec<(usize, f32)> = heap
            .into_iter()
            .map(|(d, idx)| (idx, d.into_inner()))
            .collect();
        result.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        Ok(result)
    }

    /// All indices within squared distance `radius * radius` of `q`, in
    /// arbitrary order.
    pub fn within_radius(
        &self,
        q: [f32; 3],
        radius: f32,
    ) -> Result<Vec<usize>, RegistrationError> {
        Self::validate_query(q)?;
        let radius_sq = radius * radius;
        let mut result = Vec::new();
        let mut stack = vec![self.root];

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx as usize];
            let p = self.point(node.point_index);
            if squared_distance(q, p) <= radius_sq {
                result.push(node.point_index);
            }

            let axis = node.axis as usize;
            let diff = q[axis] - p[axis];
            let (near, far) = if diff < 0.0 {
                (node.left, node.right)
            } else {
                (node.right, node.left)
            };
            if let Some(near) = near {
                stack.push(near);
            }
            if let Some(far) = far {
                if diff * diff <= radius_sq {
                    stack.push(far);
                }
            }
        }

        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn squared_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}
