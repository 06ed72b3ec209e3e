//! Facet spatial index.
//!
//! A binary tree of axis-aligned boxes stored as an arena: nodes refer to
//! their children by index and leaves own a range of a single facet-reference
//! array. One index is built per structure.

use synrad_core::geometry::{Facet, Geometry};
use synrad_math::{Aabb, Interval, Ray};

/// Ranges with this many facets or fewer become leaves.
const LEAF_MIN: usize = 4;
/// Depth at which splitting stops regardless of size.
const MAX_DEPTH: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    Branch { left: usize, right: usize },
    Leaf { start: usize, len: usize },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bbox: Aabb,
    kind: NodeKind,
}

/// Spatial index over the facets of one structure.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    structure: usize,
    nodes: Vec<Node>,
    refs: Vec<usize>,
}

impl SpatialIndex {
    /// Index every facet visible from `structure`.
    pub fn build(geometry: &Geometry, structure: usize) -> Self {
        let refs: Vec<usize> = geometry.structure_facets(structure).map(|f| f.id).collect();
        let mut index = Self {
            structure,
            nodes: Vec::new(),
            refs,
        };
        if !index.refs.is_empty() {
            let n = index.refs.len();
            index.build_node(&geometry.facets, 0, n, 0);
        }
        index
    }

    /// Recursive construction over `refs[start..end]`; returns the node index.
    ///
    /// Splits at the midpoint of the centroid bounds, on whichever axis puts
    /// the most even share of centroids on each side.
    fn build_node(&mut self, facets: &[Facet], start: usize, end: usize, depth: usize) -> usize {
        let bbox = self.refs[start..end]
            .iter()
            .fold(Aabb::EMPTY, |acc, &f| Aabb::surrounding(&acc, &facets[f].bounds));
        let node = self.nodes.len();
        let n = end - start;

        let split = if n <= LEAF_MIN || depth >= MAX_DEPTH {
            None
        } else {
            self.choose_split(facets, start, end)
        };

        let Some((axis, mid)) = split else {
            self.nodes.push(Node {
                bbox,
                kind: NodeKind::Leaf { start, len: n },
            });
            return node;
        };

        // Partition in place: centroids below the midpoint go left
        let mut boundary = start;
        for i in start..end {
            if facets[self.refs[i]].centroid[axis] < mid {
                self.refs.swap(i, boundary);
                boundary += 1;
            }
        }

        // Reserve the slot, children fill in after
        self.nodes.push(Node {
            bbox,
            kind: NodeKind::Leaf { start, len: n },
        });
        let left = self.build_node(facets, start, boundary, depth + 1);
        let right = self.build_node(facets, boundary, end, depth + 1);
        self.nodes[node].kind = NodeKind::Branch { left, right };
        node
    }

    fn choose_split(&self, facets: &[Facet], start: usize, end: usize) -> Option<(usize, f64)> {
        let centroids = Aabb::enclosing(self.refs[start..end].iter().map(|&f| facets[f].centroid));
        let n = end - start;

        let mut best: Option<(usize, f64, usize)> = None;
        for axis in 0..3 {
            let mid = centroids.axis_interval(axis).center();
            let left = self.refs[start..end]
                .iter()
                .filter(|&&f| facets[f].centroid[axis] < mid)
                .count();
            if left == 0 || left == n {
                continue;
            }
            let imbalance = left.abs_diff(n - left);
            if best.map_or(true, |(_, _, b)| imbalance < b) {
                best = Some((axis, mid, imbalance));
            }
        }
        best.map(|(axis, mid, _)| (axis, mid))
    }

    pub fn structure(&self) -> usize {
        self.structure
    }

    pub fn facet_count(&self) -> usize {
        self.refs.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of everything in the index.
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::EMPTY, |n| n.bbox)
    }

    /// Visit every facet whose leaf box the ray crosses before `max_t`.
    ///
    /// `test` returns the distance of a blocking hit, which shrinks the
    /// search range for the remaining nodes.
    pub fn visit<F>(&self, ray: &Ray, mut max_t: f64, mut test: F)
    where
        F: FnMut(usize) -> Option<f64>,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = Vec::with_capacity(2 * MAX_DEPTH);
        stack.push(0);
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.bbox.hit(ray, Interval::new(0.0, max_t)) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, len } => {
                    for &f in &self.refs[start..start + len] {
                        if let Some(t) = test(f) {
                            max_t = max_t.min(t);
                        }
                    }
                }
                NodeKind::Branch { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
    }
}
