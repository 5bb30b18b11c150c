//! Pre-sorted draw command buckets
//!
//! The caller fills the buckets during scene traversal and sorts them once;
//! passes only read the bucket they render.

use crate::backend::{BufferHandle, NameHash};

/// One indexed or non-indexed draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCmd {
    /// Lower keys draw first.
    pub sort_key: u64,
    pub material: NameHash,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    /// Index count for indexed draws, vertex count otherwise.
    pub element_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

/// Render layer a draw command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrawCommandLayer {
    DepthPrepass,
    Opaque,
    Transparent,
    /// Sub-layer is the shadow slice index.
    Shadow,
    Editor,
}

impl DrawCommandLayer {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Draw commands grouped by `(layer, sub_layer)`
#[derive(Debug, Clone, Default)]
pub struct DrawCommandBuckets {
    layers: [Vec<Vec<DrawCmd>>; DrawCommandLayer::COUNT],
}

impl DrawCommandBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: DrawCommandLayer, sub_layer: usize, cmd: DrawCmd) {
        let buckets = &mut self.layers[layer.index()];
        if buckets.len() <= sub_layer {
            buckets.resize_with(sub_layer + 1, Vec::new);
        }
        buckets[sub_layer].push(cmd);
    }

    /// Sort every bucket by key. Stable, so equal keys keep submission order.
    pub fn sort(&mut self) {
        for bucket in self.layers.iter_mut().flatten() {
            bucket.sort_by_key(|cmd| cmd.sort_key);
        }
    }

    /// Commands of one bucket; empty if nothing was pushed there.
    pub fn bucket(&self, layer: DrawCommandLayer, sub_layer: usize) -> &[DrawCmd] {
        self.layers[layer.index()]
            .get(sub_layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        for bucket in self.layers.iter_mut().flatten() {
            bucket.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.layers.iter().flatten().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
