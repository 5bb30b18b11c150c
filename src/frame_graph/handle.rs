//! Frame-scoped resource handles

use crate::backend::ResourceKind;

/// Opaque handle to a virtual resource of one frame.
///
/// Handles carry the epoch of the frame that produced them; resolving a
/// handle from an earlier frame is caught in debug builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: u32,
    epoch: u32,
    kind: ResourceKind,
}

impl ResourceHandle {
    /// Reserved handle that never resolves.
    pub const INVALID: Self = Self {
        index: u32::MAX,
        epoch: 0,
        kind: ResourceKind::Image,
    };

    pub(crate) fn new(index: usize, epoch: u32, kind: ResourceKind) -> Self {
        Self {
            index: index as u32,
            epoch,
            kind,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_image(&self) -> bool {
        self.kind == ResourceKind::Image
    }

    pub fn is_buffer(&self) -> bool {
        self.kind == ResourceKind::Buffer
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}
