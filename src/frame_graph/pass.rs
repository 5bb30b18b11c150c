//! Pass nodes and their type-erased execute callbacks

use crate::backend::{CommandList, PipelineStateCache, ResourceState};
use crate::frame_graph::handle::ResourceHandle;
use crate::frame_graph::resources::FrameGraphResources;

/// One declared use of a resource by a pass.
///
/// A pass holds at most one access per resource; repeated declarations are
/// merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub handle: ResourceHandle,
    /// State the pass needs. For allocations it is derived from the final
    /// descriptor at compile time.
    pub state: ResourceState,
    pub read: bool,
    pub write: bool,
    /// Declared through a read-only variant; a later write is a contract
    /// violation.
    pub read_only: bool,
    /// The pass allocated this resource.
    pub allocate: bool,
}

impl ResourceAccess {
    pub(crate) fn read(handle: ResourceHandle, state: ResourceState) -> Self {
        Self {
            handle,
            state,
            read: true,
            write: false,
            read_only: false,
            allocate: false,
        }
    }

    pub(crate) fn write(handle: ResourceHandle, state: ResourceState) -> Self {
        Self {
            handle,
            state,
            read: false,
            write: true,
            read_only: false,
            allocate: false,
        }
    }
}

/// Execute step of a pass, with its captured pass data.
pub(crate) trait PassExecutor {
    fn execute(
        self: Box<Self>,
        resources: &FrameGraphResources,
        cmd: &mut dyn CommandList,
        pipelines: &PipelineStateCache,
    );
}

pub(crate) struct TypedPass<D, E> {
    pub data: D,
    pub execute: E,
}

impl<D, E> PassExecutor for TypedPass<D, E>
where
    E: FnOnce(&D, &FrameGraphResources, &mut dyn CommandList, &PipelineStateCache),
{
    fn execute(
        self: Box<Self>,
        resources: &FrameGraphResources,
        cmd: &mut dyn CommandList,
        pipelines: &PipelineStateCache,
    ) {
        let TypedPass { data, execute } = *self;
        execute(&data, resources, cmd, pipelines);
    }
}

/// A registered pass
pub(crate) struct PassNode {
    pub name: String,
    pub async_compute: bool,
    pub uncullable: bool,
    pub accesses: Vec<ResourceAccess>,
    /// `(source, destination)` image copies recorded before the pass runs.
    pub copies: Vec<(ResourceHandle, ResourceHandle)>,
    pub executor: Option<Box<dyn PassExecutor>>,
}

impl PassNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            async_compute: false,
            uncullable: false,
            accesses: Vec::new(),
            copies: Vec::new(),
            executor: None,
        }
    }

    /// Record an access, merging with an earlier one on the same resource.
    pub fn declare(&mut self, access: ResourceAccess) {
        let Some(existing) = self
            .accesses
            .iter_mut()
            .find(|a| a.handle == access.handle)
        else {
            self.accesses.push(access);
            return;
        };

        debug_assert!(
            !(existing.read_only && access.write),
            "pass '{}' writes a resource it declared read-only",
            self.name
        );
        debug_assert!(
            !(access.read_only && existing.write),
            "pass '{}' declares a written resource read-only",
            self.name
        );

        // A write decides the state the pass needs
        if access.write || !existing.write {
            existing.state = access.state;
        }
        existing.read |= access.read;
        existing.write |= access.write;
        existing.read_only = existing.read_only && access.read_only;
        existing.allocate |= access.allocate;
    }

    /// Handles read by this pass, in declaration order.
    pub fn reads(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.accesses
            .iter()
            .filter(|a| a.read)
            .map(|a| a.handle)
            .chain(self.copies.iter().map(|(source, _)| *source))
    }

    /// Handles written or allocated by this pass, in declaration order.
    pub fn writes(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.accesses.iter().filter(|a| a.write).map(|a| a.handle)
    }
}

impl std::fmt::Debug for PassNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassNode")
            .field("name", &self.name)
            .field("async_compute", &self.async_compute)
            .field("uncullable", &self.uncullable)
            .field("accesses", &self.accesses)
            .field("copies", &self.copies)
            .finish_non_exhaustive()
    }
}
