//! Frame compilation: dependency resolution, culling, scheduling, queue
//! assignment and resource-state planning.
//!
//! # Hazards
//!
//! Accesses to each resource are visited in registration order. A read
//! depends on the last write before it (RAW); a write depends on every
//! access since the last write (WAR/WAW). Edges therefore always point from
//! an earlier-registered pass to a later one.
//!
//! # Culling
//!
//! A pass survives if it is uncullable, writes something that outlives the
//! frame (swapchain, persistent or exported resources), or produces data a
//! surviving pass reads. WAR/WAW edges are built after culling so a culled
//! reader never orders two live writers.
//!
//! # State planning
//!
//! The planner walks the compiled order and tracks, per resource, its state
//! and which queues see its current contents. An access from a queue that is
//! out of sync gets one cross-queue transition carrying both the state
//! change and the queue handoff.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use crate::backend::{DeviceCapabilities, QueueType, ResourceState, ResourceTransition};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frame_graph::allocator::AllocationRequest;
use crate::frame_graph::handle::ResourceHandle;
use crate::frame_graph::pass::{PassNode, ResourceAccess};
use crate::frame_graph::resource::{
    AllocationFlags, FrameExtent, PhysicalResource, ResourceOrigin, VirtualDesc, VirtualResource,
};
use crate::scene::SwapchainImage;
use crate::{AsyncComputePolicy, FrameGraphConfig};

/// Execution steps during which a resource is in use, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

impl ResourceLifetime {
    pub fn overlaps(&self, other: &ResourceLifetime) -> bool {
        self.first_use <= other.last_use && other.first_use <= self.last_use
    }
}

/// A transition issued before a pass (or at the end of the frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTransition {
    pub resource: ResourceHandle,
    pub transition: ResourceTransition,
}

/// One scheduled pass
#[derive(Debug, Clone)]
pub struct CompiledPass {
    /// Registration index.
    pub pass_index: usize,
    pub name: String,
    pub queue: QueueType,
    /// Registration indices of the passes this one directly depends on.
    pub dependencies: Vec<usize>,
    /// Resources read, copy sources included.
    pub reads: Vec<ResourceHandle>,
    /// Resources written or allocated.
    pub writes: Vec<ResourceHandle>,
    /// Issued before the copies.
    pub copy_transitions: Vec<PlannedTransition>,
    /// `(source, destination)` image copies.
    pub copies: Vec<(ResourceHandle, ResourceHandle)>,
    /// Issued after the copies, right before the pass executes.
    pub transitions: Vec<PlannedTransition>,
}

/// Compile-time view of a virtual resource
#[derive(Debug, Clone)]
pub struct ResourceBinding {
    pub name: String,
    pub desc: VirtualDesc,
    pub origin: ResourceOrigin,
    pub physical: Option<PhysicalResource>,
    pub lifetime: Option<ResourceLifetime>,
    /// Queues touching the resource this frame.
    pub queues: BTreeSet<QueueType>,
    /// State and queue after the last access of the frame.
    pub final_state: Option<(ResourceState, QueueType)>,
    /// Persistent name it is exported under at RETIRE.
    pub export: Option<crate::backend::NameHash>,
}

/// Result of compiling one frame
#[derive(Debug, Clone)]
pub struct CompiledFrame {
    pub(crate) epoch: u32,
    pub passes: Vec<CompiledPass>,
    pub culled_passes: Vec<String>,
    pub resources: Vec<ResourceBinding>,
    /// Issued after the last pass: the swapchain back to Present, upload
    /// targets back to CopyDest.
    pub epilogue: Vec<PlannedTransition>,
    pub cross_queue_transitions: usize,
    pub transient_allocations_created: usize,
    pub aliased_resources: usize,
}

impl CompiledFrame {
    pub fn pass(&self, name: &str) -> Option<&CompiledPass> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    /// Execution position of a pass.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.passes.iter().position(|pass| pass.name == name)
    }

    pub fn is_culled(&self, name: &str) -> bool {
        self.culled_passes.iter().any(|culled| culled == name)
    }

    pub fn resource(&self, handle: ResourceHandle) -> Option<&ResourceBinding> {
        if !handle.is_valid() || handle.epoch() != self.epoch {
            return None;
        }
        self.resources.get(handle.index())
    }

    pub fn physical(&self, handle: ResourceHandle) -> Option<PhysicalResource> {
        self.resource(handle)?.physical
    }

    pub fn lifetime(&self, handle: ResourceHandle) -> Option<ResourceLifetime> {
        self.resource(handle)?.lifetime
    }

    /// Every transition of the frame in issue order, with the pass it precedes.
    pub fn transitions(&self) -> impl Iterator<Item = (Option<&str>, &PlannedTransition)> + '_ {
        self.passes
            .iter()
            .flat_map(|pass| {
                pass.copy_transitions
                    .iter()
                    .chain(pass.transitions.iter())
                    .map(move |t| (Some(pass.name.as_str()), t))
            })
            .chain(self.epilogue.iter().map(|t| (None, t)))
    }

    /// Transitions of one resource in issue order.
    pub fn transitions_of(&self, handle: ResourceHandle) -> Vec<ResourceTransition> {
        self.transitions()
            .filter(|(_, planned)| planned.resource == handle)
            .map(|(_, planned)| planned.transition)
            .collect()
    }
}

/// Pass order and queue assignment.
#[derive(Debug, Clone)]
pub(crate) struct Schedule {
    /// Registration indices in execution order.
    pub order: Vec<usize>,
    pub live: Vec<bool>,
    pub queues: Vec<QueueType>,
    pub dependencies: Vec<BTreeSet<usize>>,
}

/// Result of state planning.
#[derive(Debug, Default)]
pub(crate) struct TransitionPlan {
    /// Per execution step: `(copy transitions, pass transitions)`.
    pub steps: Vec<(Vec<PlannedTransition>, Vec<PlannedTransition>)>,
    pub epilogue: Vec<PlannedTransition>,
    pub final_states: Vec<Option<(ResourceState, QueueType)>>,
    pub cross_queue_transitions: usize,
}

#[derive(Debug, Clone, Copy)]
struct HazardAccess {
    pass: usize,
    read: bool,
    write: bool,
}

/// Apply allocation flags and copy relations to every descriptor.
///
/// Copy destinations take the extent of their source. Format, sample and
/// mip count follow the source too unless the caller changed them after
/// `copy_image`. Copies that cannot preserve contents are dropped and the
/// destination starts undefined.
pub(crate) fn resolve_descriptors(
    passes: &mut [PassNode],
    resources: &mut [VirtualResource],
    extent: &FrameExtent,
    swapchain: Option<&SwapchainImage>,
) {
    for index in 0..resources.len() {
        if resources[index].origin == ResourceOrigin::Imported {
            if let Some(swapchain) = swapchain {
                let resource = &mut resources[index];
                resource.desc = VirtualDesc::Image(swapchain.desc.clone());
                if let Some(external) = &mut resource.external {
                    external.physical = Some(PhysicalResource::Image(swapchain.image));
                }
            }
            continue;
        }

        resources[index].resolve(extent);

        let Some(copy) = resources[index].copy_of.clone() else {
            continue;
        };
        let Some(VirtualDesc::Image(source)) =
            resources.get(copy.source.index()).map(|r| r.desc.clone())
        else {
            continue;
        };

        let resource = &mut resources[index];
        let flags = resource.flags;
        let mut contents = !flags.contains(AllocationFlags::NO_CONTENT_COPY);
        if let VirtualDesc::Image(desc) = &mut resource.desc {
            desc.dimension = source.dimension;
            desc.width = source.width;
            desc.height = source.height;
            desc.depth_or_array_size = source.depth_or_array_size;
            if desc.format == copy.template.format {
                desc.format = source.format;
            }
            if desc.sample_count == copy.template.sample_count {
                desc.sample_count = source.sample_count;
            }
            if desc.mip_count == copy.template.mip_count {
                desc.mip_count = source.mip_count;
            }
            contents &= desc.format.bytes_per_pixel() == source.format.bytes_per_pixel()
                && desc.sample_count == source.sample_count
                && desc.mip_count == source.mip_count;
        }

        if !contents {
            log::debug!(
                "'{}' starts undefined: not copy-compatible with its source",
                resource.name
            );
            let destination = ResourceHandle::new(index, copy.source.epoch(), resource.desc.kind());
            for pass in passes.iter_mut() {
                pass.copies.retain(|(_, dst)| *dst != destination);
            }
        }
    }
}

pub(crate) struct Compiler<'a> {
    passes: &'a [PassNode],
    resources: &'a [VirtualResource],
    config: &'a FrameGraphConfig,
    capabilities: &'a DeviceCapabilities,
}

impl<'a> Compiler<'a> {
    pub fn new(
        passes: &'a [PassNode],
        resources: &'a [VirtualResource],
        config: &'a FrameGraphConfig,
        capabilities: &'a DeviceCapabilities,
    ) -> Self {
        Self {
            passes,
            resources,
            config,
            capabilities,
        }
    }

    /// State an access needs, with allocation states taken from the final
    /// descriptor.
    pub fn access_state(&self, access: &ResourceAccess) -> ResourceState {
        match self.resources.get(access.handle.index()) {
            Some(resource) if access.allocate => resource.desc.allocation_state(),
            _ => access.state,
        }
    }

    /// Per-resource accesses in registration order.
    fn hazard_accesses(&self) -> Vec<Vec<HazardAccess>> {
        let mut per_resource = vec![Vec::new(); self.resources.len()];
        for (pass_index, pass) in self.passes.iter().enumerate() {
            for (source, _) in &pass.copies {
                if let Some(list) = per_resource.get_mut(source.index()) {
                    list.push(HazardAccess {
                        pass: pass_index,
                        read: true,
                        write: false,
                    });
                }
            }
            for access in &pass.accesses {
                if let Some(list) = per_resource.get_mut(access.handle.index()) {
                    list.push(HazardAccess {
                        pass: pass_index,
                        read: access.read,
                        write: access.write,
                    });
                }
            }
        }
        per_resource
    }

    fn outlives_frame(&self, index: usize) -> bool {
        self.resources
            .get(index)
            .is_some_and(|r| !r.is_transient() || r.export.is_some())
    }

    fn find_live(&self, accesses: &[Vec<HazardAccess>]) -> Vec<bool> {
        let pass_count = self.passes.len();
        if !self.config.enable_culling {
            return vec![true; pass_count];
        }

        let mut producers = vec![BTreeSet::new(); pass_count];
        let mut live = vec![false; pass_count];
        let mut worklist = Vec::new();

        for (resource, list) in accesses.iter().enumerate() {
            let mut last_write = None;
            for access in list {
                if access.read {
                    if let Some(writer) = last_write.filter(|&w| w != access.pass) {
                        producers[access.pass].insert(writer);
                    }
                }
                if access.write {
                    last_write = Some(access.pass);
                    if self.outlives_frame(resource) && !live[access.pass] {
                        live[access.pass] = true;
                        worklist.push(access.pass);
                    }
                }
            }
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if pass.uncullable && !live[index] {
                live[index] = true;
                worklist.push(index);
            }
        }

        while let Some(pass) = worklist.pop() {
            for &producer in &producers[pass] {
                if !live[producer] {
                    live[producer] = true;
                    worklist.push(producer);
                }
            }
        }

        live
    }

    fn dependencies(&self, accesses: &[Vec<HazardAccess>], live: &[bool]) -> Vec<BTreeSet<usize>> {
        let mut dependencies = vec![BTreeSet::new(); self.passes.len()];

        for list in accesses {
            let mut last_write: Option<usize> = None;
            let mut since_write: Vec<usize> = Vec::new();

            for access in list.iter().filter(|a| live[a.pass]) {
                let pass = access.pass;
                if access.read {
                    if let Some(writer) = last_write.filter(|&w| w != pass) {
                        dependencies[pass].insert(writer);
                    }
                }
                if access.write {
                    if since_write.is_empty() {
                        if let Some(writer) = last_write.filter(|&w| w != pass) {
                            dependencies[pass].insert(writer);
                        }
                    }
                    for &reader in since_write.iter().filter(|&&r| r != pass) {
                        dependencies[pass].insert(reader);
                    }
                    last_write = Some(pass);
                    since_write.clear();
                } else {
                    since_write.push(pass);
                }
            }
        }

        dependencies
    }

    /// Kahn's algorithm, smallest registration index first among ready passes.
    fn topological_order(
        live: &[bool],
        dependencies: &[BTreeSet<usize>],
    ) -> FrameGraphResult<Vec<usize>> {
        let pass_count = live.len();
        let mut in_degree = vec![0usize; pass_count];
        let mut successors = vec![Vec::new(); pass_count];
        for (pass, deps) in dependencies.iter().enumerate() {
            for &dependency in deps {
                successors[dependency].push(pass);
                in_degree[pass] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..pass_count)
            .filter(|&pass| live[pass] && in_degree[pass] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(pass_count);
        while let Some(Reverse(pass)) = ready.pop() {
            order.push(pass);
            for &successor in &successors[pass] {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    ready.push(Reverse(successor));
                }
            }
        }

        let live_count = live.iter().filter(|&&l| l).count();
        if order.len() != live_count {
            log::error!("Frame graph has a dependency cycle");
            return Err(FrameGraphError::configuration(
                "frame graph",
                "dependency cycle between passes",
            ));
        }
        Ok(order)
    }

    fn runs_on_compute(&self, pass: &PassNode) -> bool {
        pass.accesses
            .iter()
            .all(|access| self.access_state(access).is_supported_on(QueueType::AsyncCompute))
    }

    fn assign_queues(
        &self,
        live: &[bool],
        order: &[usize],
        dependencies: &[BTreeSet<usize>],
    ) -> Vec<QueueType> {
        let policy = self.config.async_compute;
        let mut queues = vec![QueueType::Graphics; self.passes.len()];
        if policy == AsyncComputePolicy::Disabled || !self.capabilities.async_compute {
            return queues;
        }

        for &index in order {
            let pass = &self.passes[index];
            if !pass.async_compute {
                continue;
            }
            if self.runs_on_compute(pass) {
                queues[index] = QueueType::AsyncCompute;
            } else {
                log::debug!(
                    "Pass '{}' uses graphics-only states, keeping it on the graphics queue",
                    pass.name
                );
            }
        }

        if policy == AsyncComputePolicy::Heuristic {
            let ancestors = ancestor_sets(order, dependencies, self.passes.len());
            let independent = |a: usize, b: usize| {
                !ancestors[a].contains(b) && !ancestors[b].contains(a)
            };

            let tentative = queues.clone();
            for &index in order {
                if tentative[index] != QueueType::AsyncCompute {
                    continue;
                }
                let overlaps = order.iter().any(|&other| {
                    live[other]
                        && tentative[other] == QueueType::Graphics
                        && independent(index, other)
                });
                if !overlaps {
                    log::debug!(
                        "Pass '{}' has no graphics work to overlap, moving it to the graphics queue",
                        self.passes[index].name
                    );
                    queues[index] = QueueType::Graphics;
                }
            }
        }

        queues
    }

    pub fn schedule(&self) -> FrameGraphResult<Schedule> {
        let accesses = self.hazard_accesses();
        let live = self.find_live(&accesses);
        let dependencies = self.dependencies(&accesses, &live);
        let order = Self::topological_order(&live, &dependencies)?;
        let queues = self.assign_queues(&live, &order, &dependencies);

        Ok(Schedule {
            order,
            live,
            queues,
            dependencies,
        })
    }

    /// Resources touched by live passes, with the queues touching them.
    pub fn usage(&self, schedule: &Schedule) -> Vec<Option<(ResourceLifetime, BTreeSet<QueueType>)>> {
        let mut usage: Vec<Option<(ResourceLifetime, BTreeSet<QueueType>)>> =
            vec![None; self.resources.len()];

        for (step, &index) in schedule.order.iter().enumerate() {
            let pass = &self.passes[index];
            let handles = pass
                .copies
                .iter()
                .flat_map(|(source, destination)| [*source, *destination])
                .chain(pass.accesses.iter().map(|a| a.handle));

            for handle in handles {
                let Some(slot) = usage.get_mut(handle.index()) else {
                    continue;
                };
                let (lifetime, queues) = slot.get_or_insert_with(|| {
                    (
                        ResourceLifetime {
                            first_use: step,
                            last_use: step,
                        },
                        BTreeSet::new(),
                    )
                });
                lifetime.last_use = step;
                queues.insert(schedule.queues[index]);
            }
        }

        usage
    }

    pub fn validate(
        &self,
        usage: &[Option<(ResourceLifetime, BTreeSet<QueueType>)>],
    ) -> FrameGraphResult<()> {
        for (resource, used) in self.resources.iter().zip(usage) {
            if used.is_none() {
                continue;
            }
            if let Err(error) = resource.desc.validate(&resource.name, self.capabilities) {
                log::error!("{}", error);
                return Err(error);
            }
            let unbound = resource
                .external
                .is_some_and(|external| external.physical.is_none());
            if unbound {
                log::error!("'{}' has no physical resource this frame", resource.name);
                return Err(FrameGraphError::configuration(
                    &resource.name,
                    "no swapchain image was supplied for this frame",
                ));
            }
        }
        Ok(())
    }

    /// Transient resources that take memory from the pool.
    ///
    /// Exported resources are excluded; they are created outright and
    /// handed to the persistent table at RETIRE.
    pub fn allocation_requests(
        &self,
        usage: &[Option<(ResourceLifetime, BTreeSet<QueueType>)>],
    ) -> Vec<AllocationRequest> {
        self.resources
            .iter()
            .zip(usage)
            .enumerate()
            .filter(|(_, (resource, _))| resource.is_transient() && resource.export.is_none())
            .filter_map(|(index, (resource, used))| {
                let (lifetime, queues) = used.as_ref()?;
                let graphics_only = queues.iter().all(|&q| q == QueueType::Graphics);
                Some(AllocationRequest {
                    resource: index,
                    desc: resource.desc.clone(),
                    first_use: lifetime.first_use,
                    last_use: lifetime.last_use,
                    aliasable: self.config.enable_aliasing && graphics_only,
                })
            })
            .collect()
    }

    /// `parked` lists resources that must end the frame in a given state on
    /// the graphics queue (swapchain in Present, upload targets in CopyDest).
    pub fn plan_transitions(
        &self,
        schedule: &Schedule,
        parked: &[(ResourceHandle, ResourceState)],
    ) -> TransitionPlan {
        let mut tracker = StateTracker::new(self.resources);
        let mut plan = TransitionPlan::default();

        for &index in &schedule.order {
            let pass = &self.passes[index];
            let queue = schedule.queues[index];
            let mut copy_transitions = Vec::new();
            let mut transitions = Vec::new();

            for &(source, destination) in &pass.copies {
                tracker.access(
                    &mut copy_transitions,
                    source,
                    ResourceState::CopySource,
                    true,
                    false,
                    queue,
                );
                tracker.access(
                    &mut copy_transitions,
                    destination,
                    ResourceState::CopyDest,
                    false,
                    true,
                    queue,
                );
            }

            for access in &pass.accesses {
                tracker.access(
                    &mut transitions,
                    access.handle,
                    self.access_state(access),
                    access.read,
                    access.write,
                    queue,
                );
            }

            plan.steps.push((copy_transitions, transitions));
        }

        for &(handle, state) in parked {
            if tracker.touched(handle.index()) {
                tracker.access(
                    &mut plan.epilogue,
                    handle,
                    state,
                    true,
                    false,
                    QueueType::Graphics,
                );
            }
        }

        plan.cross_queue_transitions = plan
            .steps
            .iter()
            .flat_map(|(copies, pass)| copies.iter().chain(pass.iter()))
            .chain(plan.epilogue.iter())
            .filter(|planned| planned.transition.is_cross_queue())
            .count();
        plan.final_states = tracker.final_states();
        plan
    }
}

/// Transitive predecessors of every pass, as bit sets.
fn ancestor_sets(
    order: &[usize],
    dependencies: &[BTreeSet<usize>],
    pass_count: usize,
) -> Vec<PassSet> {
    let mut ancestors = vec![PassSet::new(pass_count); pass_count];
    for &pass in order {
        let mut set = PassSet::new(pass_count);
        for &dependency in &dependencies[pass] {
            set.union_with(&ancestors[dependency]);
            set.insert(dependency);
        }
        ancestors[pass] = set;
    }
    ancestors
}

#[derive(Debug, Clone)]
struct PassSet(Vec<u64>);

impl PassSet {
    fn new(len: usize) -> Self {
        Self(vec![0; len.div_ceil(64)])
    }

    fn insert(&mut self, index: usize) {
        self.0[index / 64] |= 1 << (index % 64);
    }

    fn contains(&self, index: usize) -> bool {
        self.0[index / 64] & (1 << (index % 64)) != 0
    }

    fn union_with(&mut self, other: &PassSet) {
        for (word, other) in self.0.iter_mut().zip(&other.0) {
            *word |= other;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedState {
    state: ResourceState,
    queue: QueueType,
    /// Queues that see the current contents.
    visible: [bool; QueueType::COUNT],
    /// Queues that accessed the resource since its last write.
    accessed_since_write: [bool; QueueType::COUNT],
    last_access_wrote: bool,
    touched: bool,
}

struct StateTracker {
    states: Vec<TrackedState>,
}

impl StateTracker {
    fn new(resources: &[VirtualResource]) -> Self {
        let states = resources
            .iter()
            .map(|resource| match resource.external {
                Some(external) => {
                    let mut own = [false; QueueType::COUNT];
                    own[external.queue.index()] = true;
                    TrackedState {
                        state: external.state,
                        queue: external.queue,
                        visible: own,
                        accessed_since_write: own,
                        last_access_wrote: false,
                        touched: false,
                    }
                }
                None => TrackedState {
                    state: ResourceState::Undefined,
                    queue: QueueType::Graphics,
                    visible: [true; QueueType::COUNT],
                    accessed_since_write: [false; QueueType::COUNT],
                    last_access_wrote: false,
                    touched: false,
                },
            })
            .collect();
        Self { states }
    }

    fn touched(&self, index: usize) -> bool {
        self.states.get(index).is_some_and(|s| s.touched)
    }

    fn access(
        &mut self,
        out: &mut Vec<PlannedTransition>,
        handle: ResourceHandle,
        needed: ResourceState,
        read: bool,
        write: bool,
        queue: QueueType,
    ) {
        let Some(tracked) = self.states.get_mut(handle.index()) else {
            return;
        };
        let other = match queue {
            QueueType::Graphics => QueueType::AsyncCompute,
            QueueType::AsyncCompute => QueueType::Graphics,
        };
        let changes_state = tracked.state != needed;

        let cross_queue = (read && !tracked.visible[queue.index()])
            || ((write || changes_state) && tracked.accessed_since_write[other.index()]);

        let transition = if cross_queue {
            Some(ResourceTransition::cross_queue(
                tracked.state,
                needed,
                other,
                queue,
            ))
        } else if changes_state
            || (needed == ResourceState::UnorderedAccess
                && tracked.touched
                && (write || tracked.last_access_wrote))
        {
            Some(ResourceTransition::new(tracked.state, needed, queue))
        } else {
            None
        };

        if let Some(transition) = transition {
            log::trace!("Planned {:?} for {:?}", transition, handle);
            out.push(PlannedTransition {
                resource: handle,
                transition,
            });
        }

        if changes_state || write {
            tracked.visible = [false; QueueType::COUNT];
        }
        tracked.visible[queue.index()] = true;
        if write {
            tracked.accessed_since_write = [false; QueueType::COUNT];
        }
        tracked.accessed_since_write[queue.index()] = true;
        tracked.state = needed;
        tracked.queue = queue;
        tracked.last_access_wrote = write;
        tracked.touched = true;
    }

    fn final_states(&self) -> Vec<Option<(ResourceState, QueueType)>> {
        self.states
            .iter()
            .map(|s| s.touched.then_some((s.state, s.queue)))
            .collect()
    }
}
