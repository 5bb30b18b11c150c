//! Frame graph: per-frame GPU work scheduling.
//!
//! Passes declare the resources they read and write through a
//! [`FrameGraphBuilder`] and record GPU commands later through an execute
//! callback. The graph derives execution order, queue placement, state
//! transitions and memory aliasing from those declarations.
//!
//! # Frame cycle
//!
//! ```text
//! CAPTURE  add_render_pass() runs setup callbacks, one at a time
//!    │
//! COMPILE  compile(): cull, order, assign queues, plan transitions,
//!    │     bind transient memory from this slot's pool
//! EXECUTE  execute(): record transitions and callbacks, submit
//!    │
//! RETIRE   persist final states, apply exports, rotate ping-pong pairs
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut graph = FrameGraph::new(&mut device, FrameGraphConfig::default())?;
//!
//! let gbuffer = graph.add_render_pass(
//!     "GBuffer",
//!     |builder, data: &mut GBufferData| {
//!         data.albedo = builder.allocate_image(
//!             ImageDesc::new_2d(0, 0, ImageFormat::Rgba8Unorm, BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE),
//!             AllocationFlags::USE_PIPELINE_DIMENSIONS,
//!         );
//!     },
//!     |data, resources, cmd, pipelines| { /* draw */ },
//! );
//!
//! graph.add_render_pass(
//!     "Lighting",
//!     |builder, data: &mut LightingData| {
//!         data.albedo = builder.read_read_only_image(gbuffer.albedo);
//!         data.output = builder.retrieve_swapchain_buffer();
//!     },
//!     |data, resources, cmd, pipelines| { /* shade */ },
//! );
//!
//! let stats = graph.execute(&mut device, &view)?;
//! ```

pub mod allocator;
mod builder;
mod compiler;
mod handle;
mod pass;
mod persistent;
mod pipeline;
mod resource;
mod resources;

pub use builder::FrameGraphBuilder;
pub use compiler::{CompiledFrame, CompiledPass, PlannedTransition, ResourceBinding, ResourceLifetime};
pub use handle::ResourceHandle;
pub use pass::ResourceAccess;
pub use persistent::{PersistentResourceTable, SlotRole};
pub use pipeline::FramePipeline;
pub use resource::{AllocationFlags, PhysicalResource, ResourceOrigin, VirtualDesc};
pub use resources::FrameGraphResources;

use glam::Mat4;

use crate::backend::{
    BindFlags, BufferDesc, BufferHandle, CommandList, DeviceCapabilities, Fence, ImageDesc,
    ImageHandle, NameHash, PipelineStateCache, QueueType, RenderDevice, ResourceState,
    ResourceTransition, UsageClass,
};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::scene::{FrameView, PerViewData};
use crate::FrameGraphConfig;

use allocator::TransientPool;
use builder::CaptureState;
use compiler::Compiler;
use pass::{PassNode, TypedPass};
use persistent::PersistentResource;
use resource::FrameExtent;

/// Constant buffer with the main camera's [`PerViewData`].
pub const PER_VIEW_BUFFER: NameHash = NameHash::new("FrameGraph/PerViewBuffer");
/// Scratch buffer shared with the material editor.
pub const MATERIAL_EDITOR_BUFFER: NameHash = NameHash::new("FrameGraph/MaterialEditorBuffer");
/// Final colour of the previous frame.
pub const LAST_FRAME_IMAGE: NameHash = NameHash::new("FrameGraph/LastFrameImage");
pub(crate) const SWAPCHAIN_IMAGE: NameHash = NameHash::new("FrameGraph/Swapchain");

/// Where the graph is in its frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Passes are being registered.
    Capture,
    /// The frame is compiled and waiting for `execute`.
    Compiled,
}

/// Summary of one executed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub passes_executed: usize,
    pub passes_culled: usize,
    /// Physical resources created for the frame (pool misses and exports).
    pub transient_allocations: usize,
    /// Transient resources that reused memory of an earlier tenant.
    pub aliased_resources: usize,
    pub cross_queue_transitions: usize,
    pub persistent_rotations: usize,
    /// Physical resources held by the slot's pool after the frame.
    pub transient_pool_size: usize,
}

/// The per-frame GPU work scheduler.
pub struct FrameGraph {
    config: FrameGraphConfig,
    capabilities: DeviceCapabilities,
    phase: FramePhase,
    epoch: u32,
    passes: Vec<PassNode>,
    capture: CaptureState,
    persistent: PersistentResourceTable,
    /// One pool per in-flight slot.
    pools: Vec<TransientPool>,
    pipeline: FramePipeline,
    pipeline_states: PipelineStateCache,
    compiled: Option<CompiledFrame>,
    last_stats: Option<FrameStats>,
    previous_view_projection: Option<Mat4>,
    /// Owned persistent resources replaced or removed, with the frame after
    /// whose completion they may be destroyed.
    deferred_releases: Vec<(u64, PhysicalResource)>,
}

impl FrameGraph {
    /// Create a graph and the resources it owns (per-view and
    /// material-editor buffers).
    pub fn new(device: &mut dyn RenderDevice, config: FrameGraphConfig) -> FrameGraphResult<Self> {
        if config.frames_in_flight == 0 {
            return Err(FrameGraphError::configuration(
                "FrameGraphConfig",
                "frames_in_flight must be at least 1",
            ));
        }

        let capabilities = device.capabilities();
        let mut persistent = PersistentResourceTable::new();

        let per_view = BufferDesc::new(PerViewData::SIZE, BindFlags::CONSTANT_BUFFER)
            .with_label("FrameGraph/PerViewBuffer")
            .with_usage(UsageClass::Dynamic);
        let material_editor = BufferDesc::new(
            config.material_editor_buffer_size,
            BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE,
        )
        .with_label("FrameGraph/MaterialEditorBuffer");

        for (name, desc, state) in [
            (PER_VIEW_BUFFER, per_view, ResourceState::CopyDest),
            (MATERIAL_EDITOR_BUFFER, material_editor, ResourceState::Common),
        ] {
            let desc = VirtualDesc::Buffer(desc);
            let physical = PhysicalResource::create(device, &desc)?;
            persistent.insert_single(
                name,
                PersistentResource {
                    physical,
                    desc,
                    state,
                    queue: QueueType::Graphics,
                    owned: true,
                },
            );
        }

        log::info!(
            "Frame graph created on '{}' ({} frames in flight, async compute {:?})",
            device.name(),
            config.frames_in_flight,
            config.async_compute
        );

        Ok(Self {
            pools: (0..config.frames_in_flight).map(|_| TransientPool::new()).collect(),
            pipeline: FramePipeline::new(config.frames_in_flight, config.stall_warning_timeout),
            config,
            capabilities,
            phase: FramePhase::Capture,
            epoch: 1,
            passes: Vec::new(),
            capture: CaptureState::new(1),
            persistent,
            pipeline_states: PipelineStateCache::new(),
            compiled: None,
            last_stats: None,
            previous_view_projection: None,
            deferred_releases: Vec::new(),
        })
    }

    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn pipeline_states(&self) -> &PipelineStateCache {
        &self.pipeline_states
    }

    /// Modules register their pipeline states here at load time.
    pub fn pipeline_states_mut(&mut self) -> &mut PipelineStateCache {
        &mut self.pipeline_states
    }

    pub fn persistent_resources(&self) -> &PersistentResourceTable {
        &self.persistent
    }

    /// Frame compiled by the last [`compile`](Self::compile), until it executes.
    pub fn compiled(&self) -> Option<&CompiledFrame> {
        self.compiled.as_ref()
    }

    pub fn last_frame_stats(&self) -> Option<FrameStats> {
        self.last_stats
    }

    /// Total frames submitted.
    pub fn frame_count(&self) -> u64 {
        self.pipeline.frame_count()
    }

    /// Register a pass.
    ///
    /// `setup` runs immediately and fills a fresh `D` with the handles the
    /// pass declared. A copy of that data is returned so later passes can
    /// consume the handles; the original is handed to `execute` when the
    /// frame executes.
    pub fn add_render_pass<D, S, E>(&mut self, name: &str, setup: S, execute: E) -> D
    where
        D: Default + Clone + 'static,
        S: FnOnce(&mut FrameGraphBuilder, &mut D),
        E: FnOnce(&D, &FrameGraphResources, &mut dyn CommandList, &PipelineStateCache) + 'static,
    {
        debug_assert_eq!(
            self.phase,
            FramePhase::Capture,
            "pass '{}' registered after compile",
            name
        );

        let pass_index = self.passes.len();
        let mut node = PassNode::new(name);
        let mut data = D::default();
        {
            let mut builder =
                FrameGraphBuilder::new(&mut node, pass_index, &mut self.capture, &mut self.persistent);
            setup(&mut builder, &mut data);
        }

        node.executor = Some(Box::new(TypedPass {
            data: data.clone(),
            execute,
        }));
        self.passes.push(node);
        data
    }

    /// Compile the captured frame against `view`.
    ///
    /// Blocks until this frame's slot is free, because the slot's transient
    /// pool is rebound here.
    pub fn compile(
        &mut self,
        device: &mut dyn RenderDevice,
        view: &FrameView,
    ) -> FrameGraphResult<&CompiledFrame> {
        if self.phase != FramePhase::Capture {
            return Err(FrameGraphError::InvalidPhase {
                expected: FramePhase::Capture,
                actual: self.phase,
            });
        }

        self.pipeline.begin_frame(device)?;
        self.release_completed(device);

        let extent = FrameExtent {
            dimensions: view.pipeline_dimensions(),
            sample_count: view.sample_count.max(1),
        };
        compiler::resolve_descriptors(
            &mut self.passes,
            &mut self.capture.resources,
            &extent,
            view.swapchain.as_ref(),
        );

        let compiler = Compiler::new(
            &self.passes,
            &self.capture.resources,
            &self.config,
            &self.capabilities,
        );
        let schedule = compiler.schedule()?;
        let usage = compiler.usage(&schedule);
        compiler.validate(&usage)?;

        let parked: Vec<(ResourceHandle, ResourceState)> = [
            (SWAPCHAIN_IMAGE, ResourceState::Present),
            (PER_VIEW_BUFFER, ResourceState::CopyDest),
        ]
        .iter()
        .filter_map(|(name, state)| Some((*self.capture.imports.get(name)?, *state)))
        .collect();
        let mut plan = compiler.plan_transitions(&schedule, &parked);

        let slot = self.pipeline.current_slot();
        let mut requests = compiler.allocation_requests(&usage);
        let summary = self.pools[slot].allocate(device, &mut requests, &self.capabilities)?;
        let trimmed = self.pools[slot].trim(device, self.config.transient_pool_max_idle_frames);
        if trimmed > 0 {
            log::info!("Transient pool {} released {} idle resources", slot, trimmed);
        }

        let mut physical: Vec<Option<PhysicalResource>> = self
            .capture
            .resources
            .iter()
            .map(|r| r.external.and_then(|external| external.physical))
            .collect();
        for (index, assigned) in &summary.assignments {
            physical[*index] = Some(*assigned);
        }

        let mut exported = 0;
        for (index, resource) in self.capture.resources.iter().enumerate() {
            if resource.export.is_some() && resource.is_transient() && usage[index].is_some() {
                physical[index] = Some(PhysicalResource::create(device, &resource.desc)?);
                exported += 1;
            }
        }

        let resources = self
            .capture
            .resources
            .iter()
            .enumerate()
            .map(|(index, resource)| {
                let (lifetime, queues) = usage[index]
                    .clone()
                    .map_or((None, Default::default()), |(l, q)| (Some(l), q));
                ResourceBinding {
                    name: resource.name.clone(),
                    desc: resource.desc.clone(),
                    origin: resource.origin,
                    physical: physical[index],
                    lifetime,
                    queues,
                    final_state: plan.final_states[index],
                    export: resource.export,
                }
            })
            .collect();

        let passes: Vec<CompiledPass> = schedule
            .order
            .iter()
            .zip(plan.steps.drain(..))
            .map(|(&index, (copy_transitions, transitions))| {
                let node = &self.passes[index];
                CompiledPass {
                    pass_index: index,
                    name: node.name.clone(),
                    queue: schedule.queues[index],
                    dependencies: schedule.dependencies[index].iter().copied().collect(),
                    reads: node.reads().collect(),
                    writes: node.writes().collect(),
                    copy_transitions,
                    copies: node.copies.clone(),
                    transitions,
                }
            })
            .collect();

        let culled_passes: Vec<String> = self
            .passes
            .iter()
            .zip(&schedule.live)
            .filter(|(_, live)| !**live)
            .map(|(pass, _)| pass.name.clone())
            .collect();

        log::debug!(
            "Compiled frame {}: {} passes, {} culled, {} transient resources ({} new, {} aliased), {} cross-queue transitions",
            self.pipeline.current_frame(),
            passes.len(),
            culled_passes.len(),
            summary.assignments.len(),
            summary.created,
            summary.aliased,
            plan.cross_queue_transitions
        );
        if !culled_passes.is_empty() {
            log::debug!("Culled passes: {:?}", culled_passes);
        }

        self.phase = FramePhase::Compiled;
        Ok(&*self.compiled.insert(CompiledFrame {
            epoch: self.epoch,
            passes,
            culled_passes,
            resources,
            epilogue: std::mem::take(&mut plan.epilogue),
            cross_queue_transitions: plan.cross_queue_transitions,
            transient_allocations_created: summary.created + exported,
            aliased_resources: summary.aliased,
        }))
    }

    /// Execute the compiled frame (compiling first if needed), submit it and
    /// retire it.
    pub fn execute(
        &mut self,
        device: &mut dyn RenderDevice,
        view: &FrameView,
    ) -> FrameGraphResult<FrameStats> {
        if self.phase == FramePhase::Capture {
            self.compile(device, view)?;
        }
        let Some(compiled) = self.compiled.take() else {
            return Err(FrameGraphError::InvalidPhase {
                expected: FramePhase::Compiled,
                actual: self.phase,
            });
        };

        let frame_index = self.pipeline.current_frame();
        let per_view = view.camera.per_view_data(
            view.screen_size_f32(),
            view.delta_time,
            frame_index,
            self.previous_view_projection,
        );
        self.upload_per_view_data(device, &per_view);

        for pass in &compiled.passes {
            let cmd = device.command_list(pass.queue);
            log::trace!("Executing pass '{}' on {:?}", pass.name, pass.queue);
            cmd.push_event_marker(&pass.name);

            for planned in &pass.copy_transitions {
                record_transition(cmd, &compiled, planned);
            }
            for &(source, destination) in &pass.copies {
                let source = compiled.physical(source).and_then(PhysicalResource::as_image);
                let destination = compiled
                    .physical(destination)
                    .and_then(PhysicalResource::as_image);
                if let (Some(source), Some(destination)) = (source, destination) {
                    cmd.copy_image(source, destination);
                }
            }
            for planned in &pass.transitions {
                record_transition(cmd, &compiled, planned);
            }

            if let Some(executor) = self.passes[pass.pass_index].executor.take() {
                let resources = FrameGraphResources::new(&compiled, view, &per_view, frame_index);
                executor.execute(&resources, cmd, &self.pipeline_states);
            }
            cmd.pop_event_marker();
        }

        if !compiled.epilogue.is_empty() {
            let cmd = device.command_list(QueueType::Graphics);
            for planned in &compiled.epilogue {
                record_transition(cmd, &compiled, planned);
            }
        }

        let fence = Fence::new();
        if let Err(error) = device.submit(&fence) {
            log::error!("Submitting frame {} failed: {}", frame_index, error);
            return Err(FrameGraphError::from_backend(error));
        }
        self.pipeline.end_frame(fence);
        self.previous_view_projection = Some(per_view.view_projection);

        let stats = self.retire(&compiled, frame_index);
        self.last_stats = Some(stats);
        Ok(stats)
    }

    fn upload_per_view_data(&mut self, device: &mut dyn RenderDevice, per_view: &PerViewData) {
        let Some(lookup) = self.persistent.lookup(PER_VIEW_BUFFER) else {
            return;
        };
        let Some(buffer) = lookup.resource.physical.as_buffer() else {
            return;
        };
        let (state, queue) = (lookup.resource.state, lookup.resource.queue);

        let cmd = device.command_list(QueueType::Graphics);
        if state != ResourceState::CopyDest || queue != QueueType::Graphics {
            cmd.transition_buffer(
                buffer,
                &ResourceTransition::cross_queue(
                    state,
                    ResourceState::CopyDest,
                    queue,
                    QueueType::Graphics,
                ),
            );
            self.persistent
                .update_state(PER_VIEW_BUFFER, ResourceState::CopyDest, QueueType::Graphics);
        }
        cmd.update_buffer(buffer, 0, bytemuck::bytes_of(per_view));
    }

    fn retire(&mut self, compiled: &CompiledFrame, frame_index: u64) -> FrameStats {
        for binding in &compiled.resources {
            if let (ResourceOrigin::Persistent(name), Some((state, queue))) =
                (binding.origin, binding.final_state)
            {
                self.persistent.update_state(name, state, queue);
            }
        }

        for binding in &compiled.resources {
            let (Some(name), Some(physical)) = (binding.export, binding.physical) else {
                continue;
            };
            if binding.origin != ResourceOrigin::Transient {
                continue;
            }
            let (state, queue) = binding
                .final_state
                .unwrap_or((ResourceState::Undefined, QueueType::Graphics));
            let released = self.persistent.insert_single(
                name,
                PersistentResource {
                    physical,
                    desc: binding.desc.clone(),
                    state,
                    queue,
                    owned: true,
                },
            );
            self.defer_release(released, frame_index);
        }

        let rotations = self.persistent.rotate();

        self.passes.clear();
        self.epoch = self.epoch.wrapping_add(1).max(1);
        self.capture = CaptureState::new(self.epoch);
        self.phase = FramePhase::Capture;

        let slot = (self.pipeline.current_slot() + self.pipeline.frames_in_flight() - 1)
            % self.pipeline.frames_in_flight();
        let stats = FrameStats {
            frame_index,
            passes_executed: compiled.passes.len(),
            passes_culled: compiled.culled_passes.len(),
            transient_allocations: compiled.transient_allocations_created,
            aliased_resources: compiled.aliased_resources,
            cross_queue_transitions: compiled.cross_queue_transitions,
            persistent_rotations: rotations,
            transient_pool_size: self.pools[slot].len(),
        };
        log::trace!("Retired frame {}: {:?}", frame_index, stats);
        stats
    }

    /// Block until the oldest in-flight frame has finished on the GPU.
    ///
    /// Repeated calls return immediately once that frame is done.
    pub fn wait_pending_frame_completion(&self, device: &dyn RenderDevice) -> FrameGraphResult<()> {
        self.pipeline.wait_oldest(device)
    }

    /// Block until every in-flight frame has finished and release
    /// everything that was waiting on them.
    pub fn wait_idle(&mut self, device: &mut dyn RenderDevice) -> FrameGraphResult<()> {
        self.pipeline.wait_idle(device)?;
        self.release_completed(device);
        Ok(())
    }

    /// Destroy every pooled transient resource, e.g. after a resize.
    pub fn flush_transient_pools(&mut self, device: &mut dyn RenderDevice) -> FrameGraphResult<()> {
        self.wait_idle(device)?;
        for pool in &mut self.pools {
            pool.release_all(device);
        }
        log::info!("Transient pools flushed");
        Ok(())
    }

    /// Wait for the GPU and destroy every resource the graph owns.
    pub fn shutdown(&mut self, device: &mut dyn RenderDevice) -> FrameGraphResult<()> {
        self.flush_transient_pools(device)?;
        for resource in self.persistent.drain() {
            if resource.owned {
                resource.physical.destroy(device);
            }
        }
        for (_, physical) in self.deferred_releases.drain(..) {
            physical.destroy(device);
        }
        self.compiled = None;
        self.passes.clear();
        log::info!("Frame graph shut down");
        Ok(())
    }

    fn check_between_frames(&self) -> FrameGraphResult<()> {
        if self.phase != FramePhase::Capture {
            return Err(FrameGraphError::InvalidPhase {
                expected: FramePhase::Capture,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Register a module-owned image under `name`.
    pub fn import_persistent_image(
        &mut self,
        name: NameHash,
        image: ImageHandle,
        desc: ImageDesc,
        state: ResourceState,
    ) -> FrameGraphResult<()> {
        self.check_between_frames()?;
        let released = self.persistent.insert_single(
            name,
            external(PhysicalResource::Image(image), VirtualDesc::Image(desc), state),
        );
        self.defer_release(released, self.pipeline.frame_count());
        Ok(())
    }

    /// Register a module-owned buffer under `name`.
    pub fn import_persistent_buffer(
        &mut self,
        name: NameHash,
        buffer: BufferHandle,
        desc: BufferDesc,
        state: ResourceState,
    ) -> FrameGraphResult<()> {
        self.check_between_frames()?;
        let released = self.persistent.insert_single(
            name,
            external(PhysicalResource::Buffer(buffer), VirtualDesc::Buffer(desc), state),
        );
        self.defer_release(released, self.pipeline.frame_count());
        Ok(())
    }

    /// Register a ping-pong pair of buffers. `buffers[0]` is the first read
    /// side; the sides swap after every frame that retrieves `write_name`.
    pub fn import_persistent_buffer_pair(
        &mut self,
        read_name: NameHash,
        write_name: NameHash,
        buffers: [BufferHandle; 2],
        desc: BufferDesc,
        state: ResourceState,
    ) -> FrameGraphResult<()> {
        self.check_between_frames()?;
        let sides = buffers.map(|buffer| {
            external(
                PhysicalResource::Buffer(buffer),
                VirtualDesc::Buffer(desc.clone()),
                state,
            )
        });
        let released = self.persistent.insert_pair(read_name, write_name, sides);
        self.defer_release(released, self.pipeline.frame_count());
        Ok(())
    }

    /// Image counterpart of [`import_persistent_buffer_pair`](Self::import_persistent_buffer_pair).
    pub fn import_persistent_image_pair(
        &mut self,
        read_name: NameHash,
        write_name: NameHash,
        images: [ImageHandle; 2],
        desc: ImageDesc,
        state: ResourceState,
    ) -> FrameGraphResult<()> {
        self.check_between_frames()?;
        let sides = images.map(|image| {
            external(
                PhysicalResource::Image(image),
                VirtualDesc::Image(desc.clone()),
                state,
            )
        });
        let released = self.persistent.insert_pair(read_name, write_name, sides);
        self.defer_release(released, self.pipeline.frame_count());
        Ok(())
    }

    /// Release a persistent name (both names of a pair).
    ///
    /// Graph-owned resources are destroyed once no in-flight frame uses them.
    pub fn remove_persistent(&mut self, name: NameHash) -> FrameGraphResult<bool> {
        self.check_between_frames()?;
        let released = self.persistent.remove(name);
        let removed = !released.is_empty();
        self.defer_release(released, self.pipeline.frame_count());
        Ok(removed)
    }

    fn defer_release(&mut self, released: Vec<PersistentResource>, frame: u64) {
        for resource in released.into_iter().filter(|r| r.owned) {
            log::trace!("Deferring release of {:?} until frame {}", resource.physical, frame);
            self.deferred_releases.push((frame, resource.physical));
        }
    }

    fn release_completed(&mut self, device: &mut dyn RenderDevice) {
        let completed = self.pipeline.last_completed_frame();
        self.deferred_releases.retain(|(frame, physical)| {
            if *frame <= completed {
                physical.destroy(device);
                false
            } else {
                true
            }
        });
    }
}

impl std::fmt::Debug for FrameGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraph")
            .field("phase", &self.phase)
            .field("epoch", &self.epoch)
            .field("passes", &self.passes.len())
            .field("persistent", &self.persistent.len())
            .field("frame_count", &self.pipeline.frame_count())
            .finish_non_exhaustive()
    }
}

fn external(physical: PhysicalResource, desc: VirtualDesc, state: ResourceState) -> PersistentResource {
    PersistentResource {
        physical,
        desc,
        state,
        queue: QueueType::Graphics,
        owned: false,
    }
}

fn record_transition(cmd: &mut dyn CommandList, compiled: &CompiledFrame, planned: &PlannedTransition) {
    match compiled.physical(planned.resource) {
        Some(PhysicalResource::Image(image)) => cmd.transition_image(image, &planned.transition),
        Some(PhysicalResource::Buffer(buffer)) => cmd.transition_buffer(buffer, &planned.transition),
        None => log::warn!("Transition of unbound {:?} skipped", planned.resource),
    }
}
