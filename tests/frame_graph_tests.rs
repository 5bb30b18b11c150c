//! Integration tests for the frame graph.
//!
//! Every test registers passes against a [`FrameGraph`] backed by the dummy
//! device, then checks the compiled schedule, the recorded commands or the
//! simulated buffer contents.
//!
//! # Test Categories
//!
//! - **Ordering**: producers before consumers, deterministic ties, culling
//! - **Queues**: async compute placement and cross-queue transitions
//! - **Memory**: aliasing legality, pool reuse, exports
//! - **Persistent**: ping-pong rotation, well-known resources
//! - **Errors**: configuration errors, missing names, device loss

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use rstest::rstest;

use common::{
    physical_writes, reachability, render_target, uav_buffer, uav_image, TestContext, HEIGHT,
    WIDTH,
};
use frame_graph::backend::{
    BindFlags, BufferDesc, BufferHandle, DeviceCapabilities, DummyDevice, FenceMode, ImageDesc,
    ImageFormat, NameHash, QueueType, RecordedCommand, RenderDevice, ResourceState,
};
use frame_graph::frame_graph::ResourceOrigin;
use frame_graph::scene::PerViewData;
use frame_graph::{
    AllocationFlags, AsyncComputePolicy, DrawCmd, DrawCommandLayer, FrameGraphConfig,
    FrameGraphError, FrameGraphResult, ResourceHandle,
};

#[derive(Debug, Clone, Default)]
struct PassData {
    input: ResourceHandle,
    output: ResourceHandle,
}

fn async_config() -> FrameGraphConfig {
    FrameGraphConfig {
        async_compute: AsyncComputePolicy::Always,
        ..Default::default()
    }
}

/// Allocate a render target in a pass of its own.
fn add_producer(ctx: &mut TestContext, name: &str) -> ResourceHandle {
    ctx.graph
        .add_render_pass(
            name,
            |builder, data: &mut PassData| {
                data.output = builder.allocate_image(render_target(256, 256), AllocationFlags::empty());
            },
            |_, _, _, _| {},
        )
        .output
}

/// Read `input` and allocate a new render target.
fn add_filter(ctx: &mut TestContext, name: &str, input: ResourceHandle) -> ResourceHandle {
    ctx.graph
        .add_render_pass(
            name,
            move |builder, data: &mut PassData| {
                data.input = builder.read_read_only_image(input);
                data.output = builder.allocate_image(render_target(256, 256), AllocationFlags::empty());
            },
            |_, _, _, _| {},
        )
        .output
}

/// Read `inputs` and keep the pass alive.
fn add_sink(ctx: &mut TestContext, name: &str, inputs: Vec<ResourceHandle>) {
    ctx.graph.add_render_pass(
        name,
        move |builder, _: &mut PassData| {
            for input in inputs {
                if input.is_image() {
                    builder.read_read_only_image(input);
                } else {
                    builder.read_read_only_buffer(input);
                }
            }
            builder.set_uncullable_pass();
        },
        |_, _, _, _| {},
    );
}

// ============================================================================
// Ordering
// ============================================================================

/// Every reader is scheduled after the writer of what it reads, whatever
/// unrelated work is interleaved.
#[rstest]
#[case::short(1)]
#[case::medium(4)]
#[case::long(16)]
fn test_writer_scheduled_before_reader(#[case] chain_length: usize) {
    let mut ctx = TestContext::new();

    let mut current = add_producer(&mut ctx, "Source");
    let mut names = vec!["Source".to_string()];
    let mut unrelated = Vec::new();
    for i in 0..chain_length {
        let name = format!("Filter{i}");
        current = add_filter(&mut ctx, &name, current);
        names.push(name);

        let side = format!("Side{i}");
        unrelated.push(add_producer(&mut ctx, &side));
    }
    unrelated.push(current);
    add_sink(&mut ctx, "Sink", unrelated);

    let compiled = ctx.compile().unwrap();
    for pair in names.windows(2) {
        assert!(
            compiled.position(&pair[0]).unwrap() < compiled.position(&pair[1]).unwrap(),
            "{} must run before {}",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(compiled.passes.last().map(|p| p.name.as_str()), Some("Sink"));
}

#[test]
fn test_independent_passes_keep_registration_order() {
    let mut ctx = TestContext::new();
    let a = add_producer(&mut ctx, "A");
    let b = add_producer(&mut ctx, "B");
    let c = add_producer(&mut ctx, "C");
    add_sink(&mut ctx, "Sink", vec![c, b, a]);

    ctx.execute().unwrap();
    assert_eq!(ctx.executed_passes(), vec!["A", "B", "C", "Sink"]);
}

/// Pass A renders image I, pass B samples it read-only and writes buffer J.
#[test]
fn test_render_target_becomes_shader_resource() {
    let mut ctx = TestContext::new();
    let image = add_producer(&mut ctx, "A");
    let b = ctx.graph.add_render_pass(
        "B",
        move |builder, data: &mut PassData| {
            data.input = builder.read_read_only_image(image);
            data.output = builder.allocate_buffer(uav_buffer(1024), AllocationFlags::empty());
            builder.set_uncullable_pass();
        },
        |_, _, _, _| {},
    );

    let compiled = ctx.compile().unwrap();
    assert!(compiled.position("A").unwrap() < compiled.position("B").unwrap());

    let transitions: Vec<_> = compiled
        .transitions_of(image)
        .iter()
        .map(|t| (t.before, t.after))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ResourceState::Undefined, ResourceState::RenderTarget),
            (ResourceState::RenderTarget, ResourceState::ShaderResource),
        ]
    );
    let to_srv = compiled.pass("B").unwrap();
    assert!(to_srv
        .transitions
        .iter()
        .any(|t| t.resource == image && t.transition.after == ResourceState::ShaderResource));
    assert!(compiled.physical(b.output).is_some());

    ctx.execute().unwrap();
    let commands = ctx.device.last_submission();
    let pop_a = commands
        .iter()
        .position(|(_, c)| *c == RecordedCommand::PopEventMarker)
        .unwrap();
    let to_shader_read = commands
        .iter()
        .position(|(_, c)| {
            matches!(c, RecordedCommand::TransitionImage(_, t) if t.after == ResourceState::ShaderResource)
        })
        .unwrap();
    let push_b = commands
        .iter()
        .position(|(_, c)| *c == RecordedCommand::PushEventMarker("B".into()))
        .unwrap();
    assert!(pop_a < push_b && push_b < to_shader_read);
}

#[test]
fn test_unread_pass_is_culled() {
    let mut ctx = TestContext::new();
    add_producer(&mut ctx, "Unused");
    let used = add_producer(&mut ctx, "Used");
    add_sink(&mut ctx, "Sink", vec![used]);

    let stats = ctx.execute().unwrap();
    assert_eq!(stats.passes_culled, 1);
    assert_eq!(ctx.executed_passes(), vec!["Used", "Sink"]);
}

#[rstest]
#[case::culling(true)]
#[case::no_culling(false)]
fn test_uncullable_pass_runs_every_frame(#[case] enable_culling: bool) {
    let mut ctx = TestContext::with_config(FrameGraphConfig {
        enable_culling,
        ..Default::default()
    });

    for _ in 0..3 {
        ctx.graph.add_render_pass(
            "ClearCounters",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_buffer(uav_buffer(256), AllocationFlags::empty());
                builder.set_uncullable_pass();
            },
            |data, resources, cmd, _| {
                if let Some(buffer) = resources.get_buffer(data.output) {
                    cmd.update_buffer(buffer, 0, &[0; 16]);
                }
            },
        );
        ctx.execute().unwrap();
        assert_eq!(ctx.executed_passes(), vec!["ClearCounters"]);
    }
}

/// Two passes with disjoint resources give the same results in either
/// registration order.
#[rstest]
#[case::forward(false)]
#[case::swapped(true)]
fn test_disjoint_passes_reorder_freely(#[case] swapped: bool) {
    let mut ctx = TestContext::new();
    let a_name = NameHash::new("Test/BufferA");
    let b_name = NameHash::new("Test/BufferB");
    let desc = uav_buffer(16);
    let a = ctx.create_buffer(&desc);
    let b = ctx.create_buffer(&desc);
    ctx.graph
        .import_persistent_buffer(a_name, a, desc.clone(), ResourceState::Common)
        .unwrap();
    ctx.graph
        .import_persistent_buffer(b_name, b, desc, ResourceState::Common)
        .unwrap();

    let mut writers: Vec<(&str, NameHash, [u8; 16])> =
        vec![("WriteA", a_name, [0xAA; 16]), ("WriteB", b_name, [0xBB; 16])];
    if swapped {
        writers.reverse();
    }
    for (pass, name, value) in writers {
        ctx.graph.add_render_pass(
            pass,
            move |builder, data: &mut PassData| {
                let buffer = builder.retrieve_persistent_buffer(name).unwrap();
                data.output = builder.write_buffer(buffer);
            },
            move |data, resources, cmd, _| {
                if let Some(buffer) = resources.get_persistent_buffer(data.output) {
                    cmd.update_buffer(buffer, 0, &value);
                }
            },
        );
    }

    ctx.execute().unwrap();
    assert_eq!(ctx.device.buffer_contents(a), Some(&[0xAA; 16][..]));
    assert_eq!(ctx.device.buffer_contents(b), Some(&[0xBB; 16][..]));
}

// ============================================================================
// Queues
// ============================================================================

/// An async compute write read by graphics passes needs exactly one
/// queue handoff, however many graphics readers follow.
#[rstest]
#[case::one_reader(1)]
#[case::three_readers(3)]
fn test_single_cross_queue_transition(#[case] readers: usize) {
    let mut ctx = TestContext::with_config(async_config());

    let k = ctx
        .graph
        .add_render_pass(
            "X",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_buffer(uav_buffer(4096), AllocationFlags::empty());
                builder.use_async_compute();
            },
            |_, _, cmd, _| cmd.dispatch_compute(16, 1, 1),
        )
        .output;
    for i in 0..readers {
        add_sink(&mut ctx, &format!("Y{i}"), vec![k]);
    }

    let compiled = ctx.compile().unwrap();
    assert_eq!(compiled.pass("X").unwrap().queue, QueueType::AsyncCompute);
    assert_eq!(compiled.pass("Y0").unwrap().queue, QueueType::Graphics);

    let cross: Vec<_> = compiled
        .transitions_of(k)
        .into_iter()
        .filter(|t| t.is_cross_queue())
        .collect();
    assert_eq!(cross.len(), 1);
    assert_eq!(cross[0].source_queue, QueueType::AsyncCompute);
    assert_eq!(cross[0].destination_queue, QueueType::Graphics);
    assert_eq!(compiled.cross_queue_transitions, 1);

    let stats = ctx.execute().unwrap();
    assert_eq!(stats.cross_queue_transitions, 1);
    assert_eq!(ctx.pass_queue("X"), Some(QueueType::AsyncCompute));
}

#[test]
fn test_async_disabled_keeps_graphics_queue() {
    let mut ctx = TestContext::with_config(FrameGraphConfig {
        async_compute: AsyncComputePolicy::Disabled,
        ..Default::default()
    });
    let k = ctx
        .graph
        .add_render_pass(
            "X",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_buffer(uav_buffer(64), AllocationFlags::empty());
                builder.use_async_compute();
            },
            |_, _, _, _| {},
        )
        .output;
    add_sink(&mut ctx, "Y", vec![k]);

    let compiled = ctx.compile().unwrap();
    assert!(compiled.passes.iter().all(|p| p.queue == QueueType::Graphics));
    assert_eq!(compiled.cross_queue_transitions, 0);
}

#[test]
fn test_render_target_pass_never_goes_async() {
    let mut ctx = TestContext::with_config(async_config());
    ctx.graph.add_render_pass(
        "Raster",
        |builder, data: &mut PassData| {
            data.output = builder.allocate_image(render_target(64, 64), AllocationFlags::empty());
            builder.use_async_compute();
            builder.set_uncullable_pass();
        },
        |_, _, _, _| {},
    );

    let compiled = ctx.compile().unwrap();
    assert_eq!(compiled.pass("Raster").unwrap().queue, QueueType::Graphics);
}

/// Passes that may overlap on different queues never write the same
/// physical resource.
#[test]
fn test_concurrent_passes_write_disjoint_memory() {
    let mut ctx = TestContext::with_config(async_config());

    let mut outputs = Vec::new();
    for i in 0..4 {
        let compute = ctx
            .graph
            .add_render_pass(
                &format!("Compute{i}"),
                |builder, data: &mut PassData| {
                    data.output = builder.allocate_image(uav_image(128, 128), AllocationFlags::empty());
                    builder.use_async_compute();
                },
                |_, _, _, _| {},
            )
            .output;
        let graphics = add_producer(&mut ctx, &format!("Graphics{i}"));
        let filtered = add_filter(&mut ctx, &format!("Filter{i}"), graphics);
        outputs.extend([compute, filtered]);
    }
    add_sink(&mut ctx, "Composite", outputs);

    let compiled = ctx.compile().unwrap();
    let reachable = reachability(compiled);
    let passes = &compiled.passes;
    let mut overlapping_pairs = 0;
    for a in 0..passes.len() {
        for b in a + 1..passes.len() {
            let concurrent =
                passes[a].queue != passes[b].queue && !reachable[a][b] && !reachable[b][a];
            if !concurrent {
                continue;
            }
            overlapping_pairs += 1;
            let writes_a = physical_writes(compiled, &passes[a].name);
            let writes_b = physical_writes(compiled, &passes[b].name);
            assert!(
                writes_a.iter().all(|w| !writes_b.contains(w)),
                "{} and {} may overlap but write the same memory",
                passes[a].name,
                passes[b].name
            );
        }
    }
    assert!(overlapping_pairs > 0);
}

// ============================================================================
// Memory
// ============================================================================

/// X lives in steps 0-1, Y in 1-2, Z in 2-3: X and Z can share memory,
/// neighbours cannot.
#[test]
fn test_aliasing_respects_lifetimes() {
    let mut ctx = TestContext::new();
    let x = add_producer(&mut ctx, "A");
    let y = add_filter(&mut ctx, "B", x);
    let z = add_filter(&mut ctx, "C", y);
    add_sink(&mut ctx, "D", vec![z]);

    let compiled = ctx.compile().unwrap();
    assert_eq!(compiled.physical(x), compiled.physical(z));
    assert_ne!(compiled.physical(x), compiled.physical(y));
    assert_eq!(compiled.aliased_resources, 1);

    for (i, a) in compiled.resources.iter().enumerate() {
        for b in &compiled.resources[i + 1..] {
            if a.physical.is_some() && a.physical == b.physical {
                let (Some(la), Some(lb)) = (a.lifetime, b.lifetime) else {
                    continue;
                };
                assert!(!la.overlaps(&lb), "'{}' and '{}' overlap", a.name, b.name);
            }
        }
    }

    // The second tenant starts by discarding the first one's contents
    let z_transitions = compiled.transitions_of(z);
    assert!(z_transitions[0].discards_contents());
    assert_eq!(z_transitions[0].after, ResourceState::RenderTarget);
}

#[test]
fn test_aliasing_can_be_disabled() {
    let mut ctx = TestContext::with_config(FrameGraphConfig {
        enable_aliasing: false,
        ..Default::default()
    });
    let x = add_producer(&mut ctx, "A");
    let y = add_filter(&mut ctx, "B", x);
    let z = add_filter(&mut ctx, "C", y);
    add_sink(&mut ctx, "D", vec![z]);

    let compiled = ctx.compile().unwrap();
    assert_ne!(compiled.physical(x), compiled.physical(z));
    assert_eq!(compiled.aliased_resources, 0);
}

#[test]
fn test_async_resources_get_dedicated_memory() {
    let mut ctx = TestContext::with_config(async_config());
    let graphics = add_producer(&mut ctx, "Early");
    add_sink(&mut ctx, "EarlySink", vec![graphics]);

    let compute = ctx
        .graph
        .add_render_pass(
            "Compute",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_image(uav_image(256, 256), AllocationFlags::empty());
                builder.use_async_compute();
            },
            |_, _, _, _| {},
        )
        .output;
    let late = add_producer(&mut ctx, "Late");
    add_sink(&mut ctx, "LateSink", vec![compute, late]);

    let compiled = ctx.compile().unwrap();
    let binding = compiled.resource(compute).unwrap();
    assert!(binding.queues.contains(&QueueType::AsyncCompute));
    let physical = binding.physical;
    let shared = compiled
        .resources
        .iter()
        .filter(|b| b.physical == physical)
        .count();
    assert_eq!(shared, 1);
}

#[test]
fn test_transient_pool_is_reused_across_frames() {
    let mut ctx = TestContext::with_config(FrameGraphConfig {
        frames_in_flight: 1,
        ..Default::default()
    });

    let mut created = Vec::new();
    for _ in 0..3 {
        let image = add_producer(&mut ctx, "A");
        add_sink(&mut ctx, "B", vec![image]);
        created.push(ctx.execute().unwrap().transient_allocations);
    }
    assert_eq!(created, vec![1, 0, 0]);
}

#[test]
fn test_pipeline_dimensions_follow_viewport() {
    let mut ctx = TestContext::new();
    let image = ctx
        .graph
        .add_render_pass(
            "Scene",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_image(
                    render_target(1, 1),
                    AllocationFlags::USE_PIPELINE_DIMENSIONS,
                );
                builder.set_uncullable_pass();
            },
            |data, resources, _, _| {
                let desc = resources.get_image_desc(data.output).unwrap();
                assert_eq!((desc.width, desc.height), (WIDTH, HEIGHT));
            },
        )
        .output;

    let compiled = ctx.compile().unwrap();
    let desc = compiled.resource(image).unwrap().desc.as_image().unwrap();
    assert_eq!((desc.width, desc.height), (WIDTH, HEIGHT));
    ctx.execute().unwrap();
}

#[rstest]
#[case::contents(ImageFormat::Rgba16Float, AllocationFlags::empty(), true)]
#[case::no_content_flag(ImageFormat::Rgba16Float, AllocationFlags::NO_CONTENT_COPY, false)]
#[case::incompatible_format(ImageFormat::R32Float, AllocationFlags::empty(), false)]
fn test_copy_image(
    #[case] format: ImageFormat,
    #[case] flags: AllocationFlags,
    #[case] copies_contents: bool,
) {
    let mut ctx = TestContext::new();
    let source = ctx
        .graph
        .add_render_pass(
            "Scene",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_image(
                    render_target(1, 1),
                    AllocationFlags::USE_PIPELINE_DIMENSIONS,
                );
            },
            |_, _, _, _| {},
        )
        .output;
    let copy = ctx
        .graph
        .add_render_pass(
            "History",
            move |builder, data: &mut PassData| {
                let (copy, desc) = builder.copy_image(source, flags);
                desc.format = format;
                desc.bind_flags = BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE;
                data.output = copy;
                builder.set_uncullable_pass();
            },
            |_, _, _, _| {},
        )
        .output;

    let compiled = ctx.compile().unwrap();
    let desc = compiled.resource(copy).unwrap().desc.as_image().unwrap();
    assert_eq!((desc.width, desc.height), (WIDTH, HEIGHT));
    assert_eq!(desc.format, format);

    let history = compiled.pass("History").unwrap();
    assert_eq!(!history.copies.is_empty(), copies_contents);
    if copies_contents {
        let states: Vec<_> = history
            .copy_transitions
            .iter()
            .map(|t| (t.resource, t.transition.after))
            .collect();
        assert_eq!(
            states,
            vec![
                (source, ResourceState::CopySource),
                (copy, ResourceState::CopyDest)
            ]
        );
    }

    ctx.execute().unwrap();
    let copied = ctx
        .device
        .last_submission()
        .iter()
        .any(|(_, c)| matches!(c, RecordedCommand::CopyImage { .. }));
    assert_eq!(copied, copies_contents);
}

// ============================================================================
// Persistent
// ============================================================================

#[derive(Debug, Clone, Default)]
struct PingPongData {
    read: ResourceHandle,
    write: ResourceHandle,
}

/// The buffer written in frame N is the one read in frame N + 1.
#[test]
fn test_ping_pong_rotation() {
    let mut ctx = TestContext::new();
    let read_name = NameHash::new("AutoExposure/ReadBuffer");
    let write_name = NameHash::new("AutoExposure/WriteBuffer");
    let desc = BufferDesc::new(16, BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE);
    let buffers = [ctx.create_buffer(&desc), ctx.create_buffer(&desc)];
    ctx.graph
        .import_persistent_buffer_pair(read_name, write_name, buffers, desc, ResourceState::Common)
        .unwrap();

    let mut previous_write = None;
    for frame in 0..4 {
        let data = ctx.graph.add_render_pass(
            "AutoExposure",
            move |builder, data: &mut PingPongData| {
                data.read = builder.retrieve_persistent_buffer(read_name).unwrap();
                data.write = builder.retrieve_persistent_buffer(write_name).unwrap();
            },
            |_, _, _, _| {},
        );

        let compiled = ctx.compile().unwrap();
        let read = compiled.physical(data.read).unwrap();
        let write = compiled.physical(data.write).unwrap();
        assert_ne!(read, write);
        if let Some(previous) = previous_write {
            assert_eq!(read, previous, "frame {frame} reads last frame's write side");
        }
        previous_write = Some(write);

        let stats = ctx.execute().unwrap();
        assert_eq!(stats.persistent_rotations, 1);
    }
}

#[test]
fn test_pair_without_write_does_not_rotate() {
    let mut ctx = TestContext::new();
    let read_name = NameHash::new("Shadow/ReadSliceInfo");
    let write_name = NameHash::new("Shadow/WriteSliceInfo");
    let desc = uav_buffer(64);
    let buffers = [ctx.create_buffer(&desc), ctx.create_buffer(&desc)];
    ctx.graph
        .import_persistent_buffer_pair(read_name, write_name, buffers, desc, ResourceState::Common)
        .unwrap();

    for _ in 0..2 {
        let data = ctx.graph.add_render_pass(
            "ShadowLookup",
            move |builder, data: &mut PingPongData| {
                data.read = builder.retrieve_persistent_buffer(read_name).unwrap();
                builder.set_uncullable_pass();
            },
            |_, _, _, _| {},
        );
        let compiled = ctx.compile().unwrap();
        assert_eq!(
            compiled.physical(data.read).and_then(|p| p.as_buffer()),
            Some(buffers[0])
        );
        assert_eq!(ctx.execute().unwrap().persistent_rotations, 0);
    }
}

#[test]
fn test_persistent_state_carries_over() {
    let mut ctx = TestContext::new();
    let name = NameHash::new("Atmosphere/TransmittanceLut");
    let desc = uav_buffer(256);
    let buffer = ctx.create_buffer(&desc);
    ctx.graph
        .import_persistent_buffer(name, buffer, desc, ResourceState::Common)
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let data = ctx.graph.add_render_pass(
            "Precompute",
            move |builder, data: &mut PassData| {
                let lut = builder.retrieve_persistent_buffer(name).unwrap();
                data.output = builder.write_buffer(lut);
            },
            |_, _, _, _| {},
        );
        let compiled = ctx.compile().unwrap();
        handles.push(compiled.transitions_of(data.output));
        ctx.execute().unwrap();
    }

    // First frame leaves Common; the second starts where the first ended
    assert_eq!(handles[0][0].before, ResourceState::Common);
    assert_eq!(handles[0][0].after, ResourceState::UnorderedAccess);
    assert!(handles[1].iter().all(|t| t.before == ResourceState::UnorderedAccess));
}

/// Retrieving a persistent UAV buffer does not make a pass its writer:
/// unused lookups are culled and read-only consumers stay unordered.
#[test]
fn test_persistent_uav_readers_are_plain_readers() {
    let mut ctx = TestContext::new();
    let name = NameHash::new("Shadow/SliceInfo");
    let desc = uav_buffer(128);
    let buffer = ctx.create_buffer(&desc);
    ctx.graph
        .import_persistent_buffer(name, buffer, desc, ResourceState::UnorderedAccess)
        .unwrap();

    ctx.graph.add_render_pass(
        "UnusedLookup",
        move |builder, data: &mut PassData| {
            data.input = builder.retrieve_persistent_buffer(name).unwrap();
            data.output = builder.allocate_image(render_target(64, 64), AllocationFlags::empty());
        },
        |_, _, _, _| {},
    );

    let mut outputs = Vec::new();
    let mut slice_info = ResourceHandle::INVALID;
    for pass in ["LightingA", "LightingB"] {
        let data = ctx.graph.add_render_pass(
            pass,
            move |builder, data: &mut PassData| {
                let handle = builder.retrieve_persistent_buffer(name).unwrap();
                data.input = builder.read_read_only_buffer(handle);
                data.output = builder.allocate_image(render_target(64, 64), AllocationFlags::empty());
            },
            |_, _, _, _| {},
        );
        slice_info = data.input;
        outputs.push(data.output);
    }
    add_sink(&mut ctx, "Composite", outputs);

    let compiled = ctx.compile().unwrap();
    assert!(compiled.is_culled("UnusedLookup"));
    assert!(!compiled.is_culled("LightingA"));
    assert!(!compiled.is_culled("LightingB"));

    let a = compiled.pass("LightingA").unwrap().pass_index;
    let b = compiled.pass("LightingB").unwrap();
    assert!(!b.dependencies.contains(&a));
    assert!(b.writes.iter().all(|&w| w != slice_info));

    let transitions = compiled.transitions_of(slice_info);
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].after, ResourceState::ShaderResource);
    ctx.execute().unwrap();
}

#[test]
fn test_last_frame_image_round_trip() {
    let mut ctx = TestContext::new();

    let missing = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&missing);
    let exported = ctx
        .graph
        .add_render_pass(
            "Composite",
            move |builder, data: &mut PassData| {
                *seen.lock() = Some(builder.retrieve_last_frame_image());
                data.output = builder.allocate_image(render_target(64, 64), AllocationFlags::empty());
                builder.export_last_frame_image(data.output);
            },
            |_, _, _, _| {},
        )
        .output;
    assert!(matches!(
        missing.lock().clone(),
        Some(Err(FrameGraphError::ResourceNotFound(_)))
    ));

    let exported_physical = ctx.compile().unwrap().physical(exported).unwrap();
    ctx.execute().unwrap();

    let history = ctx
        .graph
        .add_render_pass(
            "Reproject",
            |builder, data: &mut PassData| {
                data.input = builder.retrieve_last_frame_image().unwrap();
                builder.set_uncullable_pass();
            },
            |_, _, _, _| {},
        )
        .input;
    let compiled = ctx.compile().unwrap();
    assert_eq!(compiled.physical(history), Some(exported_physical));
    assert!(matches!(
        compiled.resource(history).unwrap().origin,
        ResourceOrigin::Persistent(_)
    ));
    ctx.execute().unwrap();
}

#[test]
fn test_replaced_export_is_released_after_completion() {
    let mut device = DummyDevice::new();
    device.set_fence_mode(FenceMode::Deferred);
    let mut ctx = TestContext::with_device(
        device,
        FrameGraphConfig {
            frames_in_flight: 2,
            ..Default::default()
        },
    );
    let name = NameHash::new("Shadow/SliceInfo");
    let baseline = ctx.device.live_buffer_count();

    for _ in 0..3 {
        ctx.graph.add_render_pass(
            "SliceInfo",
            move |builder, data: &mut PassData| {
                data.output = builder.allocate_buffer(uav_buffer(128), AllocationFlags::empty());
                builder.export_persistent_buffer(name, data.output);
            },
            |_, _, _, _| {},
        );
        ctx.execute().unwrap();
        ctx.device.complete_oldest_submission();
    }
    ctx.device.complete_all_submissions();
    ctx.graph.wait_idle(&mut ctx.device).unwrap();

    assert_eq!(ctx.device.live_buffer_count(), baseline + 1);
    assert!(ctx.graph.persistent_resources().contains(name));
}

/// Compiles that fail before submission do not count as frames, so they
/// cannot make a pending frame look complete.
#[test]
fn test_failed_compile_keeps_pending_release() {
    let mut device = DummyDevice::new();
    device.set_fence_mode(FenceMode::Deferred);
    let mut ctx = TestContext::with_device(device, FrameGraphConfig::default());
    let name = NameHash::new("Shadow/SliceInfo");

    let exported = ctx
        .graph
        .add_render_pass(
            "SliceInfo",
            move |builder, data: &mut PassData| {
                data.output = builder.allocate_buffer(uav_buffer(128), AllocationFlags::empty());
                builder.export_persistent_buffer(name, data.output);
            },
            |_, _, _, _| {},
        )
        .output;
    let buffer = ctx
        .compile()
        .unwrap()
        .physical(exported)
        .and_then(|p| p.as_buffer())
        .unwrap();
    ctx.execute().unwrap();
    assert_eq!(ctx.graph.remove_persistent(name), Ok(true));

    // No swapchain was supplied, so this frame never gets past compile
    ctx.graph.add_render_pass(
        "Blit",
        |builder, data: &mut PassData| {
            data.output = builder.retrieve_swapchain_buffer();
        },
        |_, _, _, _| {},
    );
    for _ in 0..3 {
        assert!(ctx.compile().is_err());
    }
    assert_eq!(ctx.graph.frame_count(), 1);
    assert_eq!(ctx.device.pending_submission_count(), 1);
    assert!(ctx.device.buffer_desc(buffer).is_some());

    ctx.device.complete_all_submissions();
    ctx.graph.wait_idle(&mut ctx.device).unwrap();
    assert!(ctx.device.buffer_desc(buffer).is_none());
}

#[test]
fn test_per_view_buffer_holds_camera() {
    let mut ctx = TestContext::new();
    let data = ctx.graph.add_render_pass(
        "Forward",
        |builder, data: &mut PassData| {
            data.input = builder.retrieve_per_view_buffer();
            builder.set_uncullable_pass();
        },
        |data, resources, cmd, _| {
            let buffer = resources.get_persistent_buffer(data.input).unwrap();
            cmd.bind_constant_buffer(NameHash::new("PerView"), buffer);
        },
    );

    let compiled = ctx.compile().unwrap();
    let buffer: BufferHandle = compiled.physical(data.input).unwrap().as_buffer().unwrap();
    assert_eq!(
        compiled.transitions_of(data.input)[0].after,
        ResourceState::ConstantBuffer
    );
    ctx.execute().unwrap();

    let contents = ctx.device.buffer_contents(buffer).unwrap();
    assert_eq!(contents.len() as u64, PerViewData::SIZE);
    let view = ctx.camera.view_matrix();
    assert_eq!(&contents[..64], bytemuck::bytes_of(&view));
}

#[test]
fn test_swapchain_is_presented() {
    let mut ctx = TestContext::new().with_swapchain();
    let data = ctx.graph.add_render_pass(
        "Blit",
        |builder, data: &mut PassData| {
            data.output = builder.retrieve_swapchain_buffer();
        },
        |data, resources, cmd, _| {
            let target = resources.get_image(data.output).unwrap();
            cmd.setup_framebuffer(&[target], None);
            cmd.draw(3, 1, 0);
        },
    );

    let compiled = ctx.compile().unwrap();
    let states: Vec<_> = compiled
        .transitions_of(data.output)
        .iter()
        .map(|t| (t.before, t.after))
        .collect();
    assert_eq!(
        states,
        vec![
            (ResourceState::Present, ResourceState::RenderTarget),
            (ResourceState::RenderTarget, ResourceState::Present),
        ]
    );
    ctx.execute().unwrap();
    assert_eq!(ctx.executed_passes(), vec!["Blit"]);
}

#[test]
fn test_imported_image_lifecycle() {
    let mut ctx = TestContext::new();
    let name = NameHash::new("Atmosphere/SkyViewLut");
    let desc = uav_image(192, 108);
    let image = ctx.device.create_image(&desc).unwrap();
    ctx.graph
        .import_persistent_image(name, image, desc, ResourceState::ShaderResource)
        .unwrap();

    let data = ctx.graph.add_render_pass(
        "Sky",
        move |builder, data: &mut PassData| {
            let lut = builder.retrieve_persistent_image(name).unwrap();
            data.input = builder.read_read_only_image(lut);
            builder.set_uncullable_pass();
        },
        |data, resources, cmd, _| {
            let lut = resources.get_persistent_image(data.input).unwrap();
            cmd.bind_image(NameHash::new("SkyViewLut"), lut);
        },
    );
    assert_eq!(
        ctx.compile().unwrap().physical(data.input).and_then(|p| p.as_image()),
        Some(image)
    );

    // The table cannot change while a frame is compiled
    assert!(matches!(
        ctx.graph.remove_persistent(name),
        Err(FrameGraphError::InvalidPhase { .. })
    ));
    ctx.execute().unwrap();

    assert_eq!(ctx.graph.remove_persistent(name), Ok(true));
    assert_eq!(ctx.graph.remove_persistent(name), Ok(false));
    // Module-owned images are never destroyed by the graph
    ctx.graph.wait_idle(&mut ctx.device).unwrap();
    assert!(ctx.device.image_desc(image).is_some());
}

#[test]
fn test_material_editor_buffer_is_writable() {
    let mut ctx = TestContext::new();
    let data = ctx.graph.add_render_pass(
        "MaterialPreview",
        |builder, data: &mut PassData| {
            let buffer = builder.retrieve_material_ed_buffer();
            data.output = builder.write_buffer(buffer);
        },
        |data, resources, cmd, _| {
            let buffer = resources.get_persistent_buffer(data.output).unwrap();
            cmd.update_buffer(buffer, 0, &[7; 8]);
        },
    );

    let compiled = ctx.compile().unwrap();
    assert!(!compiled.is_culled("MaterialPreview"));
    let buffer = compiled.physical(data.output).unwrap().as_buffer().unwrap();
    assert_eq!(
        compiled.transitions_of(data.output)[0].after,
        ResourceState::UnorderedAccess
    );
    ctx.execute().unwrap();
    assert_eq!(&ctx.device.buffer_contents(buffer).unwrap()[..8], &[7; 8]);
}

#[derive(Debug, Default, PartialEq)]
struct ObservedGlobals {
    screen_size: (u32, u32),
    viewport_width: f32,
    delta_time: f32,
    frame_index: u64,
    opaque_draws: usize,
    camera_matches: bool,
}

#[test]
fn test_execute_sees_frame_globals() {
    let mut ctx = TestContext::new();
    let vertices = ctx.create_buffer(&BufferDesc::new(1024, BindFlags::VERTEX_BUFFER));
    for sort_key in [3, 1, 2] {
        ctx.buckets.push(
            DrawCommandLayer::Opaque,
            0,
            DrawCmd {
                sort_key,
                material: NameHash::new("Default"),
                vertex_buffer: vertices,
                index_buffer: None,
                element_count: 3,
                instance_count: 1,
                first_index: 0,
                base_vertex: 0,
            },
        );
    }
    ctx.buckets.sort();

    let observed = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        let sink = Arc::clone(&observed);
        ctx.graph.add_render_pass(
            "Opaque",
            |builder, data: &mut PassData| {
                data.output = builder.allocate_image(
                    render_target(1, 1),
                    AllocationFlags::USE_PIPELINE_DIMENSIONS,
                );
                builder.set_uncullable_pass();
            },
            move |_, resources, cmd, _| {
                let draws = resources.get_draw_cmd_bucket(DrawCommandLayer::Opaque, 0);
                for draw in draws {
                    cmd.draw(draw.element_count, draw.instance_count, 0);
                }
                let size = resources.get_screen_size();
                sink.lock().push(ObservedGlobals {
                    screen_size: (size.x, size.y),
                    viewport_width: resources.get_main_viewport().width,
                    delta_time: resources.get_delta_time(),
                    frame_index: resources.get_frame_index(),
                    opaque_draws: draws.len(),
                    camera_matches: resources.get_per_view_data().view
                        == resources.get_main_camera().view_matrix(),
                });
            },
        );
        ctx.execute().unwrap();
    }

    let observed = observed.lock();
    assert_eq!(observed.len(), 2);
    assert_eq!(observed[0].screen_size, (WIDTH, HEIGHT));
    assert_eq!(observed[0].viewport_width, WIDTH as f32);
    assert_eq!(observed[0].delta_time, 1.0 / 60.0);
    assert_eq!(observed[0].opaque_draws, 3);
    assert!(observed[0].camera_matches);
    assert_eq!(observed[1].frame_index, observed[0].frame_index + 1);
}

// ============================================================================
// Frame pipelining
// ============================================================================

#[test]
fn test_wait_pending_frame_completion_is_idempotent() {
    let mut device = DummyDevice::new();
    device.set_fence_mode(FenceMode::Deferred);
    let mut ctx = TestContext::with_device(device, FrameGraphConfig::default());

    for _ in 0..2 {
        let image = add_producer(&mut ctx, "A");
        add_sink(&mut ctx, "B", vec![image]);
        ctx.execute().unwrap();
    }
    assert_eq!(ctx.device.pending_submission_count(), 2);

    ctx.device.complete_oldest_submission();
    ctx.graph.wait_pending_frame_completion(&ctx.device).unwrap();
    ctx.graph.wait_pending_frame_completion(&ctx.device).unwrap();

    // The next frame reuses the completed slot without blocking
    let image = add_producer(&mut ctx, "A");
    add_sink(&mut ctx, "B", vec![image]);
    ctx.execute().unwrap();
    assert_eq!(ctx.graph.frame_count(), 3);
}

#[test]
fn test_lost_device_surfaces_from_wait() {
    let mut device = DummyDevice::new();
    device.set_fence_mode(FenceMode::Deferred);
    let mut ctx = TestContext::with_device(
        device,
        FrameGraphConfig {
            frames_in_flight: 1,
            stall_warning_timeout: std::time::Duration::from_millis(5),
            ..Default::default()
        },
    );

    let image = add_producer(&mut ctx, "A");
    add_sink(&mut ctx, "B", vec![image]);
    ctx.execute().unwrap();

    ctx.device.lose_device();
    assert_eq!(
        ctx.graph.wait_pending_frame_completion(&ctx.device),
        Err(FrameGraphError::DeviceLost)
    );
}

#[test]
fn test_lost_device_fails_execute() {
    let mut ctx = TestContext::new();
    let image = add_producer(&mut ctx, "A");
    add_sink(&mut ctx, "B", vec![image]);
    ctx.device.lose_device();

    assert_eq!(ctx.execute(), Err(FrameGraphError::DeviceLost));
}

#[test]
fn test_shutdown_releases_everything() {
    let mut ctx = TestContext::new();
    for _ in 0..2 {
        let image = add_producer(&mut ctx, "A");
        let filtered = add_filter(&mut ctx, "B", image);
        ctx.graph.add_render_pass(
            "Export",
            move |builder, _: &mut PassData| {
                builder.read_read_only_image(filtered);
                let history = builder.allocate_image(render_target(32, 32), AllocationFlags::empty());
                builder.export_last_frame_image(history);
            },
            |_, _, _, _| {},
        );
        ctx.execute().unwrap();
    }

    ctx.graph.shutdown(&mut ctx.device).unwrap();
    assert_eq!(ctx.device.live_image_count(), 0);
    assert_eq!(ctx.device.live_buffer_count(), 0);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_missing_persistent_resource() {
    let mut ctx = TestContext::new();
    let result: Arc<Mutex<Option<FrameGraphResult<ResourceHandle>>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&result);
    ctx.graph.add_render_pass(
        "Lookup",
        move |builder, _: &mut PassData| {
            *slot.lock() = Some(builder.retrieve_persistent_image(NameHash::new("Never/Imported")));
        },
        |_, _, _, _| {},
    );

    assert!(matches!(
        result.lock().clone(),
        Some(Err(FrameGraphError::ResourceNotFound(_)))
    ));
}

#[rstest]
#[case::unsupported(false, true)]
#[case::supported(true, false)]
fn test_depth_stencil_uav(#[case] depth_stencil_uav: bool, #[case] rejected: bool) {
    let capabilities = DeviceCapabilities {
        depth_stencil_uav,
        ..Default::default()
    };
    let mut ctx = TestContext::with_capabilities(capabilities, FrameGraphConfig::default());
    ctx.graph.add_render_pass(
        "DepthPyramid",
        |builder, data: &mut PassData| {
            data.output = builder.allocate_image(
                ImageDesc::new_2d(
                    512,
                    512,
                    ImageFormat::Depth32Float,
                    BindFlags::DEPTH_STENCIL | BindFlags::UNORDERED_ACCESS,
                ),
                AllocationFlags::empty(),
            );
            builder.set_uncullable_pass();
        },
        |_, _, _, _| {},
    );

    let result = ctx.compile().map(|_| ());
    assert_eq!(
        matches!(result, Err(FrameGraphError::Configuration { .. })),
        rejected
    );
}

#[test]
fn test_missing_swapchain_is_a_configuration_error() {
    let mut ctx = TestContext::new();
    ctx.graph.add_render_pass(
        "Blit",
        |builder, data: &mut PassData| {
            data.output = builder.retrieve_swapchain_buffer();
        },
        |_, _, _, _| {},
    );

    assert!(matches!(
        ctx.compile(),
        Err(FrameGraphError::Configuration { .. })
    ));
}

#[test]
fn test_compile_twice_is_a_phase_error() {
    let mut ctx = TestContext::new();
    let image = add_producer(&mut ctx, "A");
    add_sink(&mut ctx, "B", vec![image]);

    ctx.compile().unwrap();
    assert!(matches!(
        ctx.compile(),
        Err(FrameGraphError::InvalidPhase { .. })
    ));
    ctx.execute().unwrap();
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "does not belong to this frame")]
fn test_stale_handle_is_rejected() {
    let mut ctx = TestContext::new();
    let stale = add_producer(&mut ctx, "A");
    add_sink(&mut ctx, "B", vec![stale]);
    ctx.execute().unwrap();

    add_sink(&mut ctx, "Late", vec![stale]);
}
