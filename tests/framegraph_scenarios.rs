//! Cross-module scenarios for the framegraph, stage graph, encoders and
//! host-memory plumbing.
//!
//! These tests run against the recording backend, so they exercise the
//! full path from builder tables through submission planning and command
//! recording without a GPU.

use std::sync::Arc;

use vermilion_graphics::backend::{BufferView, FenceView, ImageView};
use vermilion_graphics::backend::dummy::DummyEncoder;
use vermilion_graphics::backend::CommandEncoderView;
use vermilion_graphics::descriptors::{
    copy_descriptor_sets, CopyInfo, DescriptorBinding, DescriptorResource, DescriptorSet,
    DescriptorSetLayoutCache, DescriptorType, ShaderStageFlags, UpdateInfo, WrittenDescriptor,
};
use vermilion_graphics::framegraph::{
    AttachmentFlags, ClearValue, ColorAttachmentDescription, DepthStencilAttachmentDescription,
    FramegraphBuilder, RenderSubpassDescription, StageDescription, SubpassAttachmentReference,
};
use vermilion_graphics::memory::{Buffer, DeviceMemoryPool, MapMemoryStatus};
use vermilion_graphics::stage::{JobPriority, StageGraph};
use vermilion_graphics::state::{ImageMemoryBarrier, SubresourceState};
use vermilion_graphics::types::{
    supported_access_flags, AccessFlags, BufferCopy, Extent3d, ImageAspectFlags, ImageLayout,
    ImageSubresourceRange, PipelineStageFlags,
};
use vermilion_graphics::wrappers::{Framebuffer, RenderPass, RenderPassView};

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();
}

fn color_attachment(identifier: u64) -> ColorAttachmentDescription {
    ColorAttachmentDescription::new(
        identifier,
        Extent3d::new(1024, 768, 1),
        ImageSubresourceRange::single_color(),
        AttachmentFlags::MUST_STORE,
        Some(ClearValue::Color([0.0, 0.0, 0.0, 1.0])),
    )
}

// ============================================================================
// Framegraph assembly
// ============================================================================

/// Three color attachments and one depth attachment, all referenced by a
/// single render subpass, resolve into exactly one stage whose attachment
/// references index the builder's tables.
#[test]
fn test_single_stage_with_color_and_depth_attachments() {
    init_logging();
    let mut builder = FramegraphBuilder::new();
    let colors = builder.emplace_color_attachments([
        color_attachment(1),
        color_attachment(2),
        color_attachment(3),
    ]);
    let depth = builder.emplace_depth_stencil_attachments([DepthStencilAttachmentDescription::new(
        4,
        Extent3d::new(1024, 768, 1),
        ImageSubresourceRange::new(
            ImageAspectFlags::DEPTH_STENCIL,
            vermilion_graphics::types::MipRange::single(0),
            vermilion_graphics::types::ArrayRange::single(0),
        ),
        AttachmentFlags::empty(),
        Some(ClearValue::DepthStencil {
            depth: 1.0,
            stencil: 0,
        }),
    )]);

    // Colors occupy indices 0..3 of the stage's combined attachment list,
    // the depth attachment is last.
    let references = builder.emplace_subpass_attachment_references([
        SubpassAttachmentReference {
            attachment: 0,
            layout: ImageLayout::ColorAttachmentOptimal,
        },
        SubpassAttachmentReference {
            attachment: 1,
            layout: ImageLayout::ColorAttachmentOptimal,
        },
        SubpassAttachmentReference {
            attachment: 2,
            layout: ImageLayout::ColorAttachmentOptimal,
        },
        SubpassAttachmentReference {
            attachment: 3,
            layout: ImageLayout::DepthStencilAttachmentOptimal,
        },
    ]);
    let subpasses = builder.emplace_render_subpasses([RenderSubpassDescription {
        attachment_references: references,
    }]);
    builder.emplace_stage(StageDescription::Render {
        name: "forward".to_string(),
        priority: JobPriority::Normal,
        color_attachments: colors,
        depth_stencil_attachment: Some(depth.first() as u8),
        subpasses,
        previous_stages: vec![],
    });

    let mut graph = StageGraph::new();
    let framegraph = builder.build(&mut graph).unwrap();

    let stages: Vec<_> = framegraph.get_stages().collect();
    assert_eq!(stages.len(), 1);
    assert_eq!(graph.stage_count(), 1);

    let StageDescription::Render {
        color_attachments,
        depth_stencil_attachment,
        subpasses,
        ..
    } = framegraph.description(stages[0].description)
    else {
        panic!("expected a render stage");
    };
    assert_eq!(framegraph.color_attachments(*color_attachments).len(), 3);
    assert!(depth_stencil_attachment.is_some());

    let subpasses = framegraph.render_subpasses(*subpasses);
    assert_eq!(subpasses.len(), 1);
    let references =
        framegraph.subpass_attachment_references(subpasses[0].attachment_references);
    assert_eq!(references.len(), 4);
    let attachment_count = 3 + 1;
    for reference in references {
        assert!((reference.attachment as usize) < attachment_count);
    }
}

// ============================================================================
// Stage scheduling
// ============================================================================

/// Two roots with no shared ancestor are never serialized against each
/// other: neither produces a wait.
#[test]
fn test_independent_roots_are_not_serialized() {
    init_logging();
    let mut graph = StageGraph::new();
    let shadow = graph.add_stage("shadow", Default::default());
    let ui = graph.add_stage("ui", Default::default());
    graph.begin_frame();

    assert!(graph.collect_wait_semaphores(shadow).is_empty());
    assert!(graph.collect_wait_semaphores(ui).is_empty());

    // Both plan without waiting on each other.
    let shadow_plan = graph.plan_submission(shadow).unwrap();
    let ui_plan = graph.plan_submission(ui).unwrap();
    assert!(shadow_plan.wait_semaphores.is_empty());
    assert!(ui_plan.wait_semaphores.is_empty());
}

/// A multi-parent stage recurses into each parent's ancestry separately:
/// the branch with a usable semaphore is waited on at its nearest
/// ancestor, the branch without one walks further up.
#[test]
fn test_multi_parent_waits_resolve_per_branch() {
    init_logging();
    let mut graph = StageGraph::new();
    let geometry = graph.add_stage("geometry", Default::default());
    let shadow_root = graph.add_stage("shadow_root", Default::default());
    let shadow_blur = graph.add_stage("shadow_blur", Default::default());
    let lighting = graph.add_stage("lighting", Default::default());

    graph.add_subsequent_gpu_stage(geometry, lighting);
    graph.add_subsequent_gpu_stage(shadow_root, shadow_blur);
    graph.add_subsequent_gpu_stage(shadow_blur, lighting);
    graph.begin_frame();

    // geometry submits; shadow_blur does not (its root did, though).
    graph.plan_submission(geometry).unwrap();
    graph.plan_submission(shadow_root).unwrap();
    graph.set_enabled(shadow_blur, false);

    let waits = graph.collect_wait_semaphores(lighting);
    assert_eq!(waits.len(), 2);
    let wait_stages: Vec<_> = waits.iter().map(|w| w.stage).collect();
    // Direct parent on the submitted branch.
    assert!(wait_stages.contains(&geometry));
    // The unsubmitted branch defers to its own submitted ancestor.
    assert!(wait_stages.contains(&shadow_root));
    // Every reported wait has an edge semaphore behind it.
    for wait in &waits {
        assert!(graph.edge_semaphore(wait.stage, wait.next_stage).is_some());
    }
}

/// A built framegraph plans its stages in description order with the
/// child waiting on the parent edge's semaphore.
#[test]
fn test_built_framegraph_plans_in_dependency_order() {
    init_logging();
    let mut builder = FramegraphBuilder::new();
    let depth_prepass = builder.emplace_stage(StageDescription::ExplicitRender {
        name: "depth_prepass".to_string(),
        priority: JobPriority::High,
        previous_stages: vec![],
    });
    builder.emplace_stage(StageDescription::ExplicitRender {
        name: "opaque".to_string(),
        priority: JobPriority::Normal,
        previous_stages: vec![depth_prepass],
    });

    let mut graph = StageGraph::new();
    let framegraph = builder.build(&mut graph).unwrap();
    graph.begin_frame();

    let mut plans = Vec::new();
    for stage in framegraph.get_stages() {
        plans.push(graph.plan_submission(stage.handle).unwrap());
    }
    assert!(plans[0].wait_semaphores.is_empty());
    assert_eq!(plans[0].signal_semaphores.len(), 1);
    assert_eq!(plans[1].wait_semaphores.len(), 1);
    assert_eq!(plans[1].priority, JobPriority::Normal);
}

// ============================================================================
// Descriptor batches
// ============================================================================

/// The bound resource for a slot equals the most recent update or copy
/// targeting it, across a sequence of batches.
#[test]
fn test_descriptor_last_write_wins_across_batches() {
    init_logging();
    let cache = DescriptorSetLayoutCache::new();
    let layout = cache.get_or_create(&[DescriptorBinding {
        binding: 0,
        descriptor_type: DescriptorType::StorageBuffer,
        count: 4,
        stages: ShaderStageFlags::COMPUTE,
    }]);
    let set = DescriptorSet::new(layout.clone());
    let scratch = DescriptorSet::new(layout);

    let buffer = BufferView::Null;
    let at = |offset| DescriptorResource::Buffer {
        buffer: &buffer,
        offset,
        range: 256,
    };

    set.update(&[UpdateInfo {
        binding: 0,
        array_index: 0,
        descriptor_type: DescriptorType::StorageBuffer,
        resources: &[at(0), at(256), at(512), at(768)],
    }]);
    scratch.update(&[UpdateInfo {
        binding: 0,
        array_index: 0,
        descriptor_type: DescriptorType::StorageBuffer,
        resources: &[at(4096)],
    }]);
    // A later copy overwrites slot 2, then a later update overwrites
    // slot 3; slots 0 and 1 keep the first batch's values.
    copy_descriptor_sets(&[CopyInfo {
        source: &scratch,
        source_binding: 0,
        source_array_index: 0,
        destination: &set,
        destination_binding: 0,
        destination_array_index: 2,
        count: 1,
    }]);
    set.update(&[UpdateInfo {
        binding: 0,
        array_index: 3,
        descriptor_type: DescriptorType::StorageBuffer,
        resources: &[at(8192)],
    }]);

    let offset_of = |index| match set.written_descriptor(0, index).unwrap() {
        WrittenDescriptor::Buffer { offset, .. } => offset,
        other => panic!("unexpected descriptor {other:?}"),
    };
    assert_eq!(offset_of(0), 0);
    assert_eq!(offset_of(1), 256);
    assert_eq!(offset_of(2), 4096);
    assert_eq!(offset_of(3), 8192);
}

// ============================================================================
// Barriers
// ============================================================================

/// Any (old layout, new layout, access) combination within the layouts'
/// support sets constructs; the support tables cover every layout.
#[test]
fn test_barrier_construction_within_support_sets() {
    init_logging();
    let transitions = [
        (
            ImageLayout::Undefined,
            ImageLayout::TransferDestinationOptimal,
            AccessFlags::empty(),
            AccessFlags::TRANSFER_WRITE,
            PipelineStageFlags::TOP_OF_PIPE,
            PipelineStageFlags::TRANSFER,
        ),
        (
            ImageLayout::TransferDestinationOptimal,
            ImageLayout::ShaderReadOnlyOptimal,
            AccessFlags::TRANSFER_WRITE,
            AccessFlags::SHADER_READ,
            PipelineStageFlags::TRANSFER,
            PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (
            ImageLayout::ColorAttachmentOptimal,
            ImageLayout::PresentSource,
            AccessFlags::COLOR_ATTACHMENT_WRITE,
            AccessFlags::empty(),
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
    ];
    for (old, new, source_access, destination_access, source_stage, destination_stage) in
        transitions
    {
        assert!(supported_access_flags(old).contains(source_access));
        assert!(supported_access_flags(new).contains(destination_access));
        let barrier = ImageMemoryBarrier::new(
            ImageView::Null,
            ImageSubresourceRange::single_color(),
            old,
            new,
            source_access,
            destination_access,
            source_stage,
            destination_stage,
        );
        assert!(!barrier.is_queue_family_transfer());
    }
}

/// Access outside the layout's support set fails the construction check.
#[test]
#[should_panic]
fn test_barrier_construction_outside_support_set_panics() {
    init_logging();
    let _ = SubresourceState::new(
        ImageLayout::TransferSourceOptimal,
        PipelineStageFlags::TRANSFER,
        AccessFlags::TRANSFER_WRITE,
    );
}

// ============================================================================
// Destruction
// ============================================================================

/// `destroy` on buffers, render passes and framebuffers whose handles are
/// already null never double-frees.
#[test]
fn test_destroy_is_idempotent_across_owners() {
    init_logging();
    let pool = Arc::new(DeviceMemoryPool::new(1 << 16, 4));
    let mut buffer = Buffer::new_staging(&pool, 4096);
    buffer.destroy();
    buffer.destroy();
    assert!(!buffer.is_valid());

    let mut pass = RenderPass::new(RenderPassView::Dummy);
    pass.destroy();
    pass.destroy();
    assert!(!pass.is_valid());

    let mut framebuffer = Framebuffer::new(Vec::new(), Extent3d::new(8, 8, 1));
    framebuffer.destroy();
    framebuffer.destroy();
    assert!(!framebuffer.is_valid());
}

// ============================================================================
// Host readback
// ============================================================================

/// A recorded copy targeting [512, 2048) of a host-visible buffer is
/// observable through a host mapping of [0, 1024) once the stage's fence
/// has signaled: bytes [512, 1024) carry the written pattern.
#[test]
fn test_host_mapping_observes_prior_device_write() {
    init_logging();
    let pool = Arc::new(DeviceMemoryPool::new(1 << 16, 4));
    let mut staging = Buffer::new_staging(&pool, 1536);
    let mut readback = Buffer::new_staging(&pool, 2048);

    let pattern: Vec<u8> = (0..1536u32).map(|i| (i % 251) as u8).collect();
    staging.map_and_copy_from(&pattern, 0);

    // One readback stage records the copy into [512, 2048) and carries a
    // fence for the host side.
    let mut graph = StageGraph::new();
    let stage = graph.add_stage("readback", Default::default());
    let fence = graph.enable_present(stage);
    graph.begin_frame();

    let recorder = DummyEncoder::new();
    let encoder = CommandEncoderView::Dummy(recorder);
    encoder.begin_blit().copy_buffer(
        staging.view(),
        readback.view(),
        &[BufferCopy::new(0, 512, 1536)],
    );
    let plan = graph.plan_submission(stage).unwrap();
    assert!(plan.fence.is_some());

    fence.wait();

    let mut observed = Vec::new();
    let executed_asynchronously =
        readback.map_to_host_memory_async(0, 1024, |status, bytes, _| {
            assert_eq!(status, MapMemoryStatus::Success);
            observed.extend_from_slice(bytes);
        });
    assert!(!executed_asynchronously);
    assert_eq!(observed.len(), 1024);
    // [0, 512) was never written; [512, 1024) holds the pattern's head.
    assert!(observed[..512].iter().all(|&b| b == 0));
    assert_eq!(&observed[512..1024], &pattern[..512]);

    staging.destroy();
    readback.destroy();
}

/// The fence view handed to the submission plan shares state with the
/// fence returned to the host side.
#[test]
fn test_plan_fence_matches_host_fence() {
    init_logging();
    let mut graph = StageGraph::new();
    let stage = graph.add_stage("present", Default::default());
    let fence = graph.enable_present(stage);
    graph.begin_frame();

    let plan = graph.plan_submission(stage).unwrap();
    match plan.fence.map(|f| f.view()) {
        Some(FenceView::Dummy(_)) => {}
        other => panic!("unexpected fence view {other:?}"),
    }
    assert!(fence.is_signaled());
}
