//! Vulkan conversions and call-through helpers (ash).

use ash::vk;

use crate::state::{BufferMemoryBarrier, ImageMemoryBarrier};
use crate::types::{
    AccessFlags, BufferCopy, BufferImageCopy, Extent3d, ImageAspectFlags, ImageBlit, ImageCopy,
    ImageLayout, ImageSubresourceRange, Offset3d, PipelineStageFlags, SubresourceLayers,
};

pub fn image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachmentOptimal => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        ImageLayout::DepthStencilReadOnlyOptimal => {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        }
        ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSourceOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDestinationOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSource => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn access_flags(flags: AccessFlags) -> vk::AccessFlags {
    let mut result = vk::AccessFlags::empty();
    if flags.contains(AccessFlags::INDIRECT_COMMAND_READ) {
        result |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if flags.contains(AccessFlags::INDEX_READ) {
        result |= vk::AccessFlags::INDEX_READ;
    }
    if flags.contains(AccessFlags::VERTEX_ATTRIBUTE_READ) {
        result |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if flags.contains(AccessFlags::UNIFORM_READ) {
        result |= vk::AccessFlags::UNIFORM_READ;
    }
    if flags.contains(AccessFlags::INPUT_ATTACHMENT_READ) {
        result |= vk::AccessFlags::INPUT_ATTACHMENT_READ;
    }
    if flags.contains(AccessFlags::SHADER_READ) {
        result |= vk::AccessFlags::SHADER_READ;
    }
    if flags.contains(AccessFlags::SHADER_WRITE) {
        result |= vk::AccessFlags::SHADER_WRITE;
    }
    if flags.contains(AccessFlags::COLOR_ATTACHMENT_READ) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
    }
    if flags.contains(AccessFlags::COLOR_ATTACHMENT_WRITE) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if flags.contains(AccessFlags::DEPTH_STENCIL_READ) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if flags.contains(AccessFlags::DEPTH_STENCIL_WRITE) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if flags.contains(AccessFlags::TRANSFER_READ) {
        result |= vk::AccessFlags::TRANSFER_READ;
    }
    if flags.contains(AccessFlags::TRANSFER_WRITE) {
        result |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if flags.contains(AccessFlags::HOST_READ) {
        result |= vk::AccessFlags::HOST_READ;
    }
    if flags.contains(AccessFlags::HOST_WRITE) {
        result |= vk::AccessFlags::HOST_WRITE;
    }
    if flags.contains(AccessFlags::ACCELERATION_STRUCTURE_READ) {
        result |= vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR;
    }
    if flags.contains(AccessFlags::ACCELERATION_STRUCTURE_WRITE) {
        result |= vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR;
    }
    result
}

pub fn pipeline_stage_flags(flags: PipelineStageFlags) -> vk::PipelineStageFlags {
    let mut result = vk::PipelineStageFlags::empty();
    if flags.contains(PipelineStageFlags::TOP_OF_PIPE) {
        result |= vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    if flags.contains(PipelineStageFlags::DRAW_INDIRECT) {
        result |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if flags.contains(PipelineStageFlags::VERTEX_INPUT) {
        result |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if flags.contains(PipelineStageFlags::VERTEX_SHADER) {
        result |= vk::PipelineStageFlags::VERTEX_SHADER;
    }
    if flags.contains(PipelineStageFlags::GEOMETRY_SHADER) {
        result |= vk::PipelineStageFlags::GEOMETRY_SHADER;
    }
    if flags.contains(PipelineStageFlags::FRAGMENT_SHADER) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if flags.contains(PipelineStageFlags::EARLY_FRAGMENT_TESTS) {
        result |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    }
    if flags.contains(PipelineStageFlags::LATE_FRAGMENT_TESTS) {
        result |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if flags.contains(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT) {
        result |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if flags.contains(PipelineStageFlags::COMPUTE_SHADER) {
        result |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if flags.contains(PipelineStageFlags::TRANSFER) {
        result |= vk::PipelineStageFlags::TRANSFER;
    }
    if flags.contains(PipelineStageFlags::HOST) {
        result |= vk::PipelineStageFlags::HOST;
    }
    if flags.contains(PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD) {
        result |= vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR;
    }
    if flags.contains(PipelineStageFlags::RAY_TRACING_SHADER) {
        result |= vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
    }
    if flags.contains(PipelineStageFlags::BOTTOM_OF_PIPE) {
        result |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    result
}

pub fn image_aspect_flags(aspects: ImageAspectFlags) -> vk::ImageAspectFlags {
    let mut result = vk::ImageAspectFlags::empty();
    if aspects.contains(ImageAspectFlags::COLOR) {
        result |= vk::ImageAspectFlags::COLOR;
    }
    if aspects.contains(ImageAspectFlags::DEPTH) {
        result |= vk::ImageAspectFlags::DEPTH;
    }
    if aspects.contains(ImageAspectFlags::STENCIL) {
        result |= vk::ImageAspectFlags::STENCIL;
    }
    result
}

pub fn image_subresource_range(range: &ImageSubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(image_aspect_flags(range.aspects))
        .base_mip_level(range.mip_range.base_level)
        .level_count(range.mip_range.level_count)
        .base_array_layer(range.array_range.base_layer)
        .layer_count(range.array_range.layer_count)
}

pub fn subresource_layers(layers: &SubresourceLayers) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(image_aspect_flags(layers.aspects))
        .mip_level(layers.mip_level)
        .base_array_layer(layers.array_range.base_layer)
        .layer_count(layers.array_range.layer_count)
}

pub fn offset_3d(offset: Offset3d) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x,
        y: offset.y,
        z: offset.z,
    }
}

pub fn extent_3d(extent: Extent3d) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}

pub fn buffer_copy(region: &BufferCopy) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: region.source_offset,
        dst_offset: region.destination_offset,
        size: region.size,
    }
}

pub fn image_copy(region: &ImageCopy) -> vk::ImageCopy {
    vk::ImageCopy {
        src_subresource: subresource_layers(&region.source_subresource),
        src_offset: offset_3d(region.source_offset),
        dst_subresource: subresource_layers(&region.destination_subresource),
        dst_offset: offset_3d(region.destination_offset),
        extent: extent_3d(region.extent),
    }
}

pub fn buffer_image_copy(region: &BufferImageCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        buffer_row_length: region.buffer_row_length,
        buffer_image_height: region.buffer_image_height,
        image_subresource: subresource_layers(&region.image_subresource),
        image_offset: offset_3d(region.image_offset),
        image_extent: extent_3d(region.image_extent),
    }
}

pub fn image_blit(region: &ImageBlit) -> vk::ImageBlit {
    vk::ImageBlit {
        src_subresource: subresource_layers(&region.source_subresource),
        src_offsets: [
            offset_3d(region.source_bounds[0]),
            offset_3d(region.source_bounds[1]),
        ],
        dst_subresource: subresource_layers(&region.destination_subresource),
        dst_offsets: [
            offset_3d(region.destination_bounds[0]),
            offset_3d(region.destination_bounds[1]),
        ],
    }
}

fn image_memory_barrier(barrier: &ImageMemoryBarrier) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .image(barrier.image.vulkan())
        .subresource_range(image_subresource_range(&barrier.subresource_range))
        .old_layout(image_layout(barrier.old_layout))
        .new_layout(image_layout(barrier.new_layout))
        .src_access_mask(access_flags(barrier.source_access_flags))
        .dst_access_mask(access_flags(barrier.destination_access_flags))
        .src_queue_family_index(barrier.source_queue_family_index)
        .dst_queue_family_index(barrier.destination_queue_family_index)
}

fn buffer_memory_barrier(barrier: &BufferMemoryBarrier) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier::default()
        .buffer(barrier.buffer.vulkan())
        .offset(barrier.offset)
        .size(barrier.size)
        .src_access_mask(access_flags(barrier.source_access_flags))
        .dst_access_mask(access_flags(barrier.destination_access_flags))
        .src_queue_family_index(barrier.source_queue_family_index)
        .dst_queue_family_index(barrier.destination_queue_family_index)
}

/// Flush one batch of barriers as a single `vkCmdPipelineBarrier`.
pub fn cmd_pipeline_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image_barriers: &[ImageMemoryBarrier],
    buffer_barriers: &[BufferMemoryBarrier],
) {
    let mut source_stages = PipelineStageFlags::empty();
    let mut destination_stages = PipelineStageFlags::empty();
    for barrier in image_barriers {
        source_stages |= barrier.source_pipeline_stage_flags;
        destination_stages |= barrier.destination_pipeline_stage_flags;
    }
    for barrier in buffer_barriers {
        source_stages |= barrier.source_pipeline_stage_flags;
        destination_stages |= barrier.destination_pipeline_stage_flags;
    }
    if source_stages.is_empty() {
        source_stages = PipelineStageFlags::TOP_OF_PIPE;
    }
    if destination_stages.is_empty() {
        destination_stages = PipelineStageFlags::BOTTOM_OF_PIPE;
    }

    let vk_image_barriers: Vec<_> = image_barriers.iter().map(image_memory_barrier).collect();
    let vk_buffer_barriers: Vec<_> = buffer_barriers.iter().map(buffer_memory_barrier).collect();
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            pipeline_stage_flags(source_stages),
            pipeline_stage_flags(destination_stages),
            vk::DependencyFlags::empty(),
            &[],
            &vk_buffer_barriers,
            &vk_image_barriers,
        );
    }
}
