//! Per-purpose command encoders.
//!
//! A [`CommandEncoderView`] opens compute, blit, barrier and
//! acceleration-structure encoders over the same native command buffer.
//! Every operation is a validated call-through; synchronization between
//! commands is the caller's job.

use crate::backend::{dummy::RecordedCommand, AccelerationStructureView, BufferView, ImageView};
use crate::backend::{CommandEncoderView, PipelineView};
use crate::descriptors::DescriptorSet;
use crate::state::{
    BufferMemoryBarrier, ImageMemoryBarrier, StateBucket, SubresourceState, SubresourceStates,
};
use crate::types::{BufferCopy, BufferImageCopy, ImageBlit, ImageCopy, ImageSubresourceRange};

impl CommandEncoderView {
    pub fn begin_compute(&self) -> ComputeCommandEncoder {
        debug_assert!(self.is_valid());
        ComputeCommandEncoder {
            encoder: self.clone(),
            pipeline: PipelineView::Null,
        }
    }

    pub fn begin_blit(&self) -> BlitCommandEncoder {
        debug_assert!(self.is_valid());
        BlitCommandEncoder {
            encoder: self.clone(),
        }
    }

    pub fn begin_barrier(&self) -> BarrierCommandEncoder {
        debug_assert!(self.is_valid());
        BarrierCommandEncoder {
            encoder: self.clone(),
            image_barriers: Vec::new(),
            buffer_barriers: Vec::new(),
        }
    }

    pub fn begin_acceleration_structure(&self) -> AccelerationStructureCommandEncoder {
        debug_assert!(self.is_valid());
        AccelerationStructureCommandEncoder {
            encoder: self.clone(),
        }
    }

    /// Label this encoder in capture tools. No-op in release.
    pub fn set_debug_name(&self, name: &str) {
        if !cfg!(debug_assertions) {
            return;
        }
        match self {
            Self::Dummy(encoder) => encoder.push(RecordedCommand::SetDebugName {
                name: name.to_string(),
            }),
            _ => {}
        }
    }

    /// Open a named marker region for capture tools. No-op in release.
    pub fn begin_debug_marker(&self, label: &str) {
        if !cfg!(debug_assertions) {
            return;
        }
        match self {
            Self::Dummy(encoder) => encoder.push(RecordedCommand::BeginDebugMarker {
                label: label.to_string(),
            }),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(encoder) => encoder.lock().push_debug_group(label),
            _ => {}
        }
    }

    /// Close the innermost marker region. No-op in release.
    pub fn end_debug_marker(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        match self {
            Self::Dummy(encoder) => encoder.push(RecordedCommand::EndDebugMarker),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(encoder) => encoder.lock().pop_debug_group(),
            _ => {}
        }
    }
}

/// Encoder for compute dispatches.
pub struct ComputeCommandEncoder {
    encoder: CommandEncoderView,
    pipeline: PipelineView,
}

impl ComputeCommandEncoder {
    pub fn bind_pipeline(&mut self, pipeline: &PipelineView) {
        debug_assert!(pipeline.is_valid());
        self.pipeline = pipeline.clone();
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                let pipeline_id = match pipeline {
                    PipelineView::Dummy { id } => *id,
                    _ => 0,
                };
                encoder.push(RecordedCommand::BindComputePipeline { pipeline_id });
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => {
                if let PipelineView::Vulkan(pipeline) = pipeline {
                    unsafe {
                        device.cmd_bind_pipeline(
                            *command_buffer,
                            ash::vk::PipelineBindPoint::COMPUTE,
                            *pipeline,
                        );
                    }
                }
            }
            _ => {}
        }
    }

    pub fn bound_pipeline(&self) -> &PipelineView {
        &self.pipeline
    }

    /// Bind `sets` starting at `first_set`. Native descriptor tables are
    /// bound by the queue layer that plays back the recording; here the
    /// binding is recorded only.
    pub fn bind_descriptor_sets(&self, first_set: u32, sets: &[&DescriptorSet]) {
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::BindDescriptorSets {
                    first_set,
                    set_count: sets.len(),
                });
            }
            // wgpu binds group tables when the pass opens; the sets'
            // native tables are picked up at dispatch.
            #[cfg(feature = "wgpu-backend")]
            CommandEncoderView::Wgpu(_) => {
                log::trace!("deferring {} descriptor sets to pass begin", sets.len());
            }
            _ => {
                log::warn!("descriptor set binding is not wired on this backend");
            }
        }
    }

    pub fn dispatch(&self, groups: [u32; 3]) {
        debug_assert!(
            groups.iter().all(|&count| count > 0),
            "dispatch with zero group count"
        );
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::Dispatch { groups });
            }
            #[cfg(feature = "wgpu-backend")]
            CommandEncoderView::Wgpu(encoder) => {
                let mut encoder = encoder.lock();
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
                if let PipelineView::Wgpu(pipeline) = &self.pipeline {
                    pass.set_pipeline(pipeline);
                }
                pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => unsafe {
                device.cmd_dispatch(*command_buffer, groups[0], groups[1], groups[2]);
            },
            CommandEncoderView::Null => {}
        }
    }

    pub fn set_debug_name(&self, name: &str) {
        self.encoder.set_debug_name(name);
    }

    pub fn begin_debug_marker(&self, label: &str) {
        self.encoder.begin_debug_marker(label);
    }

    pub fn end_debug_marker(&self) {
        self.encoder.end_debug_marker();
    }

    pub fn dispatch_indirect(&self, buffer: &BufferView, offset: u64) {
        debug_assert!(buffer.is_valid());
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::DispatchIndirect { offset });
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => unsafe {
                device.cmd_dispatch_indirect(*command_buffer, buffer.vulkan(), offset);
            },
            _ => {}
        }
    }
}

/// Encoder for copies and blits.
pub struct BlitCommandEncoder {
    encoder: CommandEncoderView,
}

impl BlitCommandEncoder {
    pub fn copy_buffer(&self, source: &BufferView, destination: &BufferView, regions: &[BufferCopy]) {
        debug_assert!(source.is_valid() && destination.is_valid());
        debug_assert!(!regions.is_empty());
        match (&self.encoder, source, destination) {
            (CommandEncoderView::Dummy(encoder), BufferView::Dummy(src), BufferView::Dummy(dst)) => {
                // Host-memory copies execute at record time.
                for region in regions {
                    debug_assert!(region.source_offset + region.size <= src.size());
                    debug_assert!(region.destination_offset + region.size <= dst.size());
                    crate::backend::dummy::execute_buffer_copy(src, dst, region);
                }
                encoder.push(RecordedCommand::CopyBuffer {
                    regions: regions.to_vec(),
                });
            }
            #[cfg(feature = "wgpu-backend")]
            (CommandEncoderView::Wgpu(encoder), BufferView::Wgpu(src), BufferView::Wgpu(dst)) => {
                crate::backend::wgpu_backend::copy_buffer_regions(
                    &mut encoder.lock(),
                    src,
                    dst,
                    regions,
                );
            }
            #[cfg(feature = "vulkan-backend")]
            (
                CommandEncoderView::Vulkan {
                    device,
                    command_buffer,
                },
                _,
                _,
            ) => {
                let vk_regions: Vec<_> = regions
                    .iter()
                    .map(crate::backend::vulkan::buffer_copy)
                    .collect();
                unsafe {
                    device.cmd_copy_buffer(
                        *command_buffer,
                        source.vulkan(),
                        destination.vulkan(),
                        &vk_regions,
                    );
                }
            }
            _ => {}
        }
    }

    pub fn copy_image(&self, source: &ImageView, destination: &ImageView, regions: &[ImageCopy]) {
        debug_assert!(source.is_valid() && destination.is_valid());
        debug_assert!(regions.iter().all(|r| !r.extent.is_empty()));
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::CopyImage {
                    regions: regions.to_vec(),
                });
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => {
                let vk_regions: Vec<_> = regions
                    .iter()
                    .map(crate::backend::vulkan::image_copy)
                    .collect();
                unsafe {
                    device.cmd_copy_image(
                        *command_buffer,
                        source.vulkan(),
                        ash::vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        destination.vulkan(),
                        ash::vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &vk_regions,
                    );
                }
            }
            _ => {}
        }
    }

    pub fn copy_buffer_to_image(
        &self,
        source: &BufferView,
        destination: &ImageView,
        regions: &[BufferImageCopy],
    ) {
        debug_assert!(source.is_valid() && destination.is_valid());
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::CopyBufferToImage {
                    regions: regions.to_vec(),
                });
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => {
                let vk_regions: Vec<_> = regions
                    .iter()
                    .map(crate::backend::vulkan::buffer_image_copy)
                    .collect();
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        *command_buffer,
                        source.vulkan(),
                        destination.vulkan(),
                        ash::vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &vk_regions,
                    );
                }
            }
            _ => {}
        }
    }

    pub fn copy_image_to_buffer(
        &self,
        source: &ImageView,
        destination: &BufferView,
        regions: &[BufferImageCopy],
    ) {
        debug_assert!(source.is_valid() && destination.is_valid());
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::CopyImageToBuffer {
                    regions: regions.to_vec(),
                });
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => {
                let vk_regions: Vec<_> = regions
                    .iter()
                    .map(crate::backend::vulkan::buffer_image_copy)
                    .collect();
                unsafe {
                    device.cmd_copy_image_to_buffer(
                        *command_buffer,
                        source.vulkan(),
                        ash::vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        destination.vulkan(),
                        &vk_regions,
                    );
                }
            }
            _ => {}
        }
    }

    pub fn set_debug_name(&self, name: &str) {
        self.encoder.set_debug_name(name);
    }

    pub fn begin_debug_marker(&self, label: &str) {
        self.encoder.begin_debug_marker(label);
    }

    pub fn end_debug_marker(&self) {
        self.encoder.end_debug_marker();
    }

    pub fn blit_image(&self, source: &ImageView, destination: &ImageView, regions: &[ImageBlit]) {
        debug_assert!(source.is_valid() && destination.is_valid());
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::BlitImage {
                    regions: regions.to_vec(),
                });
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => {
                let vk_regions: Vec<_> = regions
                    .iter()
                    .map(crate::backend::vulkan::image_blit)
                    .collect();
                unsafe {
                    device.cmd_blit_image(
                        *command_buffer,
                        source.vulkan(),
                        ash::vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        destination.vulkan(),
                        ash::vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &vk_regions,
                        ash::vk::Filter::LINEAR,
                    );
                }
            }
            _ => {}
        }
    }
}

/// Encoder batching barriers into one native command.
///
/// Barriers accumulate until [`encode`] (or drop) flushes the whole
/// batch at once.
///
/// [`encode`]: Self::encode
pub struct BarrierCommandEncoder {
    encoder: CommandEncoderView,
    image_barriers: Vec<ImageMemoryBarrier>,
    buffer_barriers: Vec<BufferMemoryBarrier>,
}

impl BarrierCommandEncoder {
    pub fn image_barrier(&mut self, barrier: ImageMemoryBarrier) {
        self.image_barriers.push(barrier);
    }

    pub fn buffer_barrier(&mut self, barrier: BufferMemoryBarrier) {
        self.buffer_barriers.push(barrier);
    }

    pub fn pending_barrier_count(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    /// Transition `range` of `image` to `new_state`, consulting the state
    /// table and emitting one barrier per uniform run that is not already
    /// there. The table is advanced to `new_state` over the whole range.
    pub fn transition_image_layout(
        &mut self,
        image: &ImageView,
        states: &mut SubresourceStates,
        range: &ImageSubresourceRange,
        new_state: SubresourceState,
    ) {
        let mut runs = Vec::new();
        states.visit_uniform_subresource_ranges(StateBucket::Current, range, |run, state| {
            runs.push((*run, *state));
        });
        for (run, state) in runs {
            // A prior write is a hazard even without a layout change, so
            // a run only skips when nothing about its state moves and
            // its access was read-only.
            let already_there = state.image_layout == new_state.image_layout
                && state.queue_family_index == new_state.queue_family_index
                && state.access_flags == new_state.access_flags
                && state.pipeline_stage_flags == new_state.pipeline_stage_flags
                && !state.access_flags.has_writes();
            if already_there {
                continue;
            }
            self.image_barriers.push(
                ImageMemoryBarrier::new(
                    image.clone(),
                    run,
                    state.image_layout,
                    new_state.image_layout,
                    state.access_flags,
                    new_state.access_flags,
                    state.pipeline_stage_flags,
                    new_state.pipeline_stage_flags,
                )
                .with_queue_family_transfer(
                    state.queue_family_index,
                    new_state.queue_family_index,
                ),
            );
        }
        states.set_subresource_state(StateBucket::Current, range, new_state);
    }

    pub fn set_debug_name(&self, name: &str) {
        self.encoder.set_debug_name(name);
    }

    pub fn begin_debug_marker(&self, label: &str) {
        self.encoder.begin_debug_marker(label);
    }

    pub fn end_debug_marker(&self) {
        self.encoder.end_debug_marker();
    }

    /// Flush the batch as a single native barrier command.
    pub fn encode(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if self.image_barriers.is_empty() && self.buffer_barriers.is_empty() {
            return;
        }
        log::trace!(
            "flushing barrier batch: {} image, {} buffer",
            self.image_barriers.len(),
            self.buffer_barriers.len()
        );
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::PipelineBarrier {
                    image_barriers: std::mem::take(&mut self.image_barriers),
                    buffer_barriers: std::mem::take(&mut self.buffer_barriers),
                });
            }
            // wgpu resolves layouts and hazards internally; the state
            // tables were already advanced when the barriers were built.
            #[cfg(feature = "wgpu-backend")]
            CommandEncoderView::Wgpu(_) => {
                self.image_barriers.clear();
                self.buffer_barriers.clear();
            }
            #[cfg(feature = "vulkan-backend")]
            CommandEncoderView::Vulkan {
                device,
                command_buffer,
            } => {
                crate::backend::vulkan::cmd_pipeline_barrier(
                    device,
                    *command_buffer,
                    &self.image_barriers,
                    &self.buffer_barriers,
                );
                self.image_barriers.clear();
                self.buffer_barriers.clear();
            }
            CommandEncoderView::Null => {}
        }
    }
}

impl Drop for BarrierCommandEncoder {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Encoder for acceleration structure builds.
pub struct AccelerationStructureCommandEncoder {
    encoder: CommandEncoderView,
}

impl AccelerationStructureCommandEncoder {
    pub fn set_debug_name(&self, name: &str) {
        self.encoder.set_debug_name(name);
    }

    pub fn begin_debug_marker(&self, label: &str) {
        self.encoder.begin_debug_marker(label);
    }

    pub fn end_debug_marker(&self) {
        self.encoder.end_debug_marker();
    }

    /// Record a build of `destination` with `primitive_count` primitives,
    /// using `scratch` as build scratch memory.
    ///
    /// Only the recording backend captures builds today; native backends
    /// log and skip until their build paths are wired.
    pub fn build(
        &self,
        destination: &AccelerationStructureView,
        primitive_count: u32,
        scratch: &BufferView,
    ) {
        debug_assert!(destination.is_valid());
        debug_assert!(scratch.is_valid());
        match &self.encoder {
            CommandEncoderView::Dummy(encoder) => {
                encoder.push(RecordedCommand::BuildAccelerationStructure { primitive_count });
            }
            _ => {
                log::warn!("acceleration structure build is not wired on this backend");
            }
        }
    }
}
