//! Per-subresource image state tracking.
//!
//! The barrier encoder consults these tables to emit minimal layout
//! transitions: each (aspect, mip, layer) subresource carries its layout,
//! access mask, pipeline stages, owning queue family and the attachment
//! reference that last produced it.

mod barrier;

pub use barrier::{BufferMemoryBarrier, ImageMemoryBarrier};

use crate::types::{
    supported_access_flags, AccessFlags, AttachmentIndex, ImageAspectFlags, ImageLayout,
    ImageSubresourceRange, PipelineStageFlags, QueueFamilyIndex, INVALID_ATTACHMENT_INDEX,
    QUEUE_FAMILY_IGNORED,
};

/// Which snapshot of an image's states a query addresses.
///
/// `Initial` is the state the image must be in when a pass begins;
/// `Current` is the state tracking advances through as barriers record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateBucket {
    Current,
    Initial,
}

/// State of a single image subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceState {
    pub image_layout: ImageLayout,
    /// Attachment reference that last produced this subresource, if any.
    pub attachment_reference: AttachmentIndex,
    pub pipeline_stage_flags: PipelineStageFlags,
    pub access_flags: AccessFlags,
    pub queue_family_index: QueueFamilyIndex,
}

impl SubresourceState {
    /// Build a state record. The access mask must be within the layout's
    /// support set; anything else is a producer declaration bug.
    pub fn new(
        image_layout: ImageLayout,
        pipeline_stage_flags: PipelineStageFlags,
        access_flags: AccessFlags,
    ) -> Self {
        assert!(
            supported_access_flags(image_layout).contains(access_flags),
            "access flags {access_flags:?} not supported by layout {image_layout:?}"
        );
        Self {
            image_layout,
            attachment_reference: INVALID_ATTACHMENT_INDEX,
            pipeline_stage_flags,
            access_flags,
            queue_family_index: QUEUE_FAMILY_IGNORED,
        }
    }

    pub fn with_attachment_reference(mut self, attachment_reference: AttachmentIndex) -> Self {
        self.attachment_reference = attachment_reference;
        self
    }

    pub fn with_queue_family_index(mut self, queue_family_index: QueueFamilyIndex) -> Self {
        self.queue_family_index = queue_family_index;
        self
    }
}

impl Default for SubresourceState {
    fn default() -> Self {
        Self {
            image_layout: ImageLayout::Undefined,
            attachment_reference: INVALID_ATTACHMENT_INDEX,
            pipeline_stage_flags: PipelineStageFlags::TOP_OF_PIPE,
            access_flags: AccessFlags::empty(),
            queue_family_index: QUEUE_FAMILY_IGNORED,
        }
    }
}

/// State table of one image: a record per (aspect, mip, layer) in two
/// buckets. Rows are laid out aspect-major, then mip, then layer.
#[derive(Debug, Clone)]
pub struct SubresourceStates {
    aspects: ImageAspectFlags,
    mip_levels: u32,
    array_layers: u32,
    current: Vec<SubresourceState>,
    initial: Vec<SubresourceState>,
}

impl SubresourceStates {
    pub fn new(aspects: ImageAspectFlags, mip_levels: u32, array_layers: u32) -> Self {
        assert!(mip_levels > 0 && array_layers > 0 && !aspects.is_empty());
        let count = aspects.plane_count() as usize * mip_levels as usize * array_layers as usize;
        Self {
            aspects,
            mip_levels,
            array_layers,
            current: vec![SubresourceState::default(); count],
            initial: vec![SubresourceState::default(); count],
        }
    }

    pub fn aspects(&self) -> ImageAspectFlags {
        self.aspects
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// Full range of the image this table tracks.
    pub fn full_range(&self) -> ImageSubresourceRange {
        ImageSubresourceRange::new(
            self.aspects,
            crate::types::MipRange::new(0, self.mip_levels),
            crate::types::ArrayRange::new(0, self.array_layers),
        )
    }

    fn plane_index(&self, aspect: ImageAspectFlags) -> usize {
        debug_assert_eq!(aspect.plane_count(), 1);
        debug_assert!(self.aspects.contains(aspect));
        // Position of this aspect among the tracked planes, in bit order.
        (self.aspects.bits() & (aspect.bits() - 1)).count_ones() as usize
    }

    fn record_index(&self, aspect: ImageAspectFlags, mip_level: u32, array_layer: u32) -> usize {
        debug_assert!(mip_level < self.mip_levels && array_layer < self.array_layers);
        (self.plane_index(aspect) * self.mip_levels as usize + mip_level as usize)
            * self.array_layers as usize
            + array_layer as usize
    }

    fn bucket(&self, bucket: StateBucket) -> &[SubresourceState] {
        match bucket {
            StateBucket::Current => &self.current,
            StateBucket::Initial => &self.initial,
        }
    }

    fn bucket_mut(&mut self, bucket: StateBucket) -> &mut [SubresourceState] {
        match bucket {
            StateBucket::Current => &mut self.current,
            StateBucket::Initial => &mut self.initial,
        }
    }

    /// State of one subresource. `aspect` must name exactly one plane.
    pub fn get_subresource_state(
        &self,
        bucket: StateBucket,
        aspect: ImageAspectFlags,
        mip_level: u32,
        array_layer: u32,
    ) -> &SubresourceState {
        &self.bucket(bucket)[self.record_index(aspect, mip_level, array_layer)]
    }

    /// The single state shared by every subresource in `range`, or `None`
    /// when the range is not uniform. Callers needing per-run access go
    /// through [`visit_uniform_subresource_ranges`].
    ///
    /// [`visit_uniform_subresource_ranges`]: Self::visit_uniform_subresource_ranges
    pub fn get_uniform_subresource_state(
        &self,
        bucket: StateBucket,
        range: &ImageSubresourceRange,
    ) -> Option<SubresourceState> {
        debug_assert!(self.full_range().contains(range));
        let mut uniform: Option<SubresourceState> = None;
        for aspect in range.aspects.iter() {
            for mip_level in range.mip_range.base_level..range.mip_range.end() {
                for array_layer in range.array_range.base_layer..range.array_range.end() {
                    let state = self.get_subresource_state(bucket, aspect, mip_level, array_layer);
                    match uniform {
                        None => uniform = Some(*state),
                        Some(seen) if seen == *state => {}
                        Some(_) => return None,
                    }
                }
            }
        }
        uniform
    }

    /// Overwrite every subresource in `range` with `state`.
    pub fn set_subresource_state(
        &mut self,
        bucket: StateBucket,
        range: &ImageSubresourceRange,
        state: SubresourceState,
    ) {
        debug_assert!(self.full_range().contains(range));
        for aspect in range.aspects.iter() {
            for mip_level in range.mip_range.base_level..range.mip_range.end() {
                for array_layer in range.array_range.base_layer..range.array_range.end() {
                    let index = self.record_index(aspect, mip_level, array_layer);
                    self.bucket_mut(bucket)[index] = state;
                }
            }
        }
    }

    /// Walk `range` and invoke `callback` once per maximal sub-range of
    /// identical state. Runs coalesce over layers first, then over whole
    /// mips whose layer range matches, aspect by aspect.
    pub fn visit_uniform_subresource_ranges(
        &self,
        bucket: StateBucket,
        range: &ImageSubresourceRange,
        mut callback: impl FnMut(&ImageSubresourceRange, &SubresourceState),
    ) {
        debug_assert!(self.full_range().contains(range));
        for aspect in range.aspects.iter() {
            // Pending run of whole mips sharing one uniform state.
            let mut pending: Option<(u32, u32, SubresourceState)> = None;
            for mip_level in range.mip_range.base_level..range.mip_range.end() {
                let mip_range = ImageSubresourceRange::new(
                    aspect,
                    crate::types::MipRange::single(mip_level),
                    range.array_range,
                );
                match self.get_uniform_subresource_state(bucket, &mip_range) {
                    Some(state) => match pending {
                        Some((base, count, seen)) if seen == state => {
                            pending = Some((base, count + 1, seen));
                        }
                        _ => {
                            self.flush_pending(aspect, range, pending.take(), &mut callback);
                            pending = Some((mip_level, 1, state));
                        }
                    },
                    None => {
                        self.flush_pending(aspect, range, pending.take(), &mut callback);
                        self.visit_layer_runs(bucket, aspect, mip_level, range, &mut callback);
                    }
                }
            }
            self.flush_pending(aspect, range, pending.take(), &mut callback);
        }
    }

    fn flush_pending(
        &self,
        aspect: ImageAspectFlags,
        range: &ImageSubresourceRange,
        pending: Option<(u32, u32, SubresourceState)>,
        callback: &mut impl FnMut(&ImageSubresourceRange, &SubresourceState),
    ) {
        if let Some((base_level, level_count, state)) = pending {
            let run = ImageSubresourceRange::new(
                aspect,
                crate::types::MipRange::new(base_level, level_count),
                range.array_range,
            );
            callback(&run, &state);
        }
    }

    fn visit_layer_runs(
        &self,
        bucket: StateBucket,
        aspect: ImageAspectFlags,
        mip_level: u32,
        range: &ImageSubresourceRange,
        callback: &mut impl FnMut(&ImageSubresourceRange, &SubresourceState),
    ) {
        let mut run_base = range.array_range.base_layer;
        let mut run_state = *self.get_subresource_state(bucket, aspect, mip_level, run_base);
        for array_layer in range.array_range.base_layer + 1..range.array_range.end() {
            let state = self.get_subresource_state(bucket, aspect, mip_level, array_layer);
            if *state != run_state {
                let run = ImageSubresourceRange::new(
                    aspect,
                    crate::types::MipRange::single(mip_level),
                    crate::types::ArrayRange::new(run_base, array_layer - run_base),
                );
                callback(&run, &run_state);
                run_base = array_layer;
                run_state = *state;
            }
        }
        let run = ImageSubresourceRange::new(
            aspect,
            crate::types::MipRange::single(mip_level),
            crate::types::ArrayRange::new(run_base, range.array_range.end() - run_base),
        );
        callback(&run, &run_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArrayRange, MipRange};

    fn color_range(mips: MipRange, layers: ArrayRange) -> ImageSubresourceRange {
        ImageSubresourceRange::new(ImageAspectFlags::COLOR, mips, layers)
    }

    #[test]
    fn test_fresh_states_are_undefined_and_uniform() {
        let states = SubresourceStates::new(ImageAspectFlags::COLOR, 4, 2);
        let uniform = states
            .get_uniform_subresource_state(StateBucket::Current, &states.full_range())
            .unwrap();
        assert_eq!(uniform.image_layout, ImageLayout::Undefined);
    }

    #[test]
    fn test_set_and_query_uniform() {
        let mut states = SubresourceStates::new(ImageAspectFlags::COLOR, 4, 4);
        let written = SubresourceState::new(
            ImageLayout::TransferDestinationOptimal,
            PipelineStageFlags::TRANSFER,
            AccessFlags::TRANSFER_WRITE,
        );
        let partial = color_range(MipRange::new(0, 2), ArrayRange::new(0, 4));
        states.set_subresource_state(StateBucket::Current, &partial, written);

        assert_eq!(
            states.get_uniform_subresource_state(StateBucket::Current, &partial),
            Some(written)
        );
        // Mixed range is not uniform.
        assert_eq!(
            states.get_uniform_subresource_state(StateBucket::Current, &states.full_range()),
            None
        );
        // The untouched bucket is unaffected.
        assert_eq!(
            states
                .get_uniform_subresource_state(StateBucket::Initial, &states.full_range())
                .map(|s| s.image_layout),
            Some(ImageLayout::Undefined)
        );
    }

    #[test]
    fn test_visitor_coalesces_mips() {
        let mut states = SubresourceStates::new(ImageAspectFlags::COLOR, 4, 1);
        let sampled = SubresourceState::new(
            ImageLayout::ShaderReadOnlyOptimal,
            PipelineStageFlags::FRAGMENT_SHADER,
            AccessFlags::SHADER_READ,
        );
        states.set_subresource_state(
            StateBucket::Current,
            &color_range(MipRange::new(1, 2), ArrayRange::single(0)),
            sampled,
        );

        let mut runs = Vec::new();
        states.visit_uniform_subresource_ranges(
            StateBucket::Current,
            &states.full_range(),
            |range, state| runs.push((*range, *state)),
        );
        // mip 0 (undefined), mips 1-2 (sampled), mip 3 (undefined)
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1].0.mip_range, MipRange::new(1, 2));
        assert_eq!(runs[1].1, sampled);
    }

    #[test]
    fn test_visitor_splits_layer_runs() {
        let mut states = SubresourceStates::new(ImageAspectFlags::COLOR, 1, 4);
        let written = SubresourceState::new(
            ImageLayout::ColorAttachmentOptimal,
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            AccessFlags::COLOR_ATTACHMENT_WRITE,
        );
        states.set_subresource_state(
            StateBucket::Current,
            &color_range(MipRange::single(0), ArrayRange::new(1, 2)),
            written,
        );

        let mut runs = Vec::new();
        states.visit_uniform_subresource_ranges(
            StateBucket::Current,
            &states.full_range(),
            |range, state| runs.push((range.array_range, state.image_layout)),
        );
        assert_eq!(
            runs,
            vec![
                (ArrayRange::new(0, 1), ImageLayout::Undefined),
                (ArrayRange::new(1, 2), ImageLayout::ColorAttachmentOptimal),
                (ArrayRange::new(3, 1), ImageLayout::Undefined),
            ]
        );
    }

    #[test]
    fn test_depth_stencil_planes_tracked_separately() {
        let mut states = SubresourceStates::new(ImageAspectFlags::DEPTH_STENCIL, 1, 1);
        let depth_state = SubresourceState::new(
            ImageLayout::DepthStencilAttachmentOptimal,
            PipelineStageFlags::LATE_FRAGMENT_TESTS,
            AccessFlags::DEPTH_STENCIL_WRITE,
        );
        states.set_subresource_state(
            StateBucket::Current,
            &ImageSubresourceRange::new(
                ImageAspectFlags::DEPTH,
                MipRange::single(0),
                ArrayRange::single(0),
            ),
            depth_state,
        );
        assert_eq!(
            states
                .get_subresource_state(StateBucket::Current, ImageAspectFlags::DEPTH, 0, 0)
                .image_layout,
            ImageLayout::DepthStencilAttachmentOptimal
        );
        assert_eq!(
            states
                .get_subresource_state(StateBucket::Current, ImageAspectFlags::STENCIL, 0, 0)
                .image_layout,
            ImageLayout::Undefined
        );
    }

    #[test]
    #[should_panic]
    fn test_unsupported_access_for_layout_asserts() {
        let _ = SubresourceState::new(
            ImageLayout::ShaderReadOnlyOptimal,
            PipelineStageFlags::FRAGMENT_SHADER,
            AccessFlags::COLOR_ATTACHMENT_WRITE,
        );
    }
}
