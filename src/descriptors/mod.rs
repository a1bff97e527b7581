//! Descriptor set layouts, sets, and batched updates.
//!
//! Layouts are cached and shared; sets hold one slot per (binding, array
//! index) and are written through batched [`update`] and [`copy`] calls.
//! Entries apply in batch order, so the last write to a slot wins.
//!
//! [`update`]: DescriptorSet::update
//! [`copy`]: copy_descriptor_sets

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};

use crate::backend::{
    AccelerationStructureView, BufferView, ImageMappingView, SamplerView,
};
use crate::types::ImageLayout;

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const RAY_TRACING = 1 << 3;
    }
}

/// Class of resource a binding accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    SampledImage,
    CombinedImageSampler,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
    AccelerationStructure,
}

/// One binding slot in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Array size of the binding.
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Ordered list of bindings shared by compatible sets.
#[derive(Debug, PartialEq, Eq)]
pub struct DescriptorSetLayout {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    fn new(mut bindings: Vec<DescriptorBinding>) -> Self {
        bindings.sort_by_key(|b| b.binding);
        debug_assert!(
            bindings.windows(2).all(|w| w[0].binding < w[1].binding),
            "duplicate binding index in layout"
        );
        Self { bindings }
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }
}

/// Cache of layouts keyed by their binding lists. Lookup runs under the
/// shared lock; a miss escalates to the exclusive lock with a second
/// lookup before inserting.
#[derive(Default)]
pub struct DescriptorSetLayoutCache {
    layouts: RwLock<HashMap<Vec<DescriptorBinding>, Arc<DescriptorSetLayout>>>,
}

impl DescriptorSetLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, bindings: &[DescriptorBinding]) -> Arc<DescriptorSetLayout> {
        let mut key = bindings.to_vec();
        key.sort_by_key(|b| b.binding);
        if let Some(layout) = self.layouts.read().get(&key) {
            return layout.clone();
        }
        let mut layouts = self.layouts.write();
        layouts
            .entry(key.clone())
            .or_insert_with(|| Arc::new(DescriptorSetLayout::new(key)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.layouts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.read().is_empty()
    }
}

/// Borrowed resource reference inside an update batch.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorResource<'a> {
    Sampler(&'a SamplerView),
    Image {
        image: &'a ImageMappingView,
        layout: ImageLayout,
    },
    CombinedImageSampler {
        image: &'a ImageMappingView,
        layout: ImageLayout,
        sampler: &'a SamplerView,
    },
    Buffer {
        buffer: &'a BufferView,
        offset: u64,
        range: u64,
    },
    AccelerationStructure(&'a AccelerationStructureView),
}

impl DescriptorResource<'_> {
    fn matches(&self, descriptor_type: DescriptorType) -> bool {
        matches!(
            (self, descriptor_type),
            (Self::Sampler(_), DescriptorType::Sampler)
                | (
                    Self::Image { .. },
                    DescriptorType::SampledImage
                        | DescriptorType::StorageImage
                        | DescriptorType::InputAttachment
                )
                | (
                    Self::CombinedImageSampler { .. },
                    DescriptorType::CombinedImageSampler
                )
                | (
                    Self::Buffer { .. },
                    DescriptorType::UniformBuffer | DescriptorType::StorageBuffer
                )
                | (
                    Self::AccelerationStructure(_),
                    DescriptorType::AccelerationStructure
                )
        )
    }

    fn to_written(self) -> WrittenDescriptor {
        match self {
            Self::Sampler(sampler) => WrittenDescriptor::Sampler(sampler.clone()),
            Self::Image { image, layout } => WrittenDescriptor::Image {
                image: image.clone(),
                layout,
            },
            Self::CombinedImageSampler {
                image,
                layout,
                sampler,
            } => WrittenDescriptor::CombinedImageSampler {
                image: image.clone(),
                layout,
                sampler: sampler.clone(),
            },
            Self::Buffer {
                buffer,
                offset,
                range,
            } => WrittenDescriptor::Buffer {
                buffer: buffer.clone(),
                offset,
                range,
            },
            Self::AccelerationStructure(acceleration_structure) => {
                WrittenDescriptor::AccelerationStructure(acceleration_structure.clone())
            }
        }
    }
}

/// Resource stored in a set's slot after an update.
#[derive(Debug, Clone)]
pub enum WrittenDescriptor {
    Sampler(SamplerView),
    Image {
        image: ImageMappingView,
        layout: ImageLayout,
    },
    CombinedImageSampler {
        image: ImageMappingView,
        layout: ImageLayout,
        sampler: SamplerView,
    },
    Buffer {
        buffer: BufferView,
        offset: u64,
        range: u64,
    },
    AccelerationStructure(AccelerationStructureView),
}

/// One write in an update batch: `resources` lands at
/// `(binding, array_index..array_index + resources.len())`.
pub struct UpdateInfo<'a> {
    pub binding: u32,
    pub array_index: u32,
    pub descriptor_type: DescriptorType,
    pub resources: &'a [DescriptorResource<'a>],
}

/// One copy in a copy batch.
pub struct CopyInfo<'a> {
    pub source: &'a DescriptorSet,
    pub source_binding: u32,
    pub source_array_index: u32,
    pub destination: &'a DescriptorSet,
    pub destination_binding: u32,
    pub destination_array_index: u32,
    pub count: u32,
}

/// A descriptor set: one slot array per layout binding.
pub struct DescriptorSet {
    layout: Arc<DescriptorSetLayout>,
    slots: Mutex<HashMap<u32, Vec<Option<WrittenDescriptor>>>>,
}

impl DescriptorSet {
    pub fn new(layout: Arc<DescriptorSetLayout>) -> Self {
        let slots = layout
            .bindings()
            .iter()
            .map(|b| (b.binding, vec![None; b.count as usize]))
            .collect();
        Self {
            layout,
            slots: Mutex::new(slots),
        }
    }

    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Apply a batch of writes in order.
    pub fn update(&self, updates: &[UpdateInfo<'_>]) {
        #[cfg(debug_assertions)]
        for update in updates {
            self.validate_update(update);
        }
        let mut slots = self.slots.lock();
        for update in updates {
            let binding_slots = slots
                .get_mut(&update.binding)
                .unwrap_or_else(|| panic!("unknown binding {}", update.binding));
            for (index, resource) in update.resources.iter().enumerate() {
                let slot = update.array_index as usize + index;
                binding_slots[slot] = Some(match update.descriptor_type {
                    // Backends without native acceleration-structure
                    // descriptors route these through their fallback
                    // table; the recorded slot is the same either way.
                    DescriptorType::AccelerationStructure => {
                        Self::write_acceleration_structure(resource)
                    }
                    _ => resource.to_written(),
                });
            }
        }
    }

    fn write_acceleration_structure(resource: &DescriptorResource<'_>) -> WrittenDescriptor {
        match resource {
            DescriptorResource::AccelerationStructure(_) => resource.to_written(),
            _ => panic!("acceleration structure binding written with a different resource class"),
        }
    }

    /// Type and bounds pre-flight for one update entry. Debug-only.
    #[cfg(debug_assertions)]
    fn validate_update(&self, update: &UpdateInfo<'_>) {
        let binding = self
            .layout
            .binding(update.binding)
            .unwrap_or_else(|| panic!("binding {} not in layout", update.binding));
        assert_eq!(
            binding.descriptor_type, update.descriptor_type,
            "descriptor type mismatch on binding {}",
            update.binding
        );
        assert!(
            update.array_index as usize + update.resources.len() <= binding.count as usize,
            "update overruns binding {} (count {})",
            update.binding,
            binding.count
        );
        for resource in update.resources {
            assert!(
                resource.matches(update.descriptor_type),
                "resource class does not match descriptor type {:?}",
                update.descriptor_type
            );
        }
    }

    /// Stored slot contents, for inspection.
    pub fn written_descriptor(&self, binding: u32, array_index: u32) -> Option<WrittenDescriptor> {
        self.slots
            .lock()
            .get(&binding)
            .and_then(|slots| slots.get(array_index as usize).cloned())
            .flatten()
    }
}

/// Apply a batch of set-to-set copies in order.
pub fn copy_descriptor_sets(copies: &[CopyInfo<'_>]) {
    for copy in copies {
        #[cfg(debug_assertions)]
        {
            let source = copy
                .source
                .layout
                .binding(copy.source_binding)
                .expect("source binding not in layout");
            let destination = copy
                .destination
                .layout
                .binding(copy.destination_binding)
                .expect("destination binding not in layout");
            assert_eq!(
                source.descriptor_type, destination.descriptor_type,
                "copy between different descriptor types"
            );
            assert!(copy.source_array_index + copy.count <= source.count);
            assert!(copy.destination_array_index + copy.count <= destination.count);
        }
        for index in 0..copy.count {
            let written = copy
                .source
                .written_descriptor(copy.source_binding, copy.source_array_index + index);
            let mut slots = copy.destination.slots.lock();
            let binding_slots = slots
                .get_mut(&copy.destination_binding)
                .expect("destination binding not in layout");
            binding_slots[(copy.destination_array_index + index) as usize] = written;
        }
    }
}

static_assertions::assert_impl_all!(DescriptorSet: Send, Sync);
static_assertions::assert_impl_all!(DescriptorSetLayoutCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_binding(binding: u32, count: u32) -> DescriptorBinding {
        DescriptorBinding {
            binding,
            descriptor_type: DescriptorType::UniformBuffer,
            count,
            stages: ShaderStageFlags::COMPUTE,
        }
    }

    fn buffer_resource(offset: u64) -> DescriptorResource<'static> {
        static NULL_BUFFER: BufferView = BufferView::Null;
        DescriptorResource::Buffer {
            buffer: &NULL_BUFFER,
            offset,
            range: 64,
        }
    }

    fn written_offset(written: &WrittenDescriptor) -> u64 {
        match written {
            WrittenDescriptor::Buffer { offset, .. } => *offset,
            _ => panic!("expected a buffer descriptor"),
        }
    }

    #[test]
    fn test_layout_cache_deduplicates() {
        let cache = DescriptorSetLayoutCache::new();
        let a = cache.get_or_create(&[uniform_binding(0, 1), uniform_binding(1, 4)]);
        // Binding order in the request does not matter.
        let b = cache.get_or_create(&[uniform_binding(1, 4), uniform_binding(0, 1)]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_last_write_wins_within_batch() {
        let cache = DescriptorSetLayoutCache::new();
        let layout = cache.get_or_create(&[uniform_binding(0, 2)]);
        let set = DescriptorSet::new(layout);

        set.update(&[
            UpdateInfo {
                binding: 0,
                array_index: 0,
                descriptor_type: DescriptorType::UniformBuffer,
                resources: &[buffer_resource(100), buffer_resource(200)],
            },
            UpdateInfo {
                binding: 0,
                array_index: 1,
                descriptor_type: DescriptorType::UniformBuffer,
                resources: &[buffer_resource(300)],
            },
        ]);

        let first = set.written_descriptor(0, 0).unwrap();
        let second = set.written_descriptor(0, 1).unwrap();
        assert_eq!(written_offset(&first), 100);
        // The later batch entry overwrote array index 1.
        assert_eq!(written_offset(&second), 300);
    }

    #[test]
    fn test_copy_between_sets() {
        let cache = DescriptorSetLayoutCache::new();
        let layout = cache.get_or_create(&[uniform_binding(0, 4)]);
        let source = DescriptorSet::new(layout.clone());
        let destination = DescriptorSet::new(layout);

        source.update(&[UpdateInfo {
            binding: 0,
            array_index: 0,
            descriptor_type: DescriptorType::UniformBuffer,
            resources: &[buffer_resource(10), buffer_resource(20)],
        }]);

        copy_descriptor_sets(&[CopyInfo {
            source: &source,
            source_binding: 0,
            source_array_index: 0,
            destination: &destination,
            destination_binding: 0,
            destination_array_index: 2,
            count: 2,
        }]);

        assert_eq!(
            written_offset(&destination.written_descriptor(0, 2).unwrap()),
            10
        );
        assert_eq!(
            written_offset(&destination.written_descriptor(0, 3).unwrap()),
            20
        );
        assert!(destination.written_descriptor(0, 0).is_none());
    }

    #[test]
    #[should_panic]
    fn test_type_mismatch_fails_validation() {
        let cache = DescriptorSetLayoutCache::new();
        let layout = cache.get_or_create(&[uniform_binding(0, 1)]);
        let set = DescriptorSet::new(layout);
        static NULL_SAMPLER: SamplerView = SamplerView::Null;
        set.update(&[UpdateInfo {
            binding: 0,
            array_index: 0,
            descriptor_type: DescriptorType::UniformBuffer,
            resources: &[DescriptorResource::Sampler(&NULL_SAMPLER)],
        }]);
    }

    #[test]
    #[should_panic]
    fn test_overrun_fails_validation() {
        let cache = DescriptorSetLayoutCache::new();
        let layout = cache.get_or_create(&[uniform_binding(0, 2)]);
        let set = DescriptorSet::new(layout);
        set.update(&[UpdateInfo {
            binding: 0,
            array_index: 1,
            descriptor_type: DescriptorType::UniformBuffer,
            resources: &[buffer_resource(0), buffer_resource(8)],
        }]);
    }

    #[test]
    fn test_update_stores_written_image_descriptor() {
        let cache = DescriptorSetLayoutCache::new();
        let layout = cache.get_or_create(&[DescriptorBinding {
            binding: 0,
            descriptor_type: DescriptorType::SampledImage,
            count: 1,
            stages: ShaderStageFlags::FRAGMENT,
        }]);
        let set = DescriptorSet::new(layout);
        static NULL_IMAGE: ImageMappingView = ImageMappingView::Null;
        set.update(&[UpdateInfo {
            binding: 0,
            array_index: 0,
            descriptor_type: DescriptorType::SampledImage,
            resources: &[DescriptorResource::Image {
                image: &NULL_IMAGE,
                layout: ImageLayout::ShaderReadOnlyOptimal,
            }],
        }]);
        match set.written_descriptor(0, 0) {
            Some(WrittenDescriptor::Image { layout, .. }) => {
                assert_eq!(layout, ImageLayout::ShaderReadOnlyOptimal);
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn test_acceleration_structure_dedicated_path() {
        let cache = DescriptorSetLayoutCache::new();
        let layout = cache.get_or_create(&[DescriptorBinding {
            binding: 0,
            descriptor_type: DescriptorType::AccelerationStructure,
            count: 1,
            stages: ShaderStageFlags::RAY_TRACING,
        }]);
        let set = DescriptorSet::new(layout);
        static DUMMY_AS: AccelerationStructureView = AccelerationStructureView::Dummy;
        set.update(&[UpdateInfo {
            binding: 0,
            array_index: 0,
            descriptor_type: DescriptorType::AccelerationStructure,
            resources: &[DescriptorResource::AccelerationStructure(&DUMMY_AS)],
        }]);
        assert!(matches!(
            set.written_descriptor(0, 0),
            Some(WrittenDescriptor::AccelerationStructure(_))
        ));
    }
}
