//! Framegraph assembly: flat description tables frozen into runtime stages.
//!
//! The builder accumulates attachment, subpass and stage descriptions in
//! contiguous, type-specific tables and hands back indices rather than
//! addresses, so a stage can be described before the full attachment set
//! is known. A builder is single-shot: [`FramegraphBuilder::build`]
//! consumes it and produces a [`Framegraph`] plus runtime stages in a
//! [`StageGraph`]. Rebuilding (a swapchain resize, say) means a new
//! builder and a new stage graph generation; indices never survive a
//! rebuild.

mod attachments;

pub use attachments::{
    AttachmentFlags, ClearValue, ColorAttachmentDescription, DepthStencilAttachmentDescription,
    InputAttachmentDescription, InputOutputAttachmentDescription, OutputAttachmentDescription,
};

use std::marker::PhantomData;

use crate::error::GraphicsError;
use crate::stage::{JobPriority, StageGraph, StageHandle};
use crate::types::{AttachmentIndex, ImageLayout, QueueFamily, StageIndex};

// Inline capacity hints sized to a typical frame graph so the tables do
// not reallocate mid-construction.
const COLOR_ATTACHMENT_CAPACITY: usize = 128;
const INPUT_ATTACHMENT_CAPACITY: usize = 32;
const INPUT_OUTPUT_ATTACHMENT_CAPACITY: usize = 32;
const OUTPUT_ATTACHMENT_CAPACITY: usize = 96;
const SUBPASS_CAPACITY: usize = 32;
const ATTACHMENT_REFERENCE_CAPACITY: usize = 128;

/// Contiguous run of just-inserted entries in one of the builder's
/// tables. Spans are plain index ranges and are only meaningful within
/// the builder generation that produced them.
pub struct TableSpan<T> {
    first: u32,
    count: u32,
    _table: PhantomData<fn() -> T>,
}

impl<T> TableSpan<T> {
    pub const fn empty() -> Self {
        Self {
            first: 0,
            count: 0,
            _table: PhantomData,
        }
    }

    fn new(first: usize, count: usize) -> Self {
        Self {
            first: first as u32,
            count: count as u32,
            _table: PhantomData,
        }
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.first as usize..(self.first + self.count) as usize
    }
}

impl<T> Clone for TableSpan<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TableSpan<T> {}

impl<T> std::fmt::Debug for TableSpan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableSpan[{}..{}]", self.first, self.first + self.count)
    }
}

/// Reference to one entry of a stage's combined attachment list (colors
/// in span order, then the depth/stencil attachment last), with the
/// layout the subpass uses it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassAttachmentReference {
    pub attachment: AttachmentIndex,
    pub layout: ImageLayout,
}

/// One render node within a stage.
#[derive(Debug, Clone, Copy)]
pub struct RenderSubpassDescription {
    pub attachment_references: TableSpan<SubpassAttachmentReference>,
}

/// One compute node within a stage.
#[derive(Debug, Clone, Copy)]
pub struct ComputeSubpassDescription {
    /// Attachments the dispatch reads, if any. Each reference indexes
    /// the builder's input attachment table.
    pub input_references: TableSpan<SubpassAttachmentReference>,
}

/// Description of a unit of work, immutable once emplaced.
#[derive(Debug, Clone)]
pub enum StageDescription {
    /// Render work over builder-managed attachments.
    Render {
        name: String,
        priority: JobPriority,
        color_attachments: TableSpan<ColorAttachmentDescription>,
        depth_stencil_attachment: Option<AttachmentIndex>,
        subpasses: TableSpan<RenderSubpassDescription>,
        previous_stages: Vec<StageIndex>,
    },
    /// Render work whose pass objects the caller manages itself.
    ExplicitRender {
        name: String,
        priority: JobPriority,
        previous_stages: Vec<StageIndex>,
    },
    Compute {
        name: String,
        priority: JobPriority,
        subpasses: TableSpan<ComputeSubpassDescription>,
        previous_stages: Vec<StageIndex>,
    },
    /// CPU-side work scheduled in graph order.
    Generic {
        name: String,
        priority: JobPriority,
        previous_stages: Vec<StageIndex>,
    },
}

impl StageDescription {
    pub fn name(&self) -> &str {
        match self {
            Self::Render { name, .. }
            | Self::ExplicitRender { name, .. }
            | Self::Compute { name, .. }
            | Self::Generic { name, .. } => name,
        }
    }

    pub fn priority(&self) -> JobPriority {
        match self {
            Self::Render { priority, .. }
            | Self::ExplicitRender { priority, .. }
            | Self::Compute { priority, .. }
            | Self::Generic { priority, .. } => *priority,
        }
    }

    pub fn previous_stages(&self) -> &[StageIndex] {
        match self {
            Self::Render {
                previous_stages, ..
            }
            | Self::ExplicitRender {
                previous_stages, ..
            }
            | Self::Compute {
                previous_stages, ..
            }
            | Self::Generic {
                previous_stages, ..
            } => previous_stages,
        }
    }

    fn queue_family(&self) -> QueueFamily {
        match self {
            Self::Render { .. } | Self::ExplicitRender { .. } => QueueFamily::Graphics,
            Self::Compute { .. } => QueueFamily::Compute,
            Self::Generic { .. } => QueueFamily::Graphics,
        }
    }

    /// Whether the stage records GPU commands (CPU-only stages get no
    /// edge semaphores).
    fn is_gpu(&self) -> bool {
        !matches!(self, Self::Generic { .. })
    }
}

/// Accumulates description tables. Populated once, then frozen with
/// [`build`].
///
/// [`build`]: Self::build
#[derive(Debug)]
pub struct FramegraphBuilder {
    color_attachments: Vec<ColorAttachmentDescription>,
    depth_stencil_attachments: Vec<DepthStencilAttachmentDescription>,
    input_attachments: Vec<InputAttachmentDescription>,
    input_output_attachments: Vec<InputOutputAttachmentDescription>,
    output_attachments: Vec<OutputAttachmentDescription>,
    render_subpasses: Vec<RenderSubpassDescription>,
    compute_subpasses: Vec<ComputeSubpassDescription>,
    attachment_references: Vec<SubpassAttachmentReference>,
    stages: Vec<StageDescription>,
}

impl Default for FramegraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FramegraphBuilder {
    pub fn new() -> Self {
        Self {
            color_attachments: Vec::with_capacity(COLOR_ATTACHMENT_CAPACITY),
            depth_stencil_attachments: Vec::with_capacity(INPUT_ATTACHMENT_CAPACITY),
            input_attachments: Vec::with_capacity(INPUT_ATTACHMENT_CAPACITY),
            input_output_attachments: Vec::with_capacity(INPUT_OUTPUT_ATTACHMENT_CAPACITY),
            output_attachments: Vec::with_capacity(OUTPUT_ATTACHMENT_CAPACITY),
            render_subpasses: Vec::with_capacity(SUBPASS_CAPACITY),
            compute_subpasses: Vec::with_capacity(SUBPASS_CAPACITY),
            attachment_references: Vec::with_capacity(ATTACHMENT_REFERENCE_CAPACITY),
            stages: Vec::new(),
        }
    }

    pub fn emplace_color_attachments(
        &mut self,
        descriptions: impl IntoIterator<Item = ColorAttachmentDescription>,
    ) -> TableSpan<ColorAttachmentDescription> {
        Self::emplace(&mut self.color_attachments, descriptions, COLOR_ATTACHMENT_CAPACITY)
    }

    pub fn emplace_depth_stencil_attachments(
        &mut self,
        descriptions: impl IntoIterator<Item = DepthStencilAttachmentDescription>,
    ) -> TableSpan<DepthStencilAttachmentDescription> {
        Self::emplace(
            &mut self.depth_stencil_attachments,
            descriptions,
            INPUT_ATTACHMENT_CAPACITY,
        )
    }

    pub fn emplace_input_attachments(
        &mut self,
        descriptions: impl IntoIterator<Item = InputAttachmentDescription>,
    ) -> TableSpan<InputAttachmentDescription> {
        Self::emplace(&mut self.input_attachments, descriptions, INPUT_ATTACHMENT_CAPACITY)
    }

    pub fn emplace_input_output_attachments(
        &mut self,
        descriptions: impl IntoIterator<Item = InputOutputAttachmentDescription>,
    ) -> TableSpan<InputOutputAttachmentDescription> {
        Self::emplace(
            &mut self.input_output_attachments,
            descriptions,
            INPUT_OUTPUT_ATTACHMENT_CAPACITY,
        )
    }

    pub fn emplace_output_attachments(
        &mut self,
        descriptions: impl IntoIterator<Item = OutputAttachmentDescription>,
    ) -> TableSpan<OutputAttachmentDescription> {
        Self::emplace(&mut self.output_attachments, descriptions, OUTPUT_ATTACHMENT_CAPACITY)
    }

    pub fn emplace_render_subpasses(
        &mut self,
        descriptions: impl IntoIterator<Item = RenderSubpassDescription>,
    ) -> TableSpan<RenderSubpassDescription> {
        Self::emplace(&mut self.render_subpasses, descriptions, SUBPASS_CAPACITY)
    }

    pub fn emplace_compute_subpasses(
        &mut self,
        descriptions: impl IntoIterator<Item = ComputeSubpassDescription>,
    ) -> TableSpan<ComputeSubpassDescription> {
        Self::emplace(&mut self.compute_subpasses, descriptions, SUBPASS_CAPACITY)
    }

    pub fn emplace_subpass_attachment_references(
        &mut self,
        references: impl IntoIterator<Item = SubpassAttachmentReference>,
    ) -> TableSpan<SubpassAttachmentReference> {
        Self::emplace(
            &mut self.attachment_references,
            references,
            ATTACHMENT_REFERENCE_CAPACITY,
        )
    }

    fn emplace<T>(
        table: &mut Vec<T>,
        entries: impl IntoIterator<Item = T>,
        capacity: usize,
    ) -> TableSpan<T> {
        let first = table.len();
        table.extend(entries);
        debug_assert!(
            table.len() <= capacity,
            "table exceeded its inline capacity hint ({capacity})"
        );
        TableSpan::new(first, table.len() - first)
    }

    /// Index the next `emplace_stage` call will return. Lets a stage
    /// description name a sibling that has not been emplaced yet.
    pub fn get_next_available_stage_index(&self) -> StageIndex {
        self.stages.len() as StageIndex
    }

    pub fn emplace_stage(&mut self, description: StageDescription) -> StageIndex {
        let index = self.get_next_available_stage_index();
        self.stages.push(description);
        index
    }

    pub fn color_attachments(
        &self,
        span: TableSpan<ColorAttachmentDescription>,
    ) -> &[ColorAttachmentDescription] {
        &self.color_attachments[span.indices()]
    }

    pub fn subpass_attachment_references(
        &self,
        span: TableSpan<SubpassAttachmentReference>,
    ) -> &[SubpassAttachmentReference] {
        &self.attachment_references[span.indices()]
    }

    /// Freeze the builder: create one runtime stage per description and
    /// resolve previous-stage indices into stage graph edges.
    pub fn build(self, graph: &mut StageGraph) -> Result<Framegraph, GraphicsError> {
        self.validate()?;

        // All stages first so forward references resolve.
        let handles: Vec<StageHandle> = self
            .stages
            .iter()
            .map(|description| {
                let handle = graph.add_stage(description.name(), description.queue_family());
                graph.set_priority(handle, description.priority());
                handle
            })
            .collect();

        for (index, description) in self.stages.iter().enumerate() {
            for &previous in description.previous_stages() {
                let parent = handles[previous as usize];
                let child = handles[index];
                if description.is_gpu() {
                    graph.add_subsequent_gpu_stage(parent, child);
                } else {
                    graph.add_subsequent_cpu_stage(parent, child);
                }
            }
        }

        log::info!(
            "framegraph built: {} stages, {} color attachments, {} references",
            self.stages.len(),
            self.color_attachments.len(),
            self.attachment_references.len()
        );
        Ok(Framegraph {
            color_attachments: self.color_attachments,
            depth_stencil_attachments: self.depth_stencil_attachments,
            input_attachments: self.input_attachments,
            input_output_attachments: self.input_output_attachments,
            output_attachments: self.output_attachments,
            render_subpasses: self.render_subpasses,
            compute_subpasses: self.compute_subpasses,
            attachment_references: self.attachment_references,
            descriptions: self.stages,
            stage_handles: handles,
        })
    }

    fn validate(&self) -> Result<(), GraphicsError> {
        let stage_count = self.stages.len();
        for description in &self.stages {
            for &previous in description.previous_stages() {
                if previous as usize >= stage_count {
                    return Err(GraphicsError::InvalidFramegraph(format!(
                        "stage '{}' references stage index {previous}, but only {stage_count} stages were emplaced",
                        description.name()
                    )));
                }
            }
            match description {
                StageDescription::Render {
                    name,
                    color_attachments,
                    depth_stencil_attachment,
                    subpasses,
                    ..
                } => {
                    if let Some(depth) = depth_stencil_attachment {
                        if *depth as usize >= self.depth_stencil_attachments.len() {
                            return Err(GraphicsError::InvalidFramegraph(format!(
                                "stage '{name}' references depth attachment {depth} of {}",
                                self.depth_stencil_attachments.len()
                            )));
                        }
                    }
                    if subpasses.indices().end > self.render_subpasses.len() {
                        return Err(GraphicsError::InvalidFramegraph(format!(
                            "stage '{name}' references subpasses outside the table"
                        )));
                    }
                    let attachment_count =
                        color_attachments.len() + usize::from(depth_stencil_attachment.is_some());
                    for subpass in &self.render_subpasses[subpasses.indices()] {
                        let references = subpass.attachment_references;
                        if references.indices().end > self.attachment_references.len() {
                            return Err(GraphicsError::InvalidFramegraph(format!(
                                "stage '{name}' subpass references outside the reference table"
                            )));
                        }
                        for reference in &self.attachment_references[references.indices()] {
                            if reference.attachment as usize >= attachment_count {
                                return Err(GraphicsError::InvalidFramegraph(format!(
                                    "stage '{name}' subpass references attachment {} of {attachment_count}",
                                    reference.attachment
                                )));
                            }
                        }
                    }
                }
                StageDescription::Compute {
                    name, subpasses, ..
                } => {
                    if subpasses.indices().end > self.compute_subpasses.len() {
                        return Err(GraphicsError::InvalidFramegraph(format!(
                            "stage '{name}' references compute subpasses outside the table"
                        )));
                    }
                    for subpass in &self.compute_subpasses[subpasses.indices()] {
                        let references = subpass.input_references;
                        if references.indices().end > self.attachment_references.len() {
                            return Err(GraphicsError::InvalidFramegraph(format!(
                                "stage '{name}' subpass references outside the reference table"
                            )));
                        }
                        for reference in &self.attachment_references[references.indices()] {
                            if reference.attachment as usize >= self.input_attachments.len() {
                                return Err(GraphicsError::InvalidFramegraph(format!(
                                    "stage '{name}' subpass references input attachment {} of {}",
                                    reference.attachment,
                                    self.input_attachments.len()
                                )));
                            }
                        }
                    }
                }
                StageDescription::ExplicitRender { .. } | StageDescription::Generic { .. } => {}
            }
        }
        Ok(())
    }
}

/// A built stage: its description index and the runtime stage handle.
#[derive(Debug, Clone, Copy)]
pub struct FramegraphStage {
    pub description: StageIndex,
    pub handle: StageHandle,
}

/// The frozen framegraph. Owns the description tables; runtime stages
/// live in the [`StageGraph`] it was built into.
#[derive(Debug)]
pub struct Framegraph {
    color_attachments: Vec<ColorAttachmentDescription>,
    depth_stencil_attachments: Vec<DepthStencilAttachmentDescription>,
    input_attachments: Vec<InputAttachmentDescription>,
    input_output_attachments: Vec<InputOutputAttachmentDescription>,
    output_attachments: Vec<OutputAttachmentDescription>,
    render_subpasses: Vec<RenderSubpassDescription>,
    compute_subpasses: Vec<ComputeSubpassDescription>,
    attachment_references: Vec<SubpassAttachmentReference>,
    descriptions: Vec<StageDescription>,
    stage_handles: Vec<StageHandle>,
}

impl Framegraph {
    pub fn get_stages(&self) -> impl Iterator<Item = FramegraphStage> + '_ {
        self.stage_handles
            .iter()
            .enumerate()
            .map(|(index, &handle)| FramegraphStage {
                description: index as StageIndex,
                handle,
            })
    }

    pub fn stage_count(&self) -> usize {
        self.descriptions.len()
    }

    pub fn description(&self, index: StageIndex) -> &StageDescription {
        &self.descriptions[index as usize]
    }

    pub fn stage_handle(&self, index: StageIndex) -> StageHandle {
        self.stage_handles[index as usize]
    }

    pub fn color_attachments(
        &self,
        span: TableSpan<ColorAttachmentDescription>,
    ) -> &[ColorAttachmentDescription] {
        &self.color_attachments[span.indices()]
    }

    pub fn depth_stencil_attachment(&self, index: AttachmentIndex) -> &DepthStencilAttachmentDescription {
        &self.depth_stencil_attachments[index as usize]
    }

    pub fn input_attachments(
        &self,
        span: TableSpan<InputAttachmentDescription>,
    ) -> &[InputAttachmentDescription] {
        &self.input_attachments[span.indices()]
    }

    pub fn input_output_attachments(
        &self,
        span: TableSpan<InputOutputAttachmentDescription>,
    ) -> &[InputOutputAttachmentDescription] {
        &self.input_output_attachments[span.indices()]
    }

    pub fn output_attachments(
        &self,
        span: TableSpan<OutputAttachmentDescription>,
    ) -> &[OutputAttachmentDescription] {
        &self.output_attachments[span.indices()]
    }

    pub fn render_subpasses(
        &self,
        span: TableSpan<RenderSubpassDescription>,
    ) -> &[RenderSubpassDescription] {
        &self.render_subpasses[span.indices()]
    }

    pub fn compute_subpasses(
        &self,
        span: TableSpan<ComputeSubpassDescription>,
    ) -> &[ComputeSubpassDescription] {
        &self.compute_subpasses[span.indices()]
    }

    pub fn subpass_attachment_references(
        &self,
        span: TableSpan<SubpassAttachmentReference>,
    ) -> &[SubpassAttachmentReference] {
        &self.attachment_references[span.indices()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Extent3d, ImageSubresourceRange};

    fn color(identifier: u64) -> ColorAttachmentDescription {
        ColorAttachmentDescription::new(
            identifier,
            Extent3d::new(256, 256, 1),
            ImageSubresourceRange::single_color(),
            AttachmentFlags::MUST_STORE,
            Some(ClearValue::Color([0.0; 4])),
        )
    }

    #[test]
    fn test_emplace_returns_narrow_spans() {
        let mut builder = FramegraphBuilder::new();
        let first = builder.emplace_color_attachments([color(1), color(2)]);
        let second = builder.emplace_color_attachments([color(3)]);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second.first(), 2);
        assert_eq!(builder.color_attachments(second)[0].identifier, 3);
    }

    #[test]
    fn test_forward_stage_references_resolve() {
        let mut builder = FramegraphBuilder::new();
        // First stage depends on a sibling emplaced after it.
        let later = builder.get_next_available_stage_index() + 1;
        builder.emplace_stage(StageDescription::ExplicitRender {
            name: "post".to_string(),
            priority: JobPriority::Normal,
            previous_stages: vec![later],
        });
        builder.emplace_stage(StageDescription::ExplicitRender {
            name: "main".to_string(),
            priority: JobPriority::Normal,
            previous_stages: vec![],
        });

        let mut graph = StageGraph::new();
        let framegraph = builder.build(&mut graph).unwrap();
        assert_eq!(framegraph.stage_count(), 2);
        let post = framegraph.stage_handle(0);
        let main = framegraph.stage_handle(1);
        assert_eq!(graph.parents(post), &[main]);
        assert!(graph.edge_semaphore(main, post).is_some());
    }

    #[test]
    fn test_dangling_stage_reference_fails_build() {
        let mut builder = FramegraphBuilder::new();
        builder.emplace_stage(StageDescription::Generic {
            name: "broken".to_string(),
            priority: JobPriority::Normal,
            previous_stages: vec![9],
        });
        let mut graph = StageGraph::new();
        assert!(matches!(
            builder.build(&mut graph),
            Err(GraphicsError::InvalidFramegraph(_))
        ));
    }

    #[test]
    fn test_cpu_stage_edges_carry_no_semaphore() {
        let mut builder = FramegraphBuilder::new();
        builder.emplace_stage(StageDescription::ExplicitRender {
            name: "render".to_string(),
            priority: JobPriority::Normal,
            previous_stages: vec![],
        });
        builder.emplace_stage(StageDescription::Generic {
            name: "readback".to_string(),
            priority: JobPriority::Low,
            previous_stages: vec![0],
        });
        let mut graph = StageGraph::new();
        let framegraph = builder.build(&mut graph).unwrap();
        let render = framegraph.stage_handle(0);
        let readback = framegraph.stage_handle(1);
        assert!(graph.edge_semaphore(render, readback).is_none());
        assert_eq!(graph.parents(readback), &[render]);
    }

    #[test]
    fn test_out_of_range_attachment_reference_fails_build() {
        let mut builder = FramegraphBuilder::new();
        let colors = builder.emplace_color_attachments([color(1)]);
        let references =
            builder.emplace_subpass_attachment_references([SubpassAttachmentReference {
                attachment: 5,
                layout: ImageLayout::ColorAttachmentOptimal,
            }]);
        let subpasses = builder.emplace_render_subpasses([RenderSubpassDescription {
            attachment_references: references,
        }]);
        builder.emplace_stage(StageDescription::Render {
            name: "bad".to_string(),
            priority: JobPriority::Normal,
            color_attachments: colors,
            depth_stencil_attachment: None,
            subpasses,
            previous_stages: vec![],
        });
        let mut graph = StageGraph::new();
        assert!(builder.build(&mut graph).is_err());
    }

    #[test]
    fn test_dangling_depth_attachment_fails_build() {
        let mut builder = FramegraphBuilder::new();
        let colors = builder.emplace_color_attachments([color(1)]);
        builder.emplace_stage(StageDescription::Render {
            name: "depth-less".to_string(),
            priority: JobPriority::Normal,
            color_attachments: colors,
            // No depth attachments were emplaced, so index 0 dangles.
            depth_stencil_attachment: Some(0),
            subpasses: TableSpan::empty(),
            previous_stages: vec![],
        });
        let mut graph = StageGraph::new();
        assert!(matches!(
            builder.build(&mut graph),
            Err(GraphicsError::InvalidFramegraph(_))
        ));
    }

    #[test]
    fn test_dangling_compute_reference_fails_build() {
        let mut builder = FramegraphBuilder::new();
        let references =
            builder.emplace_subpass_attachment_references([SubpassAttachmentReference {
                attachment: 3,
                layout: ImageLayout::ShaderReadOnlyOptimal,
            }]);
        let subpasses = builder.emplace_compute_subpasses([ComputeSubpassDescription {
            input_references: references,
        }]);
        builder.emplace_stage(StageDescription::Compute {
            name: "blur".to_string(),
            priority: JobPriority::Normal,
            subpasses,
            previous_stages: vec![],
        });
        let mut graph = StageGraph::new();
        assert!(matches!(
            builder.build(&mut graph),
            Err(GraphicsError::InvalidFramegraph(_))
        ));
    }
}
