//! Stage graph and submission planning.
//!
//! Stages are nodes in a per-frame dependency graph. Every GPU edge owns
//! a dedicated completion semaphore; planning a stage's submission walks
//! its ancestry to collect the nearest usable semaphores and signals the
//! edge semaphores toward its own live successors. Children are planned
//! only after their parents, so submission order follows graph order by
//! construction.
//!
//! The graph must stay acyclic; cycles are a caller contract violation
//! and are not detected here.

mod sync;

pub use sync::{Fence, FenceStatus, Semaphore};

use crate::backend::SemaphoreView;
use crate::types::QueueFamily;

/// Handle to a stage in a [`StageGraph`]. Handles are plain indices and
/// die with their graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(u32);

impl StageHandle {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scheduling priority of a stage's submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// Ancestor found while walking a stage's dependency chain. The wait
/// semaphore is the one on the `stage -> next_stage` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedStage {
    pub stage: StageHandle,
    pub next_stage: StageHandle,
}

#[derive(Debug)]
struct GpuEdge {
    child: StageHandle,
    /// Signaled when the parent's submission finishes.
    semaphore: Semaphore,
}

#[derive(Debug)]
struct Stage {
    name: String,
    queue_family: QueueFamily,
    priority: JobPriority,
    enabled: bool,
    parents: Vec<StageHandle>,
    gpu_edges: Vec<GpuEdge>,
    cpu_successors: Vec<StageHandle>,
    present_semaphore: Option<Semaphore>,
    present_fence: Option<Fence>,
    /// Frame this stage was submitted in, if any.
    submitted_frame: Option<u64>,
    /// Memoized skip decision and the frame it was made for.
    skip_memo: Option<(u64, bool)>,
}

/// Everything a backend needs to submit one stage.
#[derive(Debug)]
pub struct SubmissionPlan {
    pub stage: StageHandle,
    pub queue_family: QueueFamily,
    pub priority: JobPriority,
    pub wait_semaphores: Vec<SemaphoreView>,
    pub signal_semaphores: Vec<SemaphoreView>,
    pub present_semaphore: Option<SemaphoreView>,
    pub fence: Option<Fence>,
}

/// Arena of stages and their dependency edges.
#[derive(Debug, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,
    semaphore_counter: u64,
    frame_index: u64,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn add_stage(&mut self, name: impl Into<String>, queue_family: QueueFamily) -> StageHandle {
        let handle = StageHandle::new(self.stages.len());
        self.stages.push(Stage {
            name: name.into(),
            queue_family,
            priority: JobPriority::default(),
            enabled: true,
            parents: Vec::new(),
            gpu_edges: Vec::new(),
            cpu_successors: Vec::new(),
            present_semaphore: None,
            present_fence: None,
            submitted_frame: None,
            skip_memo: None,
        });
        handle
    }

    pub fn stage_name(&self, handle: StageHandle) -> &str {
        &self.stages[handle.index()].name
    }

    pub fn queue_family(&self, handle: StageHandle) -> QueueFamily {
        self.stages[handle.index()].queue_family
    }

    pub fn set_priority(&mut self, handle: StageHandle, priority: JobPriority) {
        self.stages[handle.index()].priority = priority;
    }

    pub fn set_enabled(&mut self, handle: StageHandle, enabled: bool) {
        self.stages[handle.index()].enabled = enabled;
    }

    pub fn parents(&self, handle: StageHandle) -> &[StageHandle] {
        &self.stages[handle.index()].parents
    }

    /// Connect `parent -> child` on the GPU timeline, creating the edge's
    /// completion semaphore.
    pub fn add_subsequent_gpu_stage(&mut self, parent: StageHandle, child: StageHandle) {
        debug_assert_ne!(parent, child, "stage cannot depend on itself");
        debug_assert!(self.edge_semaphore(parent, child).is_none(), "edge already exists");
        self.semaphore_counter += 1;
        let debug_name = if cfg!(debug_assertions) {
            format!(
                "{} -> {}",
                self.stages[parent.index()].name,
                self.stages[child.index()].name
            )
        } else {
            String::new()
        };
        let semaphore = Semaphore::new(self.semaphore_counter, debug_name);
        self.stages[parent.index()].gpu_edges.push(GpuEdge {
            child,
            semaphore,
        });
        self.stages[child.index()].parents.push(parent);
    }

    /// Connect `parent -> child` where the child runs on the CPU. No GPU
    /// primitive is created for the edge.
    pub fn add_subsequent_cpu_stage(&mut self, parent: StageHandle, child: StageHandle) {
        debug_assert_ne!(parent, child, "stage cannot depend on itself");
        self.stages[parent.index()].cpu_successors.push(child);
        self.stages[child.index()].parents.push(parent);
    }

    /// Disconnect `parent -> child`, destroying the edge semaphore if the
    /// edge was a GPU edge.
    pub fn remove_subsequent_stage(&mut self, parent: StageHandle, child: StageHandle) {
        let parent_stage = &mut self.stages[parent.index()];
        parent_stage.gpu_edges.retain(|edge| edge.child != child);
        parent_stage.cpu_successors.retain(|&c| c != child);
        self.stages[child.index()].parents.retain(|&p| p != parent);
    }

    /// The completion semaphore on the `parent -> child` GPU edge.
    pub fn edge_semaphore(&self, parent: StageHandle, child: StageHandle) -> Option<&Semaphore> {
        self.stages[parent.index()]
            .gpu_edges
            .iter()
            .find(|edge| edge.child == child)
            .map(|edge| &edge.semaphore)
    }

    /// Give `handle` a present semaphore and fence for its GPU -> CPU
    /// handoff. Returns a fence clone for the waiting side.
    pub fn enable_present(&mut self, handle: StageHandle) -> Fence {
        self.semaphore_counter += 1;
        let stage = &mut self.stages[handle.index()];
        let debug_name = if cfg!(debug_assertions) {
            format!("{} -> present", stage.name)
        } else {
            String::new()
        };
        stage.present_semaphore = Some(Semaphore::new(self.semaphore_counter, debug_name));
        let fence = Fence::new_unsignaled();
        stage.present_fence = Some(fence.clone());
        fence
    }

    /// Start a new frame: submission and skip memoization reset, edge
    /// semaphores become unusable until their stages submit again.
    pub fn begin_frame(&mut self) {
        self.frame_index += 1;
        for stage in &mut self.stages {
            stage.skip_memo = None;
            if let Some(fence) = &stage.present_fence {
                fence.reset();
            }
        }
        log::trace!("stage graph frame {} begins", self.frame_index);
    }

    /// Whether this stage's outgoing submission-finished semaphores will
    /// be signaled this frame.
    pub fn is_submission_finished_semaphore_usable(&self, handle: StageHandle) -> bool {
        self.stages[handle.index()].submitted_frame == Some(self.frame_index)
    }

    /// Whether `handle` should be skipped this frame. A stage skips when
    /// it is disabled, or when it has parents and every parent skips.
    /// The decision is memoized per frame.
    pub fn evaluate_should_skip(&mut self, handle: StageHandle) -> bool {
        if let Some((frame, skip)) = self.stages[handle.index()].skip_memo {
            if frame == self.frame_index {
                return skip;
            }
        }
        let skip = if !self.stages[handle.index()].enabled {
            true
        } else {
            let parents = self.stages[handle.index()].parents.clone();
            !parents.is_empty() && parents.into_iter().all(|p| self.evaluate_should_skip(p))
        };
        self.stages[handle.index()].skip_memo = Some((self.frame_index, skip));
        skip
    }

    /// Walk the ancestry of `parent` (as a dependency of `child`) and
    /// report, exactly once each, the nearest ancestors whose
    /// submission-finished semaphores are usable over a GPU edge.
    /// Ancestors without a usable semaphore recurse into all of their
    /// own parents; finding none anywhere is not an error, and CPU
    /// edges never produce a wait.
    pub fn iterate_used_stages(
        &self,
        parent: StageHandle,
        child: StageHandle,
        mut callback: impl FnMut(UsedStage),
    ) {
        let mut visited = vec![false; self.stages.len()];
        self.iterate_used_stages_inner(parent, child, &mut visited, &mut callback);
    }

    fn iterate_used_stages_inner(
        &self,
        parent: StageHandle,
        child: StageHandle,
        visited: &mut [bool],
        callback: &mut impl FnMut(UsedStage),
    ) {
        if visited[parent.index()] {
            return;
        }
        visited[parent.index()] = true;
        if self.is_submission_finished_semaphore_usable(parent) {
            // CPU edges carry no semaphore; the job scheduler's own
            // dependency completion orders those successors.
            if self.edge_semaphore(parent, child).is_some() {
                callback(UsedStage {
                    stage: parent,
                    next_stage: child,
                });
            }
            return;
        }
        for &grandparent in &self.stages[parent.index()].parents {
            self.iterate_used_stages_inner(grandparent, parent, visited, callback);
        }
    }

    /// Collect the wait set for `handle` over all of its parents, shared
    /// visited set across parents so no ancestor is reported twice.
    pub fn collect_wait_semaphores(&self, handle: StageHandle) -> Vec<UsedStage> {
        let mut waits = Vec::new();
        let mut visited = vec![false; self.stages.len()];
        for &parent in &self.stages[handle.index()].parents {
            self.iterate_used_stages_inner(parent, handle, &mut visited, &mut |used| {
                waits.push(used)
            });
        }
        waits
    }

    /// Plan the submission of `handle` for the current frame. Returns
    /// `None` when the stage skips. Marks the stage submitted, so its
    /// edge semaphores become usable for stages planned after it.
    pub fn plan_submission(&mut self, handle: StageHandle) -> Option<SubmissionPlan> {
        if self.evaluate_should_skip(handle) {
            log::trace!("stage '{}' skipped", self.stages[handle.index()].name);
            return None;
        }
        let waits = self.collect_wait_semaphores(handle);
        let wait_semaphores = waits
            .iter()
            .map(|used| {
                let semaphore = self
                    .edge_semaphore(used.stage, used.next_stage)
                    .expect("used stage without a GPU edge semaphore");
                semaphore.view().clone()
            })
            .collect();

        // Signal only the edges toward successors that will run.
        let children: Vec<StageHandle> = self.stages[handle.index()]
            .gpu_edges
            .iter()
            .map(|edge| edge.child)
            .collect();
        let mut signal_semaphores = Vec::new();
        for child in children {
            if !self.evaluate_should_skip(child) {
                let semaphore = self
                    .edge_semaphore(handle, child)
                    .expect("missing edge semaphore");
                signal_semaphores.push(semaphore.view().clone());
            }
        }

        let frame_index = self.frame_index;
        let stage = &mut self.stages[handle.index()];
        stage.submitted_frame = Some(frame_index);
        let plan = SubmissionPlan {
            stage: handle,
            queue_family: stage.queue_family,
            priority: stage.priority,
            wait_semaphores,
            signal_semaphores,
            present_semaphore: stage.present_semaphore.as_ref().map(|s| s.view().clone()),
            fence: stage.present_fence.clone(),
        };
        // The recording backend completes submissions at plan time; a
        // native submission layer would signal through the queue instead.
        if let Some(fence) = &stage.present_fence {
            fence.signal();
        }
        log::trace!(
            "stage '{}' planned: {} waits, {} signals",
            stage.name,
            plan.wait_semaphores.len(),
            plan.signal_semaphores.len()
        );
        Some(plan)
    }
}

static_assertions::assert_impl_all!(StageGraph: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(names: &[&str]) -> (StageGraph, Vec<StageHandle>) {
        let mut graph = StageGraph::new();
        let handles = names
            .iter()
            .map(|name| graph.add_stage(*name, QueueFamily::Graphics))
            .collect();
        (graph, handles)
    }

    #[test]
    fn test_edge_semaphores_are_per_edge() {
        let (mut graph, handles) = graph_with(&["a", "b", "c"]);
        graph.add_subsequent_gpu_stage(handles[0], handles[1]);
        graph.add_subsequent_gpu_stage(handles[0], handles[2]);

        let ab = graph.edge_semaphore(handles[0], handles[1]).unwrap();
        let ac = graph.edge_semaphore(handles[0], handles[2]).unwrap();
        assert_ne!(ab.id(), ac.id());
        assert_eq!(ab.debug_name(), "a -> b");
    }

    #[test]
    fn test_remove_edge_destroys_semaphore() {
        let (mut graph, handles) = graph_with(&["a", "b"]);
        graph.add_subsequent_gpu_stage(handles[0], handles[1]);
        graph.remove_subsequent_stage(handles[0], handles[1]);
        assert!(graph.edge_semaphore(handles[0], handles[1]).is_none());
        assert!(graph.parents(handles[1]).is_empty());
    }

    #[test]
    fn test_cpu_edge_has_no_semaphore() {
        let (mut graph, handles) = graph_with(&["a", "b"]);
        graph.add_subsequent_cpu_stage(handles[0], handles[1]);
        assert!(graph.edge_semaphore(handles[0], handles[1]).is_none());
        assert_eq!(graph.parents(handles[1]), &[handles[0]]);
    }

    #[test]
    fn test_iterate_visits_diamond_ancestors_once() {
        // a -> b, a -> c, b -> d, c -> d. Nothing submitted: the walk
        // must still visit a exactly once and terminate.
        let (mut graph, h) = graph_with(&["a", "b", "c", "d"]);
        graph.add_subsequent_gpu_stage(h[0], h[1]);
        graph.add_subsequent_gpu_stage(h[0], h[2]);
        graph.add_subsequent_gpu_stage(h[1], h[3]);
        graph.add_subsequent_gpu_stage(h[2], h[3]);
        graph.begin_frame();

        assert!(graph.collect_wait_semaphores(h[3]).is_empty());

        // Submit a: both branches reach it, but it is reported once.
        assert!(graph.plan_submission(h[0]).is_some());
        let waits = graph.collect_wait_semaphores(h[3]);
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].stage, h[0]);
    }

    #[test]
    fn test_iterate_stops_at_nearest_usable_ancestor() {
        // a -> b -> c. After a and b submit, c waits only on b.
        let (mut graph, h) = graph_with(&["a", "b", "c"]);
        graph.add_subsequent_gpu_stage(h[0], h[1]);
        graph.add_subsequent_gpu_stage(h[1], h[2]);
        graph.begin_frame();
        graph.plan_submission(h[0]).unwrap();
        graph.plan_submission(h[1]).unwrap();

        let waits = graph.collect_wait_semaphores(h[2]);
        assert_eq!(waits, vec![UsedStage { stage: h[1], next_stage: h[2] }]);
    }

    #[test]
    fn test_recursion_only_into_branch_without_usable_semaphore() {
        // d depends on a (submitted) and c; c's parent b is submitted but
        // c itself is skipped, so d waits on a directly and on b via c.
        let (mut graph, h) = graph_with(&["a", "b", "c", "d"]);
        graph.add_subsequent_gpu_stage(h[0], h[3]);
        graph.add_subsequent_gpu_stage(h[1], h[2]);
        graph.add_subsequent_gpu_stage(h[2], h[3]);
        graph.begin_frame();
        graph.plan_submission(h[0]).unwrap();
        graph.plan_submission(h[1]).unwrap();
        graph.set_enabled(h[2], false);

        let waits = graph.collect_wait_semaphores(h[3]);
        assert_eq!(waits.len(), 2);
        assert!(waits.contains(&UsedStage { stage: h[0], next_stage: h[3] }));
        assert!(waits.contains(&UsedStage { stage: h[1], next_stage: h[2] }));
    }

    #[test]
    fn test_cpu_edge_parent_plans_without_wait() {
        // render -> readback over a CPU edge: the submitted parent must
        // not be reported as a wait, and planning the child must not
        // demand an edge semaphore the CPU edge never had.
        let (mut graph, h) = graph_with(&["render", "readback"]);
        graph.add_subsequent_cpu_stage(h[0], h[1]);
        graph.begin_frame();
        graph.plan_submission(h[0]).unwrap();

        assert!(graph.collect_wait_semaphores(h[1]).is_empty());
        let plan = graph.plan_submission(h[1]).unwrap();
        assert!(plan.wait_semaphores.is_empty());
    }

    #[test]
    fn test_independent_roots_produce_no_waits() {
        let (mut graph, h) = graph_with(&["root_a", "root_b"]);
        graph.begin_frame();
        assert!(graph.collect_wait_semaphores(h[0]).is_empty());
        assert!(graph.collect_wait_semaphores(h[1]).is_empty());
    }

    #[test]
    fn test_skip_propagates_from_parents() {
        let (mut graph, h) = graph_with(&["a", "b", "c"]);
        graph.add_subsequent_gpu_stage(h[0], h[1]);
        graph.add_subsequent_gpu_stage(h[1], h[2]);
        graph.begin_frame();
        graph.set_enabled(h[0], false);

        assert!(graph.evaluate_should_skip(h[0]));
        assert!(graph.evaluate_should_skip(h[1]));
        assert!(graph.evaluate_should_skip(h[2]));
        assert!(graph.plan_submission(h[1]).is_none());

        // Memoization holds for the frame, resets on the next one.
        graph.set_enabled(h[0], true);
        assert!(graph.evaluate_should_skip(h[2]));
        graph.begin_frame();
        assert!(!graph.evaluate_should_skip(h[2]));
    }

    #[test]
    fn test_plan_skips_signals_toward_skipped_children() {
        let (mut graph, h) = graph_with(&["a", "b", "c"]);
        graph.add_subsequent_gpu_stage(h[0], h[1]);
        graph.add_subsequent_gpu_stage(h[0], h[2]);
        graph.begin_frame();
        graph.set_enabled(h[2], false);

        let plan = graph.plan_submission(h[0]).unwrap();
        assert_eq!(plan.signal_semaphores.len(), 1);
    }

    #[test]
    fn test_present_fence_signals_on_recording_backend() {
        let (mut graph, h) = graph_with(&["present"]);
        let fence = graph.enable_present(h[0]);
        graph.begin_frame();
        assert!(!fence.is_signaled());

        let plan = graph.plan_submission(h[0]).unwrap();
        assert!(plan.present_semaphore.is_some());
        assert!(fence.is_signaled());

        // Next frame resets the fence.
        graph.begin_frame();
        assert!(!fence.is_signaled());
    }
}
