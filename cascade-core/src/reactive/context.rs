//! Reactive Context
//!
//! The reactive context tracks which derivation is currently running, and
//! whether the code running right now may write to observed state.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of frames. Tracked runs of computeds and
//! reactions push a frame carrying the derivation id; actions and
//! `untracked` push a frame without one, which hides the enclosing derivation
//! from reads. The guard pops its frame when dropped, so the stack stays
//! balanced even if the body panics. Dropping a tracking guard also binds the
//! dependencies observed during the run.

use super::runtime::Runtime;
use crate::graph::NodeId;

/// An entry in the context stack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    /// The derivation collecting reads, if any.
    pub derivation: Option<NodeId>,
    pub allow_state_changes: bool,
}

/// Guard that pops the frame when dropped.
pub(crate) struct ReactiveContext {
    runtime: Runtime,
    derivation: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a tracked run of `derivation`.
    ///
    /// Reads performed while the guard is alive are recorded as the new
    /// dependency list of the derivation.
    pub fn tracking(runtime: &Runtime, derivation: NodeId, allow_state_changes: bool) -> Self {
        runtime.graph_mut().begin_run(derivation);
        Self::enter(runtime, Some(derivation), allow_state_changes)
    }

    /// Enter a region whose reads are not tracked.
    pub fn untracked(runtime: &Runtime, allow_state_changes: bool) -> Self {
        Self::enter(runtime, None, allow_state_changes)
    }

    /// Keep the current derivation but change whether writes are allowed.
    pub fn allowing(runtime: &Runtime, allow_state_changes: bool) -> Self {
        let derivation = runtime.current_derivation();
        runtime.frames_mut().push(Frame {
            derivation,
            allow_state_changes,
        });
        Self {
            runtime: runtime.clone(),
            derivation: None,
        }
    }

    fn enter(runtime: &Runtime, derivation: Option<NodeId>, allow_state_changes: bool) -> Self {
        runtime.frames_mut().push(Frame {
            derivation,
            allow_state_changes,
        });
        Self {
            runtime: runtime.clone(),
            derivation,
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = self.runtime.frames_mut().pop();

        if let (Some(expected), Some(frame)) = (self.derivation, popped) {
            if !std::thread::panicking() {
                debug_assert_eq!(
                    frame.derivation,
                    Some(expected),
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    expected,
                    frame.derivation
                );
            }
        }

        if let Some(derivation) = self.derivation {
            self.runtime.bind_dependencies(derivation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::Tracked;

    #[test]
    fn context_tracks_derivation() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let computed = runtime.computed(move || cell.get());
        let id = computed.node_id();

        assert!(runtime.current_derivation().is_none());

        {
            let _ctx = ReactiveContext::tracking(&runtime, id, false);
            assert_eq!(runtime.current_derivation(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(runtime.current_derivation().is_none());
    }

    #[test]
    fn untracked_frames_hide_the_derivation() {
        let runtime = Runtime::new();
        let computed = runtime.computed(|| 0);
        let id = computed.node_id();

        let _outer = ReactiveContext::tracking(&runtime, id, false);
        {
            let _inner = ReactiveContext::untracked(&runtime, true);
            assert!(runtime.current_derivation().is_none());
            assert!(runtime.state_changes_allowed());
        }

        // After inner context drops, outer should be current
        assert_eq!(runtime.current_derivation(), Some(id));
        assert!(!runtime.state_changes_allowed());
    }

    #[test]
    fn allowing_keeps_the_derivation() {
        let runtime = Runtime::new();
        let computed = runtime.computed(|| 0);
        let id = computed.node_id();

        let _outer = ReactiveContext::tracking(&runtime, id, true);
        let _inner = ReactiveContext::allowing(&runtime, false);

        assert_eq!(runtime.current_derivation(), Some(id));
        assert!(!runtime.state_changes_allowed());
    }
}
