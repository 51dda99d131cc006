//! Resource state tracking and barrier insertion.
//!
//! Every GPU-visible resource that changes usage during a frame has exactly
//! one current state at any point in submission order. Before a command uses
//! a resource in a new way, a transition barrier from the recorded state to
//! the required state is emitted and the record is updated.
//!
//! # Protocol
//!
//! | Call                                         | Behavior                                   |
//! |----------------------------------------------|--------------------------------------------|
//! | [`transition`](ResourceStateTracker::transition) | Always emits a barrier. A transition to the current state is an error. |
//! | [`ensure`](ResourceStateTracker::ensure)     | Emits a barrier only if the state differs. |
//! | [`require`](ResourceStateTracker::require)   | Emits nothing, fails if the state differs. |
//!
//! Resources borrowed by a pass must be returned to the state they were
//! borrowed in before the frame ends. The tracker keeps a per-resource
//! history of recorded states so those loops can be checked:
//!
//! ```text
//! shadow map:  ShaderResource ──► DepthWrite ──► ShaderResource
//! MSAA target: ResolveSource  ──► RenderTarget ──► ResolveSource
//! ```
//!
//! The tracker is owned by the single recording thread and takes `&mut self`
//! for every mutation.

use std::collections::HashMap;

use crate::error::{GraphicsError, GraphicsResult};
use crate::types::ResourceId;

/// Usage state of a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Common,
    Present,
    RenderTarget,
    DepthWrite,
    DepthRead,
    ShaderResource,
    CopyDest,
    CopySource,
    ResolveSource,
    ResolveDest,
    UnorderedAccess,
    AccelerationStructure,
    GenericRead,
}

impl ResourceState {
    /// Whether the GPU may write the resource in this state.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::CopyDest
                | ResourceState::ResolveDest
                | ResourceState::UnorderedAccess
                | ResourceState::AccelerationStructure
        )
    }
}

/// A single recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub resource: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

#[derive(Debug)]
struct ResourceRecord {
    state: ResourceState,
    history: Vec<ResourceState>,
}

/// Per-resource current-state bookkeeping.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    records: HashMap<ResourceId, ResourceRecord>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a resource in the state it was created in.
    ///
    /// Registering an already tracked resource replaces its record.
    pub fn register(&mut self, resource: impl Into<ResourceId>, initial: ResourceState) {
        let resource = resource.into();
        log::trace!("tracking {resource:?} in {initial:?}");
        self.records.insert(
            resource,
            ResourceRecord {
                state: initial,
                history: vec![initial],
            },
        );
    }

    /// Stop tracking a resource, returning its last state.
    pub fn forget(&mut self, resource: impl Into<ResourceId>) -> Option<ResourceState> {
        self.records.remove(&resource.into()).map(|record| record.state)
    }

    pub fn state(&self, resource: impl Into<ResourceId>) -> Option<ResourceState> {
        self.records.get(&resource.into()).map(|record| record.state)
    }

    pub fn contains(&self, resource: impl Into<ResourceId>) -> bool {
        self.records.contains_key(&resource.into())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a transition to `to`.
    ///
    /// Fails with [`GraphicsError::RedundantTransition`] when the resource is
    /// already in `to`, and with [`GraphicsError::UntrackedResource`] when the
    /// resource was never registered.
    pub fn transition(
        &mut self,
        resource: impl Into<ResourceId>,
        to: ResourceState,
    ) -> GraphicsResult<Barrier> {
        let resource = resource.into();
        let record = self
            .records
            .get_mut(&resource)
            .ok_or(GraphicsError::UntrackedResource(resource))?;

        if record.state == to {
            return Err(GraphicsError::RedundantTransition {
                resource,
                state: to,
            });
        }

        let barrier = Barrier {
            resource,
            before: record.state,
            after: to,
        };
        record.state = to;
        record.history.push(to);
        Ok(barrier)
    }

    /// Record a transition to `to` only if the resource is in another state.
    pub fn ensure(
        &mut self,
        resource: impl Into<ResourceId>,
        to: ResourceState,
    ) -> GraphicsResult<Option<Barrier>> {
        let resource = resource.into();
        match self.state(resource) {
            None => Err(GraphicsError::UntrackedResource(resource)),
            Some(current) if current == to => Ok(None),
            Some(_) => self.transition(resource, to).map(Some),
        }
    }

    /// Check that a resource is already in `expected`.
    pub fn require(
        &self,
        resource: impl Into<ResourceId>,
        expected: ResourceState,
    ) -> GraphicsResult<()> {
        let resource = resource.into();
        let actual = self
            .state(resource)
            .ok_or(GraphicsError::UntrackedResource(resource))?;
        if actual != expected {
            return Err(GraphicsError::StateMismatch {
                resource,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Record several transitions at once. Every entry must change state.
    pub fn transition_many(
        &mut self,
        transitions: &[(ResourceId, ResourceState)],
    ) -> GraphicsResult<Vec<Barrier>> {
        transitions
            .iter()
            .map(|&(resource, to)| self.transition(resource, to))
            .collect()
    }

    /// States recorded for a resource since registration or the last
    /// [`clear_history`](Self::clear_history), starting with the state it
    /// was in at that point.
    pub fn history(&self, resource: impl Into<ResourceId>) -> &[ResourceState] {
        self.records
            .get(&resource.into())
            .map(|record| record.history.as_slice())
            .unwrap_or(&[])
    }

    /// Restart every history at the current state.
    pub fn clear_history(&mut self) {
        for record in self.records.values_mut() {
            record.history.clear();
            record.history.push(record.state);
        }
    }
}
