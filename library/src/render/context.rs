//! Two-phase render context initialization.
//!
//! Graphics drivers on at least one target platform forbid creating a shared
//! context while the parent context is current on another thread, so sibling
//! contexts are allocated on the controlling thread (phase 1) and finished on
//! the worker thread after a single-use ownership move (phase 2). The
//! finished context is thread-affine and cannot leave the thread that
//! completed it.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::LibraryError;
use crate::model::VideoParams;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The shared parent context, owned by the controlling thread.
pub struct SharedContext {
    id: u64,
}

impl SharedContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Phase 1: allocate a sibling context. Must run on the thread owning
    /// the shared parent, before the worker starts accepting jobs.
    pub fn create_sibling(&self) -> PendingContext {
        PendingContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            parent: self.id,
        }
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A context allocated in phase 1, awaiting phase 2 on its worker thread.
/// `Send`: the transfer to the worker is a single-use ownership move through
/// a one-shot channel.
pub struct PendingContext {
    id: u64,
    parent: u64,
}

impl PendingContext {
    /// Phase 2: finish setup (viewport, framebuffer) on the worker thread.
    /// Consumes the pending handle; failure permanently discards it.
    pub fn finish(self, params: VideoParams) -> Result<RenderContext, LibraryError> {
        if !params.is_valid() {
            return Err(LibraryError::render(format!(
                "context {}: invalid viewport {}x{} @ {}",
                self.id, params.width, params.height, params.frame_rate
            )));
        }
        Ok(RenderContext {
            id: self.id,
            parent: self.parent,
            params,
            _thread_affine: PhantomData,
        })
    }
}

/// A fully initialized render context, affinitized to the thread that
/// finished it for its entire lifetime (`!Send` through the raw-pointer
/// marker).
pub struct RenderContext {
    id: u64,
    parent: u64,
    params: VideoParams,
    _thread_affine: PhantomData<*const ()>,
}

impl RenderContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent_id(&self) -> u64 {
        self.parent
    }

    pub fn params(&self) -> &VideoParams {
        &self.params
    }

    /// Resize the viewport for a parameter change.
    pub fn set_viewport(&mut self, params: VideoParams) -> Result<(), LibraryError> {
        if !params.is_valid() {
            return Err(LibraryError::render("invalid viewport parameters"));
        }
        self.params = params;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siblings_share_the_parent() {
        let shared = SharedContext::new();
        let a = shared.create_sibling().finish(VideoParams::default()).unwrap();
        let b = shared.create_sibling().finish(VideoParams::default()).unwrap();
        assert_eq!(a.parent_id(), shared.id());
        assert_eq!(b.parent_id(), shared.id());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_phase_two_rejects_invalid_viewport() {
        let shared = SharedContext::new();
        let pending = shared.create_sibling();
        assert!(pending.finish(VideoParams::new(0, 0, 30.0)).is_err());
    }
}
