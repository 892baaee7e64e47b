//! Swapchain listeners.
//!
//! Drawing systems own GPU resources sized from the swapchain (pipelines,
//! descriptor pools, per-image buffers). They register a
//! [`SwapchainListener`] and get called back whenever those resources have to
//! be destroyed and rebuilt.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use ember_renderer::backend::FrameBackend;
//! use ember_renderer::listener::{ListenerContext, SwapchainListener};
//! use ember_rhi::RhiResult;
//!
//! #[derive(Default)]
//! struct SpriteSystem {
//!     per_image: Vec<u32>,
//! }
//!
//! impl<B: FrameBackend> SwapchainListener<B> for SpriteSystem {
//!     fn on_cleanup(&mut self, _ctx: &ListenerContext<'_, B>) -> RhiResult<()> {
//!         self.per_image.clear();
//!         Ok(())
//!     }
//!
//!     fn on_recreate(&mut self, ctx: &ListenerContext<'_, B>) -> RhiResult<()> {
//!         self.per_image = vec![0; ctx.backend().image_count()];
//!         Ok(())
//!     }
//! }
//!
//! let sprites = Rc::new(RefCell::new(SpriteSystem::default()));
//! // renderer.register_listener(sprites.clone())?;
//! # drop(sprites);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use ember_core::FrameArenas;
use ember_rhi::{RhiError, RhiResult};
use tracing::debug;

use crate::backend::FrameBackend;

/// What a listener may touch while it runs.
pub struct ListenerContext<'a, B> {
    backend: &'a B,
    arenas: &'a FrameArenas,
}

impl<'a, B> ListenerContext<'a, B> {
    pub(crate) fn new(backend: &'a B, arenas: &'a FrameArenas) -> Self {
        Self { backend, arenas }
    }

    /// The backend: device handles, render pass, image count and extent.
    #[inline]
    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// The frame, persistent and swap-chain arenas.
    ///
    /// Reservations from the swap-chain arena are released right after every
    /// listener has run `on_cleanup`.
    #[inline]
    pub fn arenas(&self) -> &'a FrameArenas {
        self.arenas
    }
}

/// Callbacks around a swapchain rebuild.
///
/// `on_cleanup` runs with the device idle and the old swapchain resources
/// still alive; `on_recreate` runs once the new ones exist.
pub trait SwapchainListener<B: FrameBackend> {
    fn on_cleanup(&mut self, ctx: &ListenerContext<'_, B>) -> RhiResult<()>;

    fn on_recreate(&mut self, ctx: &ListenerContext<'_, B>) -> RhiResult<()>;
}

/// Listeners in registration order, bounded by a fixed capacity.
pub struct ListenerRegistry<B: FrameBackend> {
    listeners: Vec<Rc<RefCell<dyn SwapchainListener<B>>>>,
    capacity: usize,
}

impl<B: FrameBackend> ListenerRegistry<B> {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ListenerCapacityExceeded`] when the registry is full.
    pub fn register<L>(&mut self, listener: Rc<RefCell<L>>) -> RhiResult<()>
    where
        L: SwapchainListener<B> + 'static,
    {
        if self.listeners.len() >= self.capacity {
            return Err(RhiError::ListenerCapacityExceeded {
                capacity: self.capacity,
            });
        }

        self.listeners.push(listener);
        debug!(
            "Registered swapchain listener {}/{}",
            self.listeners.len(),
            self.capacity
        );
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Calls `on_cleanup` on every listener in registration order.
    pub fn notify_cleanup(&self, ctx: &ListenerContext<'_, B>) -> RhiResult<()> {
        for listener in &self.listeners {
            let mut listener = listener.try_borrow_mut().map_err(|_| already_borrowed())?;
            listener.on_cleanup(ctx)?;
        }
        Ok(())
    }

    /// Calls `on_recreate` on every listener in registration order.
    pub fn notify_recreate(&self, ctx: &ListenerContext<'_, B>) -> RhiResult<()> {
        for listener in &self.listeners {
            let mut listener = listener.try_borrow_mut().map_err(|_| already_borrowed())?;
            listener.on_recreate(ctx)?;
        }
        Ok(())
    }
}

fn already_borrowed() -> RhiError {
    RhiError::FrameState("swapchain listener is already borrowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_backend::MockBackend;

    struct Counter {
        cleanups: usize,
        recreates: usize,
    }

    impl SwapchainListener<MockBackend> for Counter {
        fn on_cleanup(&mut self, _ctx: &ListenerContext<'_, MockBackend>) -> RhiResult<()> {
            self.cleanups += 1;
            Ok(())
        }

        fn on_recreate(&mut self, _ctx: &ListenerContext<'_, MockBackend>) -> RhiResult<()> {
            self.recreates += 1;
            Ok(())
        }
    }

    fn counter() -> Rc<RefCell<Counter>> {
        Rc::new(RefCell::new(Counter {
            cleanups: 0,
            recreates: 0,
        }))
    }

    #[test]
    fn test_registry_capacity() {
        let mut registry = ListenerRegistry::<MockBackend>::new(2);
        assert!(registry.is_empty());

        registry.register(counter()).unwrap();
        registry.register(counter()).unwrap();
        assert_eq!(registry.len(), 2);

        let err = registry.register(counter()).unwrap_err();
        assert!(matches!(
            err,
            RhiError::ListenerCapacityExceeded { capacity: 2 }
        ));
        assert_eq!(registry.len(), registry.capacity());
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut registry = ListenerRegistry::<MockBackend>::new(0);
        assert!(registry.register(counter()).is_err());
    }

    #[test]
    fn test_notify_reaches_shared_handle() {
        let backend = MockBackend::new(2);
        let arenas = FrameArenas::new(64, 64, 64);
        let ctx = ListenerContext::new(&backend, &arenas);

        let listener = counter();
        let mut registry = ListenerRegistry::<MockBackend>::new(4);
        registry.register(listener.clone()).unwrap();

        registry.notify_cleanup(&ctx).unwrap();
        registry.notify_recreate(&ctx).unwrap();
        registry.notify_recreate(&ctx).unwrap();

        assert_eq!(listener.borrow().cleanups, 1);
        assert_eq!(listener.borrow().recreates, 2);
    }

    #[test]
    fn test_borrowed_listener_is_an_error() {
        let backend = MockBackend::new(2);
        let arenas = FrameArenas::new(64, 64, 64);
        let ctx = ListenerContext::new(&backend, &arenas);

        let listener = counter();
        let mut registry = ListenerRegistry::<MockBackend>::new(1);
        registry.register(listener.clone()).unwrap();

        let _held = listener.borrow();
        assert!(matches!(
            registry.notify_cleanup(&ctx),
            Err(RhiError::FrameState(_))
        ));
    }
}
