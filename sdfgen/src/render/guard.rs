//! Exclusive, state-forcing access to a shared rendering context
//!
//! A graphics context is a process-wide singleton with mutable settings, so
//! concurrent samplers must take turns and must not leak their settings into
//! each other.  [`RenderGuard`] owns the context; each call to
//! [`RenderGuard::render`] checks it out, forces
//! [`RenderState::SURFACE_SAMPLING`], renders, then restores the
//! caller-visible settings and returns the context, on every exit path
//! including panics.
use super::{CameraPose, DepthImage, NormalImage, RenderState, Renderer};
use crate::{Error, mesh::Mesh};
use std::{
    sync::{
        Condvar, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Usage counters for a [`RenderGuard`]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GuardStats {
    /// Number of completed render calls
    pub renders: usize,
    /// Largest number of renders ever observed in flight at once
    pub max_overlap: usize,
}

/// Owner of the single rendering context
pub struct RenderGuard {
    slot: Mutex<Option<Box<dyn Renderer>>>,
    returned: Condvar,
    timeout: Duration,

    active: AtomicUsize,
    max_overlap: AtomicUsize,
    renders: AtomicUsize,
}

impl std::fmt::Debug for RenderGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGuard")
            .field("timeout", &self.timeout)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl RenderGuard {
    /// Takes ownership of a renderer
    ///
    /// Callers wait at most `timeout` for the context before failing with
    /// [`Error::ResourceContention`].
    pub fn new<R: Renderer + 'static>(renderer: R, timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(Some(Box::new(renderer))),
            returned: Condvar::new(),
            timeout,
            active: AtomicUsize::new(0),
            max_overlap: AtomicUsize::new(0),
            renders: AtomicUsize::new(0),
        }
    }

    /// Renders surface normals and depth for one viewpoint
    ///
    /// Blocks until the context is free.  The context's own settings are
    /// unchanged when this returns, whether it succeeds or not.
    pub fn render(
        &self,
        mesh: &Mesh,
        camera: &CameraPose,
        resolution: u32,
    ) -> Result<(NormalImage, DepthImage), Error> {
        // Drop order matters: settings are restored, then the in-flight
        // counter is released, then the context goes back in the slot
        let mut checkout = self.checkout()?;
        let _active = InFlight::enter(self);
        let mut scope =
            StateScope::new(checkout.renderer(), RenderState::SURFACE_SAMPLING);
        let frame = scope.renderer.render(mesh, camera, resolution)?;
        self.renders.fetch_add(1, Ordering::Relaxed);
        Ok((frame.image, frame.depth))
    }

    /// Returns the context's current settings
    pub fn state(&self) -> Result<RenderState, Error> {
        let mut checkout = self.checkout()?;
        Ok(checkout.renderer().state())
    }

    /// Replaces the context's settings
    ///
    /// These are the settings visible outside of [`RenderGuard::render`].
    pub fn set_state(&self, state: RenderState) -> Result<(), Error> {
        let mut checkout = self.checkout()?;
        checkout.renderer().set_state(state);
        Ok(())
    }

    /// Returns usage counters
    pub fn stats(&self) -> GuardStats {
        GuardStats {
            renders: self.renders.load(Ordering::Relaxed),
            max_overlap: self.max_overlap.load(Ordering::SeqCst),
        }
    }

    fn checkout(&self) -> Result<Checkout<'_>, Error> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut slot, _) = self
            .returned
            .wait_timeout_while(slot, self.timeout, |s| s.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match slot.take() {
            Some(renderer) => Ok(Checkout {
                guard: self,
                renderer: Some(renderer),
            }),
            None => {
                log::warn!(
                    "render context still busy after {:?}",
                    self.timeout
                );
                Err(Error::ResourceContention(self.timeout))
            }
        }
    }
}

/// A renderer taken out of its slot, returned on drop
struct Checkout<'a> {
    guard: &'a RenderGuard,
    renderer: Option<Box<dyn Renderer>>,
}

impl Checkout<'_> {
    fn renderer(&mut self) -> &mut dyn Renderer {
        // Only `Drop` takes the renderer out
        match self.renderer.as_mut() {
            Some(r) => r.as_mut(),
            None => unreachable!("renderer taken before drop"),
        }
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        let mut slot = self
            .guard
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = self.renderer.take();
        drop(slot);
        self.guard.returned.notify_one();
    }
}

/// Forces settings on a renderer, restoring the old ones on drop
struct StateScope<'a> {
    renderer: &'a mut dyn Renderer,
    prior: RenderState,
}

impl<'a> StateScope<'a> {
    fn new(renderer: &'a mut dyn Renderer, state: RenderState) -> Self {
        let prior = renderer.state();
        renderer.set_state(state);
        Self { renderer, prior }
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.renderer.set_state(self.prior);
    }
}

/// Tracks how many renders are in flight
struct InFlight<'a>(&'a RenderGuard);

impl<'a> InFlight<'a> {
    fn enter(guard: &'a RenderGuard) -> Self {
        let n = guard.active.fetch_add(1, Ordering::SeqCst) + 1;
        guard.max_overlap.fetch_max(n, Ordering::SeqCst);
        Self(guard)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mesh::primitives,
        render::{Frame, OutputMode, Rasterizer},
    };
    use std::sync::Arc;

    /// Renderer that records the settings it sees and can be told to fail
    struct Instrumented {
        inner: Rasterizer,
        seen: Arc<Mutex<Vec<RenderState>>>,
        fail: Option<bool>, // Some(true) panics, Some(false) errors
    }

    impl Renderer for Instrumented {
        fn state(&self) -> RenderState {
            self.inner.state()
        }
        fn set_state(&mut self, state: RenderState) {
            self.inner.set_state(state)
        }
        fn render(
            &mut self,
            mesh: &Mesh,
            camera: &CameraPose,
            resolution: u32,
        ) -> Result<Frame, Error> {
            self.seen.lock().unwrap().push(self.inner.state());
            match self.fail {
                Some(true) => panic!("renderer exploded"),
                Some(false) => Err(Error::BadResolution(resolution)),
                None => self.inner.render(mesh, camera, resolution),
            }
        }
    }

    const DISPLAY: RenderState = RenderState {
        mode: OutputMode::Color,
        multisample: true,
    };

    fn instrumented(
        fail: Option<bool>,
    ) -> (RenderGuard, Arc<Mutex<Vec<RenderState>>>) {
        let seen = Arc::new(Mutex::new(vec![]));
        let r = Instrumented {
            inner: Rasterizer::with_state(DISPLAY),
            seen: seen.clone(),
            fail,
        };
        (RenderGuard::new(r, Duration::from_secs(30)), seen)
    }

    fn camera() -> CameraPose {
        CameraPose::looking_at_origin([0.0, 0.0, 2.0].into(), 1.0)
    }

    #[test]
    fn concurrent_renders_are_serialized() {
        let (guard, seen) = instrumented(None);
        let mesh = primitives::cube(0.5);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10 {
                        let (normals, depth) =
                            guard.render(&mesh, &camera(), 8).unwrap();
                        assert_eq!(normals.width(), 8);
                        assert_eq!(depth.height(), 8);
                    }
                });
            }
        });
        let stats = guard.stats();
        assert_eq!(stats.renders, 80);
        assert_eq!(stats.max_overlap, 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 80);
        assert!(seen.iter().all(|s| *s == RenderState::SURFACE_SAMPLING));
        assert_eq!(guard.state().unwrap(), DISPLAY);
    }

    #[test]
    fn state_restored_after_error() {
        let (guard, seen) = instrumented(Some(false));
        let r = guard.render(&primitives::cube(0.5), &camera(), 8);
        assert!(matches!(r, Err(Error::BadResolution(8))));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(guard.state().unwrap(), DISPLAY);
        assert_eq!(guard.stats().renders, 0);
    }

    #[test]
    fn state_restored_after_panic() {
        let (guard, _seen) = instrumented(Some(true));
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.render(&primitives::cube(0.5), &camera(), 8)
        }));
        assert!(r.is_err());

        // The context came back with its settings intact
        assert_eq!(guard.state().unwrap(), DISPLAY);
        guard.set_state(RenderState::SURFACE_SAMPLING).unwrap();
        assert_eq!(guard.state().unwrap(), RenderState::SURFACE_SAMPLING);
    }

    #[test]
    fn contention_times_out() {
        let guard = RenderGuard::new(
            Rasterizer::with_state(DISPLAY),
            Duration::from_millis(20),
        );
        let held = guard.checkout().unwrap();
        std::thread::scope(|s| {
            let r = s
                .spawn(|| guard.render(&primitives::cube(0.5), &camera(), 8))
                .join()
                .unwrap();
            assert!(matches!(r, Err(Error::ResourceContention(..))));
        });
        drop(held);
        assert!(guard.render(&primitives::cube(0.5), &camera(), 8).is_ok());
    }
}
