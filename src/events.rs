//! Platform event routing.
//!
//! An [`EventRouter`] owns the renderer (anything implementing
//! [`EventSink`]) and translates window-level events into renderer calls.
//! Rendering pauses while the window is minimized or being dragged, and a
//! resize received during a drag is deferred until the drag ends:
//!
//! ```text
//! EnterSizeMove  Resized  Resized  Resized  ExitSizeMove
//!      │            └────────┴────────┘           │
//!   paused            (pending size)        single resize
//! ```

use crate::error::GraphicsResult;
use crate::frame::FrameRenderer;
use crate::pipeline::QualityToggles;

/// Window and input events the renderer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    Resized { width: u32, height: u32 },
    Minimized,
    Restored,
    /// The user started dragging the window border.
    EnterSizeMove,
    /// The user released the window border.
    ExitSizeMove,
    ToggleWireframe,
    ToggleMsaa,
    CloseRequested,
}

/// Renderer operations driven by platform events.
pub trait EventSink {
    fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()>;
    fn set_wireframe(&mut self, enabled: bool) -> GraphicsResult<()>;
    fn set_msaa(&mut self, enabled: bool) -> GraphicsResult<()>;
    fn toggles(&self) -> QualityToggles;
}

impl EventSink for FrameRenderer {
    fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()> {
        FrameRenderer::resize(self, width, height)
    }

    fn set_wireframe(&mut self, enabled: bool) -> GraphicsResult<()> {
        FrameRenderer::set_wireframe(self, enabled)
    }

    fn set_msaa(&mut self, enabled: bool) -> GraphicsResult<()> {
        FrameRenderer::set_msaa(self, enabled)
    }

    fn toggles(&self) -> QualityToggles {
        FrameRenderer::toggles(self)
    }
}

#[derive(Debug)]
pub struct EventRouter<S> {
    sink: S,
    minimized: bool,
    resizing: bool,
    pending_size: Option<(u32, u32)>,
    close_requested: bool,
}

impl<S: EventSink> EventRouter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            minimized: false,
            resizing: false,
            pending_size: None,
            close_requested: false,
        }
    }

    /// Apply one event.
    pub fn handle(&mut self, event: PlatformEvent) -> GraphicsResult<()> {
        log::trace!("platform event {event:?}");
        match event {
            PlatformEvent::Resized { width, height } => {
                if width == 0 || height == 0 {
                    self.minimized = true;
                } else if self.resizing {
                    self.pending_size = Some((width, height));
                } else {
                    self.minimized = false;
                    self.sink.resize(width, height)?;
                }
            }
            PlatformEvent::Minimized => self.minimized = true,
            PlatformEvent::Restored => {
                self.minimized = false;
                if let Some((width, height)) = self.pending_size.take() {
                    self.sink.resize(width, height)?;
                }
            }
            PlatformEvent::EnterSizeMove => self.resizing = true,
            PlatformEvent::ExitSizeMove => {
                self.resizing = false;
                if let Some((width, height)) = self.pending_size.take() {
                    self.sink.resize(width, height)?;
                }
            }
            PlatformEvent::ToggleWireframe => {
                let enabled = !self.sink.toggles().contains(QualityToggles::WIREFRAME);
                self.sink.set_wireframe(enabled)?;
            }
            PlatformEvent::ToggleMsaa => {
                let enabled = !self.sink.toggles().contains(QualityToggles::MSAA);
                self.sink.set_msaa(enabled)?;
            }
            PlatformEvent::CloseRequested => self.close_requested = true,
        }
        Ok(())
    }

    /// Whether the frame loop should render this iteration.
    pub fn should_render(&self) -> bool {
        !self.minimized && !self.resizing && !self.close_requested
    }

    pub fn is_paused(&self) -> bool {
        self.minimized || self.resizing
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn pending_size(&self) -> Option<(u32, u32)> {
        self.pending_size
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        resizes: Vec<(u32, u32)>,
        toggles: QualityToggles,
    }

    impl EventSink for Recorder {
        fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()> {
            self.resizes.push((width, height));
            Ok(())
        }

        fn set_wireframe(&mut self, enabled: bool) -> GraphicsResult<()> {
            self.toggles.set(QualityToggles::WIREFRAME, enabled);
            Ok(())
        }

        fn set_msaa(&mut self, enabled: bool) -> GraphicsResult<()> {
            self.toggles.set(QualityToggles::MSAA, enabled);
            Ok(())
        }

        fn toggles(&self) -> QualityToggles {
            self.toggles
        }
    }

    #[test]
    fn test_resize_deferred_during_drag() {
        let mut router = EventRouter::new(Recorder::default());
        router.handle(PlatformEvent::EnterSizeMove).unwrap();
        assert!(!router.should_render());

        router.handle(PlatformEvent::Resized { width: 800, height: 600 }).unwrap();
        router.handle(PlatformEvent::Resized { width: 900, height: 700 }).unwrap();
        assert!(router.sink().resizes.is_empty());
        assert_eq!(router.pending_size(), Some((900, 700)));

        router.handle(PlatformEvent::ExitSizeMove).unwrap();
        assert_eq!(router.sink().resizes, vec![(900, 700)]);
        assert!(router.should_render());
    }

    #[test]
    fn test_zero_size_pauses() {
        let mut router = EventRouter::new(Recorder::default());
        router.handle(PlatformEvent::Resized { width: 0, height: 0 }).unwrap();
        assert!(router.is_paused());
        assert!(router.sink().resizes.is_empty());

        router.handle(PlatformEvent::Resized { width: 640, height: 480 }).unwrap();
        assert!(!router.is_paused());
        assert_eq!(router.sink().resizes, vec![(640, 480)]);
    }

    #[test]
    fn test_toggle_keys_flip_quality() {
        let mut router = EventRouter::new(Recorder::default());
        router.handle(PlatformEvent::ToggleMsaa).unwrap();
        router.handle(PlatformEvent::ToggleWireframe).unwrap();
        router.handle(PlatformEvent::ToggleWireframe).unwrap();
        assert_eq!(router.sink().toggles, QualityToggles::MSAA);
    }

    #[test]
    fn test_close_stops_rendering() {
        let mut router = EventRouter::new(Recorder::default());
        router.handle(PlatformEvent::CloseRequested).unwrap();
        assert!(router.close_requested());
        assert!(!router.should_render());
        assert!(router.into_inner().resizes.is_empty());
    }
}
