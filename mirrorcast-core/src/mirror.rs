//! Display mirroring: routing live screen content into the encoder's
//! input surface.
//!
//! The mirroring service itself is a platform collaborator behind the
//! [`DisplayMirror`] trait. [`MirrorBinding`] performs the one-time wiring
//! for a session and destroys the virtual display again when dropped.

use tracing::{debug, info};

use crate::encoder::InputSurface;
use crate::error::MirrorError;

/// Opaque handle to a physical or virtual display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayToken(pub u64);

/// Axis-aligned rectangle in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    /// Rectangle anchored at the origin.
    pub const fn sized(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Everything [`DisplayMirror::bind_surface`] applies in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBinding {
    pub display: DisplayToken,
    pub surface: InputSurface,
    /// Region of the source display to capture.
    pub source: Rect,
    /// Region of the surface to draw into.
    pub destination: Rect,
    pub layer_stack: u32,
}

/// Platform service that can mirror a display into a surface.
pub trait DisplayMirror: Send {
    /// Token of the built-in display, or `None` if there is none.
    fn primary_display_token(&mut self) -> Result<Option<DisplayToken>, MirrorError>;

    fn create_virtual_display(&mut self, name: &str, secure: bool)
    -> Result<DisplayToken, MirrorError>;

    /// Attach surface, projection and layer stack atomically.
    fn bind_surface(&mut self, binding: &SurfaceBinding) -> Result<(), MirrorError>;

    fn destroy_virtual_display(&mut self, display: &DisplayToken) -> Result<(), MirrorError>;
}

/// A live virtual display feeding one session's input surface.
pub struct MirrorBinding {
    mirror: Box<dyn DisplayMirror>,
    display: Option<DisplayToken>,
}

impl MirrorBinding {
    /// Create a virtual display named `name` and bind `surface` to it,
    /// projecting the top-left `surface.width × surface.height` region of
    /// the primary display's layer stack.
    pub fn bind(
        mirror: Box<dyn DisplayMirror>,
        surface: &InputSurface,
        name: &str,
    ) -> Result<Self, MirrorError> {
        let mut binding = Self {
            mirror,
            display: None,
        };

        binding
            .mirror
            .primary_display_token()?
            .ok_or(MirrorError::DisplayUnavailable)?;

        let display = binding.mirror.create_virtual_display(name, false)?;
        binding.display = Some(display.clone());

        let rect = Rect::sized(surface.width, surface.height);
        binding.mirror.bind_surface(&SurfaceBinding {
            display,
            surface: surface.clone(),
            source: rect,
            destination: rect,
            layer_stack: 0,
        })?;

        info!("{name} - display mirror active ({}x{})", rect.width(), rect.height());
        Ok(binding)
    }

    pub fn display(&self) -> Option<&DisplayToken> {
        self.display.as_ref()
    }

    /// Destroy the virtual display. Failures are logged and dropped.
    pub fn release(&mut self) {
        if let Some(token) = self.display.take() {
            match self.mirror.destroy_virtual_display(&token) {
                Ok(()) => debug!("virtual display {token:?} destroyed"),
                Err(e) => debug!("destroying virtual display failed: {e}"),
            }
        }
    }
}

impl Drop for MirrorBinding {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct FakeMirror {
        has_display: bool,
        fail_bind: bool,
        bound: Arc<Mutex<Vec<SurfaceBinding>>>,
        destroyed: Arc<Mutex<Vec<DisplayToken>>>,
    }

    impl DisplayMirror for FakeMirror {
        fn primary_display_token(&mut self) -> Result<Option<DisplayToken>, MirrorError> {
            Ok(self.has_display.then_some(DisplayToken(0)))
        }

        fn create_virtual_display(
            &mut self,
            _name: &str,
            _secure: bool,
        ) -> Result<DisplayToken, MirrorError> {
            Ok(DisplayToken(42))
        }

        fn bind_surface(&mut self, binding: &SurfaceBinding) -> Result<(), MirrorError> {
            if self.fail_bind {
                return Err(MirrorError::Mirror("transaction rejected".into()));
            }
            self.bound.lock().unwrap().push(binding.clone());
            Ok(())
        }

        fn destroy_virtual_display(&mut self, display: &DisplayToken) -> Result<(), MirrorError> {
            self.destroyed.lock().unwrap().push(display.clone());
            Ok(())
        }
    }

    fn surface() -> InputSurface {
        InputSurface {
            name: "enc".into(),
            width: 720,
            height: 1280,
        }
    }

    #[test]
    fn bind_projects_full_surface() {
        let mirror = FakeMirror {
            has_display: true,
            ..Default::default()
        };
        let bound = Arc::clone(&mirror.bound);
        let destroyed = Arc::clone(&mirror.destroyed);

        let binding = MirrorBinding::bind(Box::new(mirror), &surface(), "mirrorcast").unwrap();
        assert_eq!(binding.display(), Some(&DisplayToken(42)));

        let bound = bound.lock().unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].source, Rect::sized(720, 1280));
        assert_eq!(bound[0].destination, Rect::sized(720, 1280));
        assert_eq!(bound[0].layer_stack, 0);

        drop(binding);
        assert_eq!(*destroyed.lock().unwrap(), vec![DisplayToken(42)]);
    }

    #[test]
    fn release_destroys_display_once() {
        let mirror = FakeMirror {
            has_display: true,
            ..Default::default()
        };
        let destroyed = Arc::clone(&mirror.destroyed);

        let mut binding = MirrorBinding::bind(Box::new(mirror), &surface(), "mirrorcast").unwrap();
        binding.release();
        binding.release();
        assert!(binding.display().is_none());
        drop(binding);

        assert_eq!(*destroyed.lock().unwrap(), vec![DisplayToken(42)]);
    }

    #[test]
    fn missing_primary_display_is_reported() {
        let mirror = FakeMirror::default();
        let err = MirrorBinding::bind(Box::new(mirror), &surface(), "mirrorcast")
            .err()
            .unwrap();
        assert!(matches!(err, MirrorError::DisplayUnavailable));
    }

    #[test]
    fn failed_bind_destroys_virtual_display() {
        let mirror = FakeMirror {
            has_display: true,
            fail_bind: true,
            ..Default::default()
        };
        let destroyed = Arc::clone(&mirror.destroyed);

        assert!(MirrorBinding::bind(Box::new(mirror), &surface(), "mirrorcast").is_err());
        assert_eq!(*destroyed.lock().unwrap(), vec![DisplayToken(42)]);
    }
}
