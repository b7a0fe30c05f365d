//! X11 screen capture feeding an encoder's `intervideo` channel.

use std::collections::HashMap;

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::debug;

use crate::error::MirrorError;
use crate::mirror::{DisplayMirror, DisplayToken, SurfaceBinding};

/// A virtual display that has been created but maybe not bound yet.
struct VirtualDisplay {
    name: String,
    pipeline: Option<gst::Pipeline>,
}

pub struct GstDisplayMirror {
    displays: HashMap<u64, VirtualDisplay>,
    next_token: u64,
}

impl GstDisplayMirror {
    pub fn new() -> Self {
        Self {
            displays: HashMap::new(),
            next_token: 1,
        }
    }

    fn capture_description(binding: &SurfaceBinding) -> String {
        let src = binding.source;
        let dst = binding.destination;
        format!(
            "ximagesrc use-damage=false startx={sx} starty={sy} endx={ex} endy={ey} ! \
             videoscale ! videoconvert ! \
             video/x-raw,width={dw},height={dh} ! \
             intervideosink channel={channel}",
            sx = src.left,
            sy = src.top,
            ex = src.right.saturating_sub(1),
            ey = src.bottom.saturating_sub(1),
            dw = dst.width(),
            dh = dst.height(),
            channel = binding.surface.name,
        )
    }
}

impl Default for GstDisplayMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayMirror for GstDisplayMirror {
    fn primary_display_token(&mut self) -> Result<Option<DisplayToken>, MirrorError> {
        if std::env::var_os("DISPLAY").is_none() {
            return Ok(None);
        }
        if gst::ElementFactory::find("ximagesrc").is_none() {
            return Ok(None);
        }
        Ok(Some(DisplayToken(0)))
    }

    fn create_virtual_display(
        &mut self,
        name: &str,
        _secure: bool,
    ) -> Result<DisplayToken, MirrorError> {
        let token = self.next_token;
        self.next_token += 1;
        self.displays.insert(
            token,
            VirtualDisplay {
                name: name.to_string(),
                pipeline: None,
            },
        );
        Ok(DisplayToken(token))
    }

    /// Build and start the capture pipeline. Either the pipeline is
    /// playing afterwards or nothing is left behind.
    fn bind_surface(&mut self, binding: &SurfaceBinding) -> Result<(), MirrorError> {
        let target = self
            .displays
            .get_mut(&binding.display.0)
            .ok_or_else(|| MirrorError::Mirror(format!("unknown display {:?}", binding.display)))?;
        if binding.layer_stack != 0 {
            debug!("layer stack {} ignored by X11 capture", binding.layer_stack);
        }

        let description = Self::capture_description(binding);
        debug!("{} capture pipeline: {description}", target.name);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| MirrorError::Mirror(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| MirrorError::Mirror("launch did not produce a pipeline".into()))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(MirrorError::Mirror(format!("capture failed to start: {e:?}")));
        }

        if let Some(old) = target.pipeline.replace(pipeline) {
            let _ = old.set_state(gst::State::Null);
        }
        Ok(())
    }

    fn destroy_virtual_display(&mut self, display: &DisplayToken) -> Result<(), MirrorError> {
        let removed = self
            .displays
            .remove(&display.0)
            .ok_or_else(|| MirrorError::Mirror(format!("unknown display {display:?}")))?;
        if let Some(pipeline) = removed.pipeline {
            pipeline
                .set_state(gst::State::Null)
                .map_err(|e| MirrorError::Mirror(format!("capture failed to stop: {e:?}")))?;
        }
        Ok(())
    }
}
