//! H.264 encoder pipeline ending in an `appsink`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info};

use crate::encoder::{
    BufferFlags, Capability, DrainResult, EncoderFormat, InputSurface, OutputBuffer, OutputFormat,
    VideoCodec,
};
use crate::error::MirrorError;

static CHANNELS: AtomicU64 = AtomicU64::new(0);

/// Encoder pipeline state for one session.
struct Running {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

pub struct GstCodec {
    encoder_element: &'static str,
    channel: String,
    format: Option<EncoderFormat>,
    running: Option<Running>,
    caps: Option<gst::Caps>,
    /// Sample held back while its format change is reported.
    pending: Option<gst::Sample>,
    outstanding: HashMap<usize, Bytes>,
    next_index: usize,
}

impl GstCodec {
    pub fn new(encoder_element: &'static str) -> Self {
        let channel = format!(
            "mirrorcast-{}-{}",
            std::process::id(),
            CHANNELS.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            encoder_element,
            channel,
            format: None,
            running: None,
            caps: None,
            pending: None,
            outstanding: HashMap::new(),
            next_index: 0,
        }
    }

    /// Encoder element with rate control and GOP length applied.
    fn encoder_description(&self, format: &EncoderFormat) -> String {
        let kbps = (format.bit_rate / 1000).max(1);
        let gop = (format.frame_rate as u64 * format.i_frame_interval.as_secs()).max(1);
        match self.encoder_element {
            "x264enc" => format!(
                "x264enc tune=zerolatency speed-preset=ultrafast bitrate={kbps} key-int-max={gop}"
            ),
            "vaapih264enc" => {
                format!("vaapih264enc rate-control=cbr bitrate={kbps} keyframe-period={gop}")
            }
            "nvh264enc" => format!("nvh264enc bitrate={kbps} gop-size={gop}"),
            other => other.to_string(),
        }
    }

    fn pipeline_description(&self, format: &EncoderFormat) -> String {
        // intervideosrc keeps emitting the last frame at the caps rate,
        // so an idle screen still produces output.
        let config_interval = if format.inline_parameter_sets { -1 } else { 0 };
        format!(
            "intervideosrc channel={channel} ! \
             video/x-raw,width={w},height={h},framerate={fps}/1 ! \
             videoconvert ! \
             {encoder} ! \
             h264parse config-interval={config_interval} ! \
             video/x-h264,stream-format=byte-stream,alignment=au,profile={profile} ! \
             appsink name=sink",
            channel = self.channel,
            w = format.width,
            h = format.height,
            fps = format.frame_rate,
            encoder = self.encoder_description(format),
            profile = format.profile.caps_name(),
        )
    }

    fn running(&self) -> Result<&Running, MirrorError> {
        self.running
            .as_ref()
            .ok_or(MirrorError::InvalidState("encoder pipeline is not configured"))
    }

    /// Surface the first error posted on the pipeline bus, if any.
    fn check_bus(&self) -> Result<(), MirrorError> {
        let running = self.running()?;
        let Some(bus) = running.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                return Err(MirrorError::Codec(format!(
                    "pipeline error: {} ({:?})",
                    err.error(),
                    err.debug()
                )));
            }
        }
        Ok(())
    }

    fn output_format(caps: &gst::CapsRef) -> OutputFormat {
        let Some(s) = caps.structure(0) else {
            return OutputFormat::default();
        };
        OutputFormat {
            width: s.get::<i32>("width").unwrap_or(0).max(0) as u32,
            height: s.get::<i32>("height").unwrap_or(0).max(0) as u32,
            parameter_sets: Vec::new(),
        }
    }

    fn take_buffer(&mut self, sample: &gst::Sample) -> Result<DrainResult, MirrorError> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| MirrorError::Codec("sample contains no buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| MirrorError::Codec("failed to map buffer".into()))?;
        let data = Bytes::copy_from_slice(map.as_slice());

        let mut flags = BufferFlags::empty();
        if !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT) {
            flags |= BufferFlags::KEY_FRAME;
        }
        if buffer.flags().contains(gst::BufferFlags::HEADER) {
            flags |= BufferFlags::CODEC_CONFIG;
        }

        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        let size = data.len();
        self.outstanding.insert(index, data);

        Ok(DrainResult::Buffer(OutputBuffer {
            index,
            offset: 0,
            size,
            flags,
            pts_us: buffer.pts().map(|t| t.useconds()).unwrap_or(0),
        }))
    }
}

#[async_trait]
impl VideoCodec for GstCodec {
    fn probe(&mut self, capability: Capability) -> Result<(), MirrorError> {
        match capability {
            Capability::InlineParameterSets => {
                let parser = gst::ElementFactory::make("h264parse")
                    .build()
                    .map_err(|e| MirrorError::Codec(format!("h264parse unavailable: {e}")))?;
                parser
                    .find_property("config-interval")
                    .map(|_| ())
                    .ok_or_else(|| MirrorError::Codec("h264parse has no config-interval".into()))
            }
        }
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), MirrorError> {
        let description = self.pipeline_description(format);
        debug!("encoder pipeline: {description}");
        debug!("level {:?} left to {}", format.level, self.encoder_element);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| MirrorError::Configure(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| MirrorError::Configure("launch did not produce a pipeline".into()))?;
        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| MirrorError::Configure("pipeline has no appsink".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| MirrorError::Configure("sink is not an appsink".into()))?;

        appsink.set_property("emit-signals", false);
        appsink.set_property("sync", false);

        self.running = Some(Running { pipeline, appsink });
        self.format = Some(format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<InputSurface, MirrorError> {
        let format = self
            .format
            .as_ref()
            .ok_or(MirrorError::InvalidState("encoder pipeline is not configured"))?;
        Ok(InputSurface {
            name: self.channel.clone(),
            width: format.width,
            height: format.height,
        })
    }

    fn start(&mut self) -> Result<(), MirrorError> {
        let running = self.running()?;
        running
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MirrorError::Codec(format!("failed to start encoder: {e:?}")))?;
        info!("encoder pipeline playing on channel {}", self.channel);
        Ok(())
    }

    async fn dequeue_output_buffer(
        &mut self,
        timeout: Duration,
    ) -> Result<DrainResult, MirrorError> {
        if let Some(sample) = self.pending.take() {
            return self.take_buffer(&sample);
        }

        let appsink = self.running()?.appsink.clone();
        let wait = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        let sample = tokio::task::spawn_blocking(move || appsink.try_pull_sample(wait))
            .await
            .map_err(|e| MirrorError::Codec(format!("pull task failed: {e}")))?;

        let Some(sample) = sample else {
            self.check_bus()?;
            if self.running()?.appsink.is_eos() {
                return Err(MirrorError::Codec("encoder pipeline reached end of stream".into()));
            }
            return Ok(DrainResult::TryAgain);
        };

        let caps = sample.caps_owned();
        if caps.is_some() && caps != self.caps {
            let format = caps
                .as_ref()
                .map(|c| Self::output_format(c))
                .unwrap_or_default();
            self.caps = caps;
            self.pending = Some(sample);
            return Ok(DrainResult::FormatChanged(format));
        }

        self.take_buffer(&sample)
    }

    fn output_payload(&mut self, buffer: &OutputBuffer) -> Result<Bytes, MirrorError> {
        let data = self
            .outstanding
            .get(&buffer.index)
            .ok_or_else(|| MirrorError::Codec(format!("buffer {} is not dequeued", buffer.index)))?;
        let end = buffer.offset + buffer.size;
        if end > data.len() {
            return Err(MirrorError::Codec(format!(
                "buffer {} window exceeds {} bytes",
                buffer.index,
                data.len()
            )));
        }
        Ok(data.slice(buffer.offset..end))
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<(), MirrorError> {
        self.outstanding
            .remove(&index)
            .map(|_| ())
            .ok_or_else(|| MirrorError::Codec(format!("buffer {index} released but not dequeued")))
    }

    fn stop(&mut self) -> Result<(), MirrorError> {
        let running = self.running()?;
        running
            .pipeline
            .set_state(gst::State::Null)
            .map_err(|e| MirrorError::Codec(format!("failed to stop encoder: {e:?}")))?;
        Ok(())
    }

    fn release(&mut self) -> Result<(), MirrorError> {
        if let Some(running) = self.running.take() {
            running
                .pipeline
                .set_state(gst::State::Null)
                .map_err(|e| MirrorError::Codec(format!("failed to release encoder: {e:?}")))?;
        }
        self.outstanding.clear();
        self.pending = None;
        self.caps = None;
        Ok(())
    }

    fn release_input_surface(&mut self) -> Result<(), MirrorError> {
        // The channel has no resources of its own; it disappears with
        // the pipelines on both ends.
        self.format = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_pin_profile_but_not_level() {
        let codec = GstCodec::new("x264enc");
        let description = codec.pipeline_description(&EncoderFormat::avc(720, 1280, 4_000_000));
        assert!(description.contains("profile=baseline"));
        assert!(!description.contains("level="));
        assert!(description.contains("video/x-raw,width=720,height=1280,framerate=60/1"));
        assert!(description.contains("bitrate=4000 key-int-max=60"));
    }
}
