//! Replay backend: plays back pre-encoded H.264 through the same
//! encoder lifecycle as a hardware codec.
//!
//! Useful for driving a viewer without capture hardware, and for
//! exercising the session pipeline deterministically. A [`ReplayScript`]
//! lists what the "encoder" emits; a shared [`ReplayLog`] records what
//! the pipeline did with it (buffers dequeued and released, lifecycle
//! calls, display bindings).
//!
//! Like a real codec, the replay codec has a small fixed pool of output
//! buffers. A buffer that is never released keeps its slot busy, and the
//! codec fails once the pool is exhausted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::backend::MediaBackend;
use crate::encoder::{
    BufferFlags, Capability, DrainResult, EncoderFormat, InputSurface, OutputBuffer, OutputFormat,
    VideoCodec, format::MIME_AVC,
};
use crate::error::MirrorError;
use crate::mirror::{DisplayMirror, DisplayToken, SurfaceBinding};

/// Output buffers the codec can have in flight.
pub const OUTPUT_POOL_SIZE: usize = 4;

// ── Script ───────────────────────────────────────────────────────

/// One step of encoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    /// An access unit.
    Unit { payload: Bytes, flags: BufferFlags },
    /// A zero-size output buffer.
    Empty,
    /// An output format change notification.
    FormatChanged(OutputFormat),
    /// One poll that times out with nothing ready.
    Idle,
    /// The codec fails while draining.
    Fail(String),
}

/// What a [`ReplayCodec`] will emit, and how.
#[derive(Debug, Clone, Default)]
pub struct ReplayScript {
    events: Vec<ReplayEvent>,
    looping: bool,
    frame_interval: Option<Duration>,
    configure_error: Option<String>,
    no_inline_parameter_sets: bool,
}

impl ReplayScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(mut self, payload: impl Into<Bytes>) -> Self {
        self.events.push(ReplayEvent::Unit {
            payload: payload.into(),
            flags: BufferFlags::empty(),
        });
        self
    }

    pub fn event(mut self, event: ReplayEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn empty(self) -> Self {
        self.event(ReplayEvent::Empty)
    }

    pub fn format_changed(self, format: OutputFormat) -> Self {
        self.event(ReplayEvent::FormatChanged(format))
    }

    pub fn end_of_stream(mut self) -> Self {
        match self.events.last_mut() {
            Some(ReplayEvent::Unit { flags, .. }) => *flags |= BufferFlags::END_OF_STREAM,
            _ => self.events.push(ReplayEvent::Unit {
                payload: Bytes::new(),
                flags: BufferFlags::END_OF_STREAM,
            }),
        }
        self
    }

    /// Start over from the first event once the script runs out.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Emit at most one unit per `interval` (e.g. one frame at 60 fps).
    pub fn paced(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Make `configure` fail with `message`.
    pub fn failing_configure(mut self, message: impl Into<String>) -> Self {
        self.configure_error = Some(message.into());
        self
    }

    /// Pretend the codec cannot inline SPS/PPS.
    pub fn without_inline_parameter_sets(mut self) -> Self {
        self.no_inline_parameter_sets = true;
        self
    }

    pub fn events(&self) -> &[ReplayEvent] {
        &self.events
    }

    /// Split an Annex-B elementary stream into access units.
    ///
    /// Parameter sets and SEI are attached to the picture that follows
    /// them; a unit holding an IDR slice is flagged as a keyframe.
    pub fn from_annexb(stream: &[u8]) -> Self {
        let mut script = Self::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut key = false;

        for nal in split_nal_units(stream) {
            let Some(&header) = nal.get(start_code_len(nal)) else {
                continue;
            };
            let nal_type = header & 0x1F;
            pending.extend_from_slice(nal);
            key |= nal_type == 5;

            if (1..=5).contains(&nal_type) {
                let flags = if key {
                    BufferFlags::KEY_FRAME
                } else {
                    BufferFlags::empty()
                };
                script.events.push(ReplayEvent::Unit {
                    payload: Bytes::from(std::mem::take(&mut pending)),
                    flags,
                });
                key = false;
            }
        }

        if !pending.is_empty() {
            script.events.push(ReplayEvent::Unit {
                payload: Bytes::from(pending),
                flags: BufferFlags::CODEC_CONFIG,
            });
        }
        script
    }
}

fn start_code_len(nal: &[u8]) -> usize {
    if nal.starts_with(&[0, 0, 0, 1]) {
        4
    } else if nal.starts_with(&[0, 0, 1]) {
        3
    } else {
        0
    }
}

/// Slices of `stream`, each starting at a start code and running up to
/// the next one.
fn split_nal_units(stream: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= stream.len() {
        if stream[i..i + 3] == [0, 0, 1] {
            let start = if i > 0 && stream[i - 1] == 0 { i - 1 } else { i };
            starts.push(start);
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(stream.len());
            &stream[start..end]
        })
        .collect()
}

// ── Log ──────────────────────────────────────────────────────────

/// Everything the pipeline did to replay resources.
#[derive(Debug, Default, Clone)]
pub struct ReplayRecord {
    /// Lifecycle calls in order (`configure`, `start`, `stop`, ...).
    pub calls: Vec<&'static str>,
    pub dequeued: Vec<usize>,
    pub released: Vec<usize>,
    pub bindings: Vec<SurfaceBinding>,
    pub destroyed_displays: Vec<DisplayToken>,
    pub format: Option<EncoderFormat>,
}

impl ReplayRecord {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

/// Shared, cloneable handle to a [`ReplayRecord`].
#[derive(Debug, Default, Clone)]
pub struct ReplayLog(Arc<Mutex<ReplayRecord>>);

impl ReplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record so far.
    pub fn snapshot(&self) -> ReplayRecord {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ReplayRecord> {
        // A panicking test thread must not hide what was recorded.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn call(&self, name: &'static str) {
        self.lock().calls.push(name);
    }
}

// ── ReplayCodec ──────────────────────────────────────────────────

/// A [`VideoCodec`] that emits a scripted sequence of buffers.
pub struct ReplayCodec {
    script: ReplayScript,
    queue: VecDeque<ReplayEvent>,
    pool: [Option<Bytes>; OUTPUT_POOL_SIZE],
    next_slot: usize,
    next_due: Option<Instant>,
    pts_us: u64,
    started: bool,
    surface: Option<InputSurface>,
    format: Option<EncoderFormat>,
    log: ReplayLog,
}

impl ReplayCodec {
    pub fn new(script: ReplayScript, log: ReplayLog) -> Self {
        let queue = script.events.iter().cloned().collect();
        Self {
            script,
            queue,
            pool: Default::default(),
            next_slot: 0,
            next_due: None,
            pts_us: 0,
            started: false,
            surface: None,
            format: None,
            log,
        }
    }

    fn next_event(&mut self) -> Option<ReplayEvent> {
        if self.queue.is_empty() && self.script.looping {
            self.queue.extend(self.script.events.iter().cloned());
        }
        self.queue.pop_front()
    }

    /// Hand out the next output slot, failing if the caller is holding
    /// on to all of them.
    fn occupy(&mut self, payload: Bytes) -> Result<usize, MirrorError> {
        for step in 0..OUTPUT_POOL_SIZE {
            let index = (self.next_slot + step) % OUTPUT_POOL_SIZE;
            if self.pool[index].is_none() {
                self.pool[index] = Some(payload);
                self.next_slot = (index + 1) % OUTPUT_POOL_SIZE;
                return Ok(index);
            }
        }
        Err(MirrorError::Codec("all output buffers are in use".into()))
    }

    fn emit(&mut self, payload: Bytes, flags: BufferFlags) -> Result<DrainResult, MirrorError> {
        let size = payload.len();
        let index = self.occupy(payload)?;
        self.log.lock().dequeued.push(index);

        let pts_us = self.pts_us;
        if let Some(format) = &self.format {
            self.pts_us += format.frame_interval().as_micros() as u64;
        }

        Ok(DrainResult::Buffer(OutputBuffer {
            index,
            offset: 0,
            size,
            flags,
            pts_us,
        }))
    }
}

#[async_trait]
impl VideoCodec for ReplayCodec {
    fn probe(&mut self, _capability: Capability) -> Result<(), MirrorError> {
        self.log.call("probe");
        if self.script.no_inline_parameter_sets {
            return Err(MirrorError::Codec("unsupported key".into()));
        }
        Ok(())
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), MirrorError> {
        self.log.call("configure");
        if let Some(message) = &self.script.configure_error {
            return Err(MirrorError::Configure(message.clone()));
        }
        if format.mime != MIME_AVC {
            return Err(MirrorError::Configure(format!("unsupported mime {}", format.mime)));
        }
        self.format = Some(format.clone());
        self.log.lock().format = Some(format.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<InputSurface, MirrorError> {
        self.log.call("create_input_surface");
        let format = self
            .format
            .as_ref()
            .ok_or(MirrorError::InvalidState("codec is not configured"))?;
        let surface = InputSurface {
            name: "replay".into(),
            width: format.width,
            height: format.height,
        };
        self.surface = Some(surface.clone());
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), MirrorError> {
        self.log.call("start");
        self.started = true;
        Ok(())
    }

    async fn dequeue_output_buffer(
        &mut self,
        timeout: Duration,
    ) -> Result<DrainResult, MirrorError> {
        if !self.started {
            return Err(MirrorError::InvalidState("codec is not started"));
        }

        if let (Some(interval), Some(due)) = (self.script.frame_interval, self.next_due) {
            let now = Instant::now();
            if now < due {
                let wait = (due - now).min(timeout);
                tokio::time::sleep(wait).await;
                if Instant::now() < due {
                    return Ok(DrainResult::TryAgain);
                }
            }
            self.next_due = Some(due + interval);
        } else if let Some(interval) = self.script.frame_interval {
            self.next_due = Some(Instant::now() + interval);
        }

        match self.next_event() {
            Some(ReplayEvent::Unit { payload, flags }) => self.emit(payload, flags),
            Some(ReplayEvent::Empty) => self.emit(Bytes::new(), BufferFlags::empty()),
            Some(ReplayEvent::FormatChanged(format)) => Ok(DrainResult::FormatChanged(format)),
            Some(ReplayEvent::Idle) => Ok(DrainResult::TryAgain),
            Some(ReplayEvent::Fail(message)) => Err(MirrorError::Codec(message)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(DrainResult::TryAgain)
            }
        }
    }

    fn output_payload(&mut self, buffer: &OutputBuffer) -> Result<Bytes, MirrorError> {
        let data = self
            .pool
            .get(buffer.index)
            .and_then(Option::as_ref)
            .ok_or_else(|| MirrorError::Codec(format!("buffer {} is not dequeued", buffer.index)))?;
        let end = buffer.offset + buffer.size;
        if end > data.len() {
            return Err(MirrorError::Codec(format!(
                "buffer {} window {}..{end} exceeds {} bytes",
                buffer.index,
                buffer.offset,
                data.len()
            )));
        }
        Ok(data.slice(buffer.offset..end))
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<(), MirrorError> {
        match self.pool.get_mut(index).and_then(Option::take) {
            Some(_) => {
                self.log.lock().released.push(index);
                Ok(())
            }
            None => Err(MirrorError::Codec(format!(
                "buffer {index} released but not dequeued"
            ))),
        }
    }

    fn stop(&mut self) -> Result<(), MirrorError> {
        self.log.call("stop");
        if !self.started {
            return Err(MirrorError::InvalidState("codec is not started"));
        }
        self.started = false;
        Ok(())
    }

    fn release(&mut self) -> Result<(), MirrorError> {
        self.log.call("release");
        self.pool = Default::default();
        self.format = None;
        Ok(())
    }

    fn release_input_surface(&mut self) -> Result<(), MirrorError> {
        self.log.call("release_input_surface");
        self.surface
            .take()
            .map(|_| ())
            .ok_or(MirrorError::InvalidState("no input surface"))
    }
}

// ── ReplayMirror ─────────────────────────────────────────────────

/// A [`DisplayMirror`] that records bindings instead of mirroring.
pub struct ReplayMirror {
    has_display: bool,
    bind_error: Option<String>,
    next_token: u64,
    log: ReplayLog,
}

impl ReplayMirror {
    pub fn new(log: ReplayLog) -> Self {
        Self {
            has_display: true,
            bind_error: None,
            next_token: 1,
            log,
        }
    }

    /// Pretend there is no built-in display.
    pub fn without_display(mut self) -> Self {
        self.has_display = false;
        self
    }

    /// Make `bind_surface` fail with `message`.
    pub fn failing_bind(mut self, message: impl Into<String>) -> Self {
        self.bind_error = Some(message.into());
        self
    }
}

impl DisplayMirror for ReplayMirror {
    fn primary_display_token(&mut self) -> Result<Option<DisplayToken>, MirrorError> {
        Ok(self.has_display.then_some(DisplayToken(0)))
    }

    fn create_virtual_display(
        &mut self,
        _name: &str,
        _secure: bool,
    ) -> Result<DisplayToken, MirrorError> {
        self.log.call("create_virtual_display");
        let token = DisplayToken(self.next_token);
        self.next_token += 1;
        Ok(token)
    }

    fn bind_surface(&mut self, binding: &SurfaceBinding) -> Result<(), MirrorError> {
        self.log.call("bind_surface");
        if let Some(message) = &self.bind_error {
            return Err(MirrorError::Mirror(message.clone()));
        }
        self.log.lock().bindings.push(binding.clone());
        Ok(())
    }

    fn destroy_virtual_display(&mut self, display: &DisplayToken) -> Result<(), MirrorError> {
        self.log.call("destroy_virtual_display");
        self.log.lock().destroyed_displays.push(display.clone());
        Ok(())
    }
}

// ── ReplayBackend ────────────────────────────────────────────────

/// Hands every session a fresh [`ReplayCodec`] playing the same script.
#[derive(Debug, Clone)]
pub struct ReplayBackend {
    script: ReplayScript,
    log: ReplayLog,
}

impl ReplayBackend {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            log: ReplayLog::new(),
        }
    }

    /// Replay an Annex-B file in a loop at `frame_rate`.
    pub fn from_file(path: &std::path::Path, frame_rate: u32) -> Result<Self, MirrorError> {
        let stream = std::fs::read(path)?;
        let script = ReplayScript::from_annexb(&stream);
        if script.events().is_empty() {
            return Err(MirrorError::Other(format!(
                "{} contains no H.264 access units",
                path.display()
            )));
        }
        let interval = Duration::from_micros(1_000_000 / frame_rate.max(1) as u64);
        Ok(Self::new(script.looping(true).paced(interval)))
    }

    /// Log shared by every codec and mirror this backend creates.
    pub fn log(&self) -> &ReplayLog {
        &self.log
    }
}

impl MediaBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn create_encoder(&self) -> Result<Box<dyn VideoCodec>, MirrorError> {
        Ok(Box::new(ReplayCodec::new(self.script.clone(), self.log.clone())))
    }

    fn create_display_mirror(&self) -> Result<Box<dyn DisplayMirror>, MirrorError> {
        Ok(Box::new(ReplayMirror::new(self.log.clone())))
    }
}
