use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedBufferSize, SupportedStreamConfig,
};

use super::output::OutputCallback;
use crate::error::{BackendError, BackendResult};

/// Stream parameters derived from the loaded track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: u32,
}

/// An open output stream. Closing (or dropping) it stops callback delivery.
pub trait OutputStream {
    fn close(self: Box<Self>);
}

/// Audio output device abstraction.
pub trait AudioBackend {
    /// Acquires the device. Called once before the first stream is opened.
    fn initialize(&mut self) -> BackendResult<()>;

    /// Starts pulling `callback` at the requested rate.
    fn open_stream(
        &mut self,
        request: StreamRequest,
        callback: OutputCallback,
    ) -> BackendResult<Box<dyn OutputStream>>;

    /// Releases the device.
    fn release(&mut self);
}

/// Backend that plays through the host's default output device.
pub struct CpalBackend {
    host: cpal::Host,
    device: Option<cpal::Device>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            device: None,
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn initialize(&mut self) -> BackendResult<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let device = self
            .host
            .default_output_device()
            .ok_or(BackendError::NoDevice)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(device = %name, host = ?self.host.id(), "audio output device acquired");
        self.device = Some(device);
        Ok(())
    }

    fn open_stream(
        &mut self,
        request: StreamRequest,
        callback: OutputCallback,
    ) -> BackendResult<Box<dyn OutputStream>> {
        self.initialize()?;
        let device = self.device.as_ref().ok_or(BackendError::NoDevice)?;
        let supported = select_config(device, &request)?;
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: buffer_size(supported.buffer_size(), request.frames_per_buffer),
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(device, &config, callback)?,
            SampleFormat::I16 => build_stream::<i16>(device, &config, callback)?,
            SampleFormat::U16 => build_stream::<u16>(device, &config, callback)?,
            other => {
                return Err(BackendError::StreamBuild(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|err| BackendError::StreamPlay(err.to_string()))?;

        tracing::info!(
            channels = config.channels,
            sample_rate = config.sample_rate.0,
            buffer = ?config.buffer_size,
            "output stream opened"
        );
        Ok(Box::new(CpalStream { stream }))
    }

    fn release(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!("audio output device released");
        }
    }
}

struct CpalStream {
    stream: cpal::Stream,
}

impl OutputStream for CpalStream {
    fn close(self: Box<Self>) {
        if let Err(err) = self.stream.pause() {
            tracing::debug!(error = %err, "pausing stream before drop failed");
        }
    }
}

fn select_config(
    device: &cpal::Device,
    request: &StreamRequest,
) -> BackendResult<SupportedStreamConfig> {
    let rate = SampleRate(request.sample_rate);
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|err| BackendError::Device(err.to_string()))?
        .filter(|range| {
            matches!(
                range.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            )
        })
        .collect();

    let covers_rate = |range: &&cpal::SupportedStreamConfigRange| {
        range.min_sample_rate() <= rate && rate <= range.max_sample_rate()
    };

    let best = ranges
        .iter()
        .filter(covers_rate)
        .find(|range| range.channels() == request.channels)
        .or_else(|| ranges.iter().filter(covers_rate).find(|range| range.channels() >= 2))
        .or_else(|| ranges.iter().find(covers_rate));

    match best {
        Some(range) => Ok(range.clone().with_sample_rate(rate)),
        None => {
            let fallback = device.default_output_config().map_err(|err| {
                BackendError::Device(format!(
                    "no output config supports {} Hz: {err}",
                    request.sample_rate
                ))
            })?;
            warn_on_rate_change(request, &fallback);
            Ok(fallback)
        }
    }
}

/// Logs when the device default plays at a different rate than decoded.
/// Returns whether the rates differ.
fn warn_on_rate_change(request: &StreamRequest, fallback: &SupportedStreamConfig) -> bool {
    let device_rate = fallback.sample_rate().0;
    if device_rate == request.sample_rate {
        return false;
    }
    tracing::warn!(
        requested = request.sample_rate,
        device = device_rate,
        "no output config supports the track rate; playback speed and pitch will change"
    );
    true
}

fn buffer_size(supported: &SupportedBufferSize, frames: u32) -> cpal::BufferSize {
    match supported {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        _ => cpal::BufferSize::Default,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut callback: OutputCallback,
) -> BackendResult<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() != data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                callback.fill_device(&mut scratch, channels);
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*sample);
                }
            },
            |err| tracing::error!(error = %err, "output stream error"),
            None,
        )
        .map_err(|err| BackendError::StreamBuild(err.to_string()))
}

/// Device-free backend: a timer thread pulls the callback at the stream's
/// real-time rate and discards the samples.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    initialized: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for HeadlessBackend {
    fn initialize(&mut self) -> BackendResult<()> {
        if !self.initialized {
            tracing::info!("headless audio output initialized");
            self.initialized = true;
        }
        Ok(())
    }

    fn open_stream(
        &mut self,
        request: StreamRequest,
        mut callback: OutputCallback,
    ) -> BackendResult<Box<dyn OutputStream>> {
        self.initialize()?;
        let frames = request.frames_per_buffer.max(1) as usize;
        let rate = f64::from(request.sample_rate.max(1));
        let period = Duration::from_secs_f64(frames as f64 / rate);
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("headless-output".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while !running.load(Ordering::Relaxed) {
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                    callback.render(frames);
                }
            })
            .map_err(|err| BackendError::StreamBuild(err.to_string()))?;

        tracing::info!(
            sample_rate = request.sample_rate,
            frames,
            "headless output stream opened"
        );
        Ok(Box::new(HeadlessStream {
            stop,
            handle: Some(handle),
        }))
    }

    fn release(&mut self) {
        self.initialized = false;
    }
}

struct HeadlessStream {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeadlessStream {
    fn shut(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("headless output thread panicked");
            }
        }
    }
}

impl OutputStream for HeadlessStream {
    fn close(mut self: Box<Self>) {
        self.shut();
    }
}

impl Drop for HeadlessStream {
    fn drop(&mut self) {
        self.shut();
    }
}
