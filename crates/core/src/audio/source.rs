//! Decoded audio sources: the boundary to the codec layer.

use std::{collections::VecDeque, f32::consts::TAU, fmt, fs::File, path::Path};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    units::{Time, TimeBase},
};

use super::AudioChunk;
use crate::error::{SourceError, SourceResult};

/// A seekable stream of decoded PCM.
///
/// Positions and lengths are counted in frames. Channel counts are limited
/// to mono or stereo.
pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Total length in frames, 0 when unknown.
    fn len_frames(&self) -> u64;

    /// Frame offset of the next read.
    fn tell(&self) -> u64;

    /// Reads up to `frames` frames. A short chunk means the stream is nearly
    /// exhausted; an empty chunk means it is.
    fn read(&mut self, frames: usize) -> SourceResult<AudioChunk>;

    /// Moves the read offset to `frame`, clamped to the stream length.
    fn seek(&mut self, frame: u64) -> SourceResult<()>;

    /// Total length in seconds.
    fn duration(&self) -> f64 {
        match self.sample_rate() {
            0 => 0.0,
            rate => self.len_frames() as f64 / f64::from(rate),
        }
    }
}

/// Opens a source for a path.
pub trait SourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> SourceResult<Box<dyn AudioSource>>;
}

impl<F> SourceOpener for F
where
    F: Fn(&Path) -> SourceResult<Box<dyn AudioSource>> + Send + Sync,
{
    fn open(&self, path: &Path) -> SourceResult<Box<dyn AudioSource>> {
        self(path)
    }
}

/// PCM held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    cursor: u64,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let chunk = AudioChunk::new(samples, channels.clamp(1, 2));
        let channels = chunk.channels();
        Self {
            samples: chunk.into_samples(),
            channels,
            sample_rate,
            cursor: 0,
        }
    }

    pub fn silence(seconds: f64, channels: u16, sample_rate: u32) -> Self {
        let frames = (seconds.max(0.0) * f64::from(sample_rate)).round() as usize;
        let channels = channels.clamp(1, 2);
        Self::new(vec![0.0; frames * usize::from(channels)], channels, sample_rate)
    }

    /// A sine tone of the given frequency and amplitude on every channel.
    pub fn tone(frequency: f32, amplitude: f32, seconds: f64, channels: u16, sample_rate: u32) -> Self {
        let frames = (seconds.max(0.0) * f64::from(sample_rate)).round() as usize;
        let channels = channels.clamp(1, 2);
        let step = TAU * frequency / sample_rate.max(1) as f32;
        let samples = (0..frames)
            .flat_map(|n| {
                let value = amplitude * (step * n as f32).sin();
                std::iter::repeat(value).take(usize::from(channels))
            })
            .collect();
        Self::new(samples, channels, sample_rate)
    }
}

impl AudioSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn len_frames(&self) -> u64 {
        (self.samples.len() / usize::from(self.channels)) as u64
    }

    fn tell(&self) -> u64 {
        self.cursor
    }

    fn read(&mut self, frames: usize) -> SourceResult<AudioChunk> {
        let channels = usize::from(self.channels);
        let start = self.cursor as usize * channels;
        let end = (start + frames * channels).min(self.samples.len());
        let samples = self.samples.get(start..end).unwrap_or_default().to_vec();
        self.cursor += (samples.len() / channels) as u64;
        Ok(AudioChunk::new(samples, self.channels))
    }

    fn seek(&mut self, frame: u64) -> SourceResult<()> {
        self.cursor = frame.min(self.len_frames());
        Ok(())
    }
}

/// Opens files through [`SymphoniaSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaOpener;

impl SourceOpener for SymphoniaOpener {
    fn open(&self, path: &Path) -> SourceResult<Box<dyn AudioSource>> {
        Ok(Box::new(SymphoniaSource::open(path)?))
    }
}

/// File-backed source decoding through symphonia. Streams with more than
/// two channels are reduced to their first two.
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    channels: u16,
    total_frames: u64,
    /// Interleaved frames decoded but not yet handed out.
    pending: VecDeque<f32>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Frames to discard after a seek landed before its target.
    skip_frames: u64,
    position: u64,
    exhausted: bool,
}

impl SymphoniaSource {
    pub fn open(path: &Path) -> SourceResult<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SourceError::Unsupported("no audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| SourceError::Unsupported("unknown sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2)
            .clamp(1, 2);

        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        tracing::debug!(
            path = %path.display(),
            sample_rate,
            channels,
            frames = params.n_frames,
            "opened audio source"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base: params.time_base,
            sample_rate,
            channels,
            total_frames: params.n_frames.unwrap_or(0),
            pending: VecDeque::new(),
            sample_buf: None,
            skip_frames: 0,
            position: 0,
            exhausted: false,
        })
    }

    /// Decodes the next packet of this track into `pending`. Returns false
    /// once the stream is exhausted.
    fn decode_packet(&mut self) -> SourceResult<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(err) => return Err(err.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    tracing::warn!(%err, "skipping undecodable packet");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let needed = capacity as usize * spec.channels.count();
            if self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < needed)
            {
                self.sample_buf = Some(SampleBuffer::new(capacity, spec));
            }
            let Some(buf) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            let source_channels = spec.channels.count().max(1);
            let keep = usize::from(self.channels);
            for frame in buf.samples().chunks_exact(source_channels) {
                if self.skip_frames > 0 {
                    self.skip_frames -= 1;
                    continue;
                }
                if source_channels == 1 && keep == 2 {
                    self.pending.extend([frame[0], frame[0]]);
                } else {
                    self.pending.extend(&frame[..keep.min(source_channels)]);
                }
            }
            return Ok(true);
        }
    }

    fn ts_to_frame(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                ((time.seconds as f64 + time.frac) * f64::from(self.sample_rate)).round() as u64
            }
            None => ts,
        }
    }
}

impl AudioSource for SymphoniaSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn len_frames(&self) -> u64 {
        self.total_frames
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn read(&mut self, frames: usize) -> SourceResult<AudioChunk> {
        let channels = usize::from(self.channels);
        let wanted = frames * channels;

        while self.pending.len() < wanted && !self.exhausted {
            if !self.decode_packet()? {
                self.exhausted = true;
            }
        }

        let take = wanted.min(self.pending.len());
        let samples: Vec<f32> = self.pending.drain(..take).collect();
        self.position += (samples.len() / channels) as u64;
        Ok(AudioChunk::new(samples, self.channels))
    }

    fn seek(&mut self, frame: u64) -> SourceResult<()> {
        let frame = if self.total_frames > 0 {
            frame.min(self.total_frames)
        } else {
            frame
        };

        self.pending.clear();
        self.skip_frames = 0;

        if self.total_frames > 0 && frame >= self.total_frames {
            self.position = frame;
            self.exhausted = true;
            return Ok(());
        }

        let rate = u64::from(self.sample_rate.max(1));
        let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;

        self.decoder.reset();
        let landed = self.ts_to_frame(seeked.actual_ts);
        self.skip_frames = frame.saturating_sub(landed);
        self.position = frame;
        self.exhausted = false;
        Ok(())
    }
}

impl fmt::Debug for SymphoniaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymphoniaSource")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("total_frames", &self.total_frames)
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_ramp_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for n in 0..frames {
            for _ in 0..channels {
                writer.write_sample((n % 1000) as i16 * 16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn memory_source_reads_short_then_empty() {
        let mut source = MemorySource::new(vec![0.5; 10], 1, 10);
        assert_eq!(source.read(6).unwrap().frames(), 6);
        assert_eq!(source.read(6).unwrap().frames(), 4);
        assert!(source.read(6).unwrap().is_empty());
        assert_eq!(source.tell(), 10);

        source.seek(0).unwrap();
        assert_eq!(source.tell(), 0);
        source.seek(99).unwrap();
        assert_eq!(source.tell(), 10);
    }

    #[test]
    fn memory_silence_has_requested_length() {
        let source = MemorySource::silence(2.0, 1, 44_100);
        assert_eq!(source.len_frames(), 88_200);
        assert!((source.duration() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn closures_act_as_openers() {
        let opener = |_: &Path| -> SourceResult<Box<dyn AudioSource>> {
            Ok(Box::new(MemorySource::silence(1.0, 2, 8_000)))
        };
        let source = opener.open(Path::new("ignored")).unwrap();
        assert_eq!(source.channels(), 2);
    }

    #[test]
    fn decodes_wav_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp_wav(&path, 2, 8_000, 4_000);

        let mut source = SymphoniaSource::open(&path).unwrap();
        assert_eq!(source.sample_rate(), 8_000);
        assert_eq!(source.channels(), 2);
        assert_eq!(source.len_frames(), 4_000);

        let mut total = 0;
        loop {
            let chunk = source.read(1024).unwrap();
            if chunk.is_empty() {
                break;
            }
            assert_eq!(chunk.channels(), 2);
            total += chunk.frames();
        }
        assert_eq!(total, 4_000);
        assert_eq!(source.tell(), 4_000);
    }

    #[test]
    fn seeks_to_exact_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp_wav(&path, 1, 8_000, 8_000);

        let mut source = SymphoniaSource::open(&path).unwrap();
        source.read(3000).unwrap();

        source.seek(500).unwrap();
        assert_eq!(source.tell(), 500);
        let chunk = source.read(1).unwrap();
        let expected = f32::from(500i16 * 16) / 32768.0;
        assert!((chunk.samples()[0] - expected).abs() < 1e-4);

        source.seek(0).unwrap();
        let remaining: usize = std::iter::from_fn(|| {
            let chunk = source.read(2048).unwrap();
            (!chunk.is_empty()).then(|| chunk.frames())
        })
        .sum();
        assert_eq!(remaining, 8_000);
    }

    #[test]
    fn rejects_non_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();

        assert!(SymphoniaSource::open(&path).is_err());
        assert!(SymphoniaSource::open(&dir.path().join("missing.wav")).is_err());
    }
}
