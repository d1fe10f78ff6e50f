use super::{blank_frame, fit_row, normalize_peak, resample, stride_downsample, Visualizer};
use crate::{analysis::Smoother, audio::AudioChunk};

const WAVEFORM_SAMPLES: usize = 128;
const SIMPLE_SAMPLES: usize = 64;

/// Rises through the bar ramp and falls back, so `-1` and `1` both map low.
const WAVE_GLYPHS: [char; 14] = [
    '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█', '▇', '▆', '▅', '▄', '▃', '▂',
];

/// Peak-normalized waveform drawn as bars around a center line.
#[derive(Debug)]
pub struct Waveform {
    smoother: Smoother,
}

impl Waveform {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoother: Smoother::new(WAVEFORM_SAMPLES, smoothing),
        }
    }
}

impl Default for Waveform {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl Visualizer for Waveform {
    fn name(&self) -> &'static str {
        "waveform"
    }

    fn process(&mut self, chunk: &AudioChunk, _sample_rate: u32) -> Vec<f32> {
        let mut samples = resample(&chunk.mono(), WAVEFORM_SAMPLES);
        normalize_peak(&mut samples);
        self.smoother.apply(&samples)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() || height == 0 {
            return blank_frame(width, height);
        }
        let data = resample(data, width);
        let center = (height / 2) as i64;
        let span = (height - 1) as f32 / 2.0;

        let reach: Vec<i64> = data
            .iter()
            .map(|value| {
                let row = ((1.0 - value.clamp(-1.0, 1.0)) * span) as i64;
                (row - center).abs()
            })
            .collect();

        (0..height as i64)
            .map(|row| {
                let line: String = if row == center {
                    "─".repeat(width)
                } else {
                    reach
                        .iter()
                        .map(|reach| if (row - center).abs() <= *reach { '│' } else { ' ' })
                        .collect()
                };
                fit_row(&line, width)
            })
            .collect()
    }
}

/// One-line waveform using a rise-and-fall glyph ramp.
#[derive(Debug, Default)]
pub struct SimpleWaveform;

impl SimpleWaveform {
    pub fn new() -> Self {
        Self
    }
}

impl Visualizer for SimpleWaveform {
    fn name(&self) -> &'static str {
        "waveform_simple"
    }

    fn process(&mut self, chunk: &AudioChunk, _sample_rate: u32) -> Vec<f32> {
        let mut samples = stride_downsample(&chunk.mono(), SIMPLE_SAMPLES);
        normalize_peak(&mut samples);
        samples
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        let mut rows = blank_frame(width, height);
        let Some(last) = rows.last_mut() else {
            return rows;
        };
        let top = (WAVE_GLYPHS.len() - 1) as f32;
        let line: String = data
            .iter()
            .take(width)
            .map(|value| {
                let index = ((value + 1.0) / 2.0 * top) as isize;
                WAVE_GLYPHS[index.clamp(0, WAVE_GLYPHS.len() as isize - 1) as usize]
            })
            .collect();
        *last = fit_row(&line, width);
        rows
    }
}
