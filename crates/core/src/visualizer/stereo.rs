use super::{
    bar_cell, blank_frame, deinterleave, fit_row, interleave, normalize_peak, resample,
    value_to_bar, Canvas, Visualizer,
};
use crate::{
    analysis::{BandAnalyzer, Smoother},
    audio::AudioChunk,
};

const CHANNEL_GAP: usize = 4;
const LABEL_WIDTH: usize = 2;
const STEREO_WAVEFORM_SAMPLES: usize = 64;

/// Independent left and right spectra drawn back to back, bass outermost.
#[derive(Debug)]
pub struct Stereo {
    left: BandAnalyzer,
    right: BandAnalyzer,
}

impl Stereo {
    /// `channel_bars` bands per channel.
    pub fn new(channel_bars: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            left: BandAnalyzer::new(channel_bars, smoothing, sensitivity),
            right: BandAnalyzer::new(channel_bars, smoothing, sensitivity),
        }
    }
}

impl Default for Stereo {
    fn default() -> Self {
        Self::new(16, 0.3, 1.0)
    }
}

impl Visualizer for Stereo {
    fn name(&self) -> &'static str {
        "stereo"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        let (left, right) = chunk.stereo();
        let mut values = self.left.process(&left, sample_rate);
        values.extend(self.right.process(&right, sample_rate));
        values
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() {
            return blank_frame(width, height);
        }
        let (left, right) = data.split_at(data.len() / 2);
        let channel_width = width.saturating_sub(CHANNEL_GAP + 2 * LABEL_WIDTH) / 2;

        let cell = |value: &f32, threshold: f32| {
            bar_cell(*value, threshold, height).map_or(' ', value_to_bar)
        };

        (0..height)
            .map(|row| {
                let threshold = 1.0 - row as f32 / height as f32;

                let mut left_line = String::from("L ");
                left_line.extend(
                    left.iter()
                        .take(channel_width)
                        .rev()
                        .map(|value| cell(value, threshold)),
                );
                let mut line = fit_row(&left_line, LABEL_WIDTH + channel_width);
                line.push_str(&" ".repeat(CHANNEL_GAP));

                let right_line: String = right
                    .iter()
                    .take(channel_width)
                    .map(|value| cell(value, threshold))
                    .collect();
                line.push_str(&right_line);
                line.push_str(" R");
                fit_row(&line, width)
            })
            .collect()
    }
}

/// Left channel above the center line, right channel below.
#[derive(Debug)]
pub struct StereoWaveform {
    left: Smoother,
    right: Smoother,
}

impl StereoWaveform {
    pub fn new(smoothing: f32) -> Self {
        Self {
            left: Smoother::new(STEREO_WAVEFORM_SAMPLES, smoothing),
            right: Smoother::new(STEREO_WAVEFORM_SAMPLES, smoothing),
        }
    }
}

impl Default for StereoWaveform {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl Visualizer for StereoWaveform {
    fn name(&self) -> &'static str {
        "stereo_waveform"
    }

    fn process(&mut self, chunk: &AudioChunk, _sample_rate: u32) -> Vec<f32> {
        let (left, right) = chunk.stereo();
        let mut left = resample(&left, STEREO_WAVEFORM_SAMPLES);
        let mut right = resample(&right, STEREO_WAVEFORM_SAMPLES);
        normalize_peak(&mut left);
        normalize_peak(&mut right);
        interleave(&self.left.apply(&left), &self.right.apply(&right))
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() {
            return blank_frame(width, height);
        }
        let (mut left, mut right) = deinterleave(data);
        if left.len() * 2 != width {
            left = resample(&left, width / 2);
            right = resample(&right, width / 2);
        }

        let mut canvas = Canvas::new(width, height);
        let center = (height / 2) as i64;
        let reach = center as f32 - 1.0;
        let bottom = height as i64 - 1;
        canvas.hline(center, '·');

        for (index, value) in left.iter().enumerate() {
            let x = index as i64 * 2;
            let y = (center as f32 - value.abs() * reach) as i64;
            let y = y.min(center - 1).max(0);
            for py in y..center {
                canvas.set(x, py, '│');
            }
        }
        for (index, value) in right.iter().enumerate() {
            let x = index as i64 * 2 + 1;
            let y = (center as f32 + value.abs() * reach) as i64;
            let y = y.max(center + 1).min(bottom);
            for py in center + 1..=y {
                canvas.set(x, py, '│');
            }
        }
        canvas.into_rows()
    }
}
