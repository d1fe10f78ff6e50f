use super::{blank_frame, fit_row, linspace_indices, render_bars, value_to_bar, Visualizer};
use crate::{analysis::BandAnalyzer, audio::AudioChunk};

/// Log-band FFT bar chart.
#[derive(Debug)]
pub struct Spectrum {
    bands: BandAnalyzer,
}

impl Spectrum {
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            bands: BandAnalyzer::new(bar_count, smoothing, sensitivity),
        }
    }

    /// Smoothing state carried into the next `process` call.
    pub fn previous(&self) -> &[f32] {
        self.bands.smoother().previous()
    }
}

impl Default for Spectrum {
    fn default() -> Self {
        Self::new(32, 0.3, 1.0)
    }
}

impl Visualizer for Spectrum {
    fn name(&self) -> &'static str {
        "spectrum"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        self.bands.process(&chunk.mono(), sample_rate)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        render_bars(data, width, height)
    }
}

/// Single-line spectrum drawn along the bottom row.
#[derive(Debug)]
pub struct CompactSpectrum {
    bands: BandAnalyzer,
}

impl CompactSpectrum {
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            bands: BandAnalyzer::new(bar_count, smoothing, sensitivity),
        }
    }
}

impl Default for CompactSpectrum {
    fn default() -> Self {
        Self::new(32, 0.3, 1.0)
    }
}

impl Visualizer for CompactSpectrum {
    fn name(&self) -> &'static str {
        "spectrum_compact"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        self.bands.process(&chunk.mono(), sample_rate)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        let mut rows = blank_frame(width, height);
        let Some(last) = rows.last_mut() else {
            return rows;
        };
        let line: String = linspace_indices(data.len(), width.min(data.len()))
            .into_iter()
            .map(|index| value_to_bar(data[index]))
            .collect();
        *last = fit_row(&line, width);
        rows
    }
}
