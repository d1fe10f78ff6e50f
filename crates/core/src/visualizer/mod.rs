//! Audio-reactive text visualizers.
//!
//! Each [`Visualizer`] turns the latest [`AudioChunk`] into a vector of
//! scalars (`process`) and rasterizes that vector into rows of exactly
//! `width` characters (`render`). Rendering is a pure function of its inputs;
//! only `process` touches the instance's smoothing state.

mod circle;
mod manager;
mod mirror;
mod oscilloscope;
mod spectrum;
mod stereo;
mod waveform;

pub use circle::{Circle, Radial};
pub use manager::VisualizerManager;
pub use mirror::{Mirror, Symmetry};
pub use oscilloscope::{DualOscilloscope, Oscilloscope, VectorScope};
pub use spectrum::{CompactSpectrum, Spectrum};
pub use stereo::{Stereo, StereoWaveform};
pub use waveform::{SimpleWaveform, Waveform};

use crate::audio::AudioChunk;

/// A single visualization algorithm.
pub trait Visualizer: Send {
    /// Registry key, unique per variant.
    fn name(&self) -> &'static str;

    /// Transforms the latest chunk, updating this instance's smoothing state.
    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32>;

    /// Draws `data` as `height` rows of `width` characters.
    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String>;
}

/// Eight-level bar ramp, lowest first.
pub const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Shaded block ramp used by the filled renderers.
pub(crate) const SHADES: [char; 4] = ['░', '▒', '▓', '█'];

/// Maps `0.0..=1.0` onto [`BARS`].
pub fn value_to_bar(value: f32) -> char {
    let index = (value * (BARS.len() - 1) as f32) as isize;
    BARS[index.clamp(0, BARS.len() as isize - 1) as usize]
}

/// Truncates or space-pads `line` to exactly `width` characters.
pub fn fit_row(line: &str, width: usize) -> String {
    let mut fitted: String = line.chars().take(width).collect();
    let len = fitted.chars().count();
    fitted.extend(std::iter::repeat(' ').take(width - len));
    fitted
}

pub fn blank_frame(width: usize, height: usize) -> Vec<String> {
    vec![" ".repeat(width); height]
}

/// Re-fits an arbitrary frame to `height` rows of `width` characters.
pub fn fit_frame(mut rows: Vec<String>, width: usize, height: usize) -> Vec<String> {
    rows.resize(height, String::new());
    rows.iter().map(|row| fit_row(row, width)).collect()
}

/// Fixed-size character grid. Writes outside the grid are ignored.
#[derive(Debug, Clone)]
pub(crate) struct Canvas {
    width: usize,
    height: usize,
    cells: Vec<char>,
}

impl Canvas {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![' '; width * height],
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let (x, y) = (usize::try_from(x).ok()?, usize::try_from(y).ok()?);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    pub(crate) fn set(&mut self, x: i64, y: i64, glyph: char) {
        if let Some(index) = self.index(x, y) {
            self.cells[index] = glyph;
        }
    }

    pub(crate) fn get(&self, x: i64, y: i64) -> Option<char> {
        self.index(x, y).map(|index| self.cells[index])
    }

    pub(crate) fn hline(&mut self, y: i64, glyph: char) {
        for x in 0..self.width as i64 {
            self.set(x, y, glyph);
        }
    }

    pub(crate) fn vline(&mut self, x: i64, glyph: char) {
        for y in 0..self.height as i64 {
            self.set(x, y, glyph);
        }
    }

    pub(crate) fn into_rows(self) -> Vec<String> {
        if self.width == 0 {
            return vec![String::new(); self.height];
        }
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().collect())
            .collect()
    }
}

/// `count` indices spread evenly over `0..len`, first and last included,
/// rounded down.
pub(crate) fn linspace_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }
    let last = (len - 1) as f64;
    (0..count)
        .map(|i| (last * i as f64 / (count - 1) as f64) as usize)
        .collect()
}

/// Picks `count` evenly spaced samples out of `data`. Empty input yields
/// silence.
pub(crate) fn resample(data: &[f32], count: usize) -> Vec<f32> {
    if data.len() == count {
        return data.to_vec();
    }
    if data.is_empty() {
        return vec![0.0; count];
    }
    linspace_indices(data.len(), count)
        .into_iter()
        .map(|index| data[index])
        .collect()
}

/// Keeps every `len / target`-th sample when `data` is longer than
/// `target`, otherwise returns it unchanged.
pub(crate) fn stride_downsample(data: &[f32], target: usize) -> Vec<f32> {
    if target == 0 || data.len() <= target {
        return data.to_vec();
    }
    let step = data.len() / target;
    data.iter().step_by(step).take(target).copied().collect()
}

/// Downsamples to `target` samples, zero padding short input.
pub(crate) fn fixed_length(data: &[f32], target: usize) -> Vec<f32> {
    let mut out = stride_downsample(data, target);
    out.resize(target, 0.0);
    out
}

/// Scales `data` so its peak absolute value is 1. All-zero data is untouched.
pub(crate) fn normalize_peak(data: &mut [f32]) {
    let peak = peak_abs(data);
    if peak > 0.0 {
        for value in data {
            *value /= peak;
        }
    }
}

pub(crate) fn peak_abs(data: &[f32]) -> f32 {
    data.iter().fold(0.0_f32, |peak, value| peak.max(value.abs()))
}

/// Interleaves two equally long channels as `l0, r0, l1, r1, ...`.
pub(crate) fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
    left.iter().zip(right).flat_map(|(l, r)| [*l, *r]).collect()
}

/// Splits `l0, r0, l1, r1, ...` into its channels.
pub(crate) fn deinterleave(data: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let left = data.iter().step_by(2).copied().collect();
    let right = data.iter().skip(1).step_by(2).copied().collect();
    (left, right)
}

/// Fill level of one bar-chart cell at a row with the given threshold, or
/// `None` when the bar does not reach the row.
pub(crate) fn bar_cell(value: f32, threshold: f32, rows: usize) -> Option<f32> {
    (value >= threshold).then(|| ((value - threshold) * rows as f32).min(1.0))
}

/// Draws `data` as vertical bars, tallest values reaching the top row.
pub(crate) fn render_bars(data: &[f32], width: usize, height: usize) -> Vec<String> {
    if data.is_empty() || width == 0 {
        return blank_frame(width, height);
    }
    let bar_width = (width / data.len()).max(1);
    let visible = &data[..data.len().min(width / bar_width)];

    (0..height)
        .map(|row| {
            let threshold = 1.0 - row as f32 / height as f32;
            let mut line = String::with_capacity(width * 3);
            for value in visible {
                let glyph = bar_cell(*value, threshold, height).map_or(' ', value_to_bar);
                line.extend(std::iter::repeat(glyph).take(bar_width));
            }
            fit_row(&line, width)
        })
        .collect()
}
