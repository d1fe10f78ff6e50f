//! Frequency-domain feature extraction shared by the spectral visualizers.

use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

/// Samples fed to each FFT.
pub const FFT_SIZE: usize = 2048;
/// Lower edge of the first log band, in Hz.
pub const MIN_FREQUENCY: f32 = 20.0;

/// Windowed real FFT of a fixed size.
pub struct SpectrumAnalyzer {
    size: usize,
    window: Vec<f32>,
    fft: FftResources,
    magnitudes: Vec<f32>,
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self::with_size(FFT_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        let size = size.max(2);
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };
        Self {
            size,
            window: (0..size).map(|n| hann_value(n, size)).collect(),
            magnitudes: vec![0.0; size / 2 + 1],
            fft,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Magnitude spectrum (`size / 2 + 1` bins) of `samples`, zero padded or
    /// truncated to the analysis size and Hann windowed.
    pub fn magnitudes(&mut self, samples: &[f32]) -> &[f32] {
        let fft = &mut self.fft;
        for (index, slot) in fft.input.iter_mut().enumerate() {
            let sample = samples.get(index).copied().unwrap_or(0.0);
            *slot = sample * self.window[index];
        }

        match fft
            .plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
        {
            Ok(()) => {
                for (magnitude, bin) in self.magnitudes.iter_mut().zip(&fft.spectrum) {
                    *magnitude = bin.norm();
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "fft failed; reporting an empty spectrum");
                self.magnitudes.fill(0.0);
            }
        }
        &self.magnitudes
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish()
    }
}

/// Exponential moving average with a fixed-length state vector.
#[derive(Debug, Clone)]
pub struct Smoother {
    alpha: f32,
    previous: Vec<f32>,
}

impl Smoother {
    pub fn new(len: usize, alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            previous: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    pub fn previous(&self) -> &[f32] {
        &self.previous
    }

    /// Returns `alpha * previous + (1 - alpha) * values` and keeps it as the
    /// new state. Values past the state length are scaled by `1 - alpha`
    /// without being remembered.
    pub fn apply(&mut self, values: &[f32]) -> Vec<f32> {
        let alpha = self.alpha;
        values
            .iter()
            .enumerate()
            .map(|(index, value)| match self.previous.get_mut(index) {
                Some(previous) => {
                    let smoothed = alpha * *previous + (1.0 - alpha) * value;
                    *previous = smoothed;
                    smoothed
                }
                None => (1.0 - alpha) * value,
            })
            .collect()
    }
}

/// Log-band spectrum: FFT, band averaging, peak normalization, sensitivity
/// curve and temporal smoothing.
#[derive(Debug)]
pub struct BandAnalyzer {
    analyzer: SpectrumAnalyzer,
    bar_count: usize,
    sensitivity: f32,
    smoother: Smoother,
}

impl BandAnalyzer {
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        let bar_count = bar_count.max(1);
        Self {
            analyzer: SpectrumAnalyzer::new(),
            bar_count,
            sensitivity: sensitivity.max(0.01),
            smoother: Smoother::new(bar_count, smoothing),
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    /// Produces `bar_count` values in `[0, 1]` from mono `samples`.
    pub fn process(&mut self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        let bands = self.bands(samples, sample_rate);
        self.smoother.apply(&bands)
    }

    fn bands(&mut self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        if sample_rate == 0 {
            return vec![0.0; self.bar_count];
        }
        let size = self.analyzer.size();
        let magnitudes = self.analyzer.magnitudes(samples);
        let frequencies = bin_frequencies(size, sample_rate);
        let edges = log_band_edges(&frequencies, self.bar_count);

        let mut values: Vec<f32> = edges
            .windows(2)
            .map(|edge| {
                let (start, end) = (edge[0], edge[1]);
                if end > start {
                    magnitudes[start..end].iter().sum::<f32>() / (end - start) as f32
                } else {
                    0.0
                }
            })
            .collect();

        let peak = values.iter().copied().fold(0.0_f32, f32::max);
        if peak > 0.0 {
            for value in &mut values {
                *value /= peak;
            }
        }

        let exponent = 1.0 / self.sensitivity;
        for value in &mut values {
            *value = value.powf(exponent).clamp(0.0, 1.0);
        }
        values
    }
}

/// Center frequency of each real-FFT bin.
pub fn bin_frequencies(size: usize, sample_rate: u32) -> Vec<f32> {
    let step = sample_rate as f32 / size.max(1) as f32;
    (0..=size / 2).map(|bin| bin as f32 * step).collect()
}

/// `count` values spaced evenly in log10 between `10^start` and `10^stop`,
/// both ends included.
pub fn logspace(start: f32, stop: f32, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![10f32.powf(start)],
        _ => {
            let step = (stop - start) / (count - 1) as f32;
            (0..count)
                .map(|i| 10f32.powf(start + step * i as f32))
                .collect()
        }
    }
}

/// `bar_count + 1` bin indices bounding log-spaced bands from
/// [`MIN_FREQUENCY`] to the highest bin frequency. Indices are clamped to the
/// last bin and never decrease.
pub fn log_band_edges(frequencies: &[f32], bar_count: usize) -> Vec<usize> {
    let Some(&top) = frequencies.last() else {
        return vec![0; bar_count + 1];
    };
    let last = frequencies.len() - 1;
    let top = top.max(MIN_FREQUENCY);

    let mut floor = 0;
    logspace(MIN_FREQUENCY.log10(), top.log10(), bar_count + 1)
        .into_iter()
        .map(|edge| {
            let index = frequencies.partition_point(|f| *f < edge).min(last);
            floor = floor.max(index);
            floor
        })
        .collect()
}

/// Symmetric Hann window coefficient.
pub fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * frequency * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut analyzer = SpectrumAnalyzer::new();
        let magnitudes = analyzer.magnitudes(&sine(1000.0, 48_000, FFT_SIZE));

        let peak = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();
        let expected = (1000.0 * FFT_SIZE as f32 / 48_000.0).round() as usize;
        assert!(peak.abs_diff(expected) <= 1);
    }

    #[test]
    fn logspace_includes_both_ends() {
        let points = logspace(1.0, 3.0, 3);
        assert!((points[0] - 10.0).abs() < 1e-3);
        assert!((points[1] - 100.0).abs() < 1e-2);
        assert!((points[2] - 1000.0).abs() < 1e-1);
        assert_eq!(logspace(2.0, 3.0, 1), vec![100.0]);
    }

    #[test]
    fn band_edges_are_monotonic_and_bounded() {
        let frequencies = bin_frequencies(FFT_SIZE, 44_100);
        let edges = log_band_edges(&frequencies, 32);

        assert_eq!(edges.len(), 33);
        assert!(edges.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(frequencies[edges[0]] >= MIN_FREQUENCY);
        assert!(frequencies[edges[0] - 1] < MIN_FREQUENCY);
        assert_eq!(*edges.last().unwrap(), frequencies.len() - 1);
    }

    #[test]
    fn smoothing_starts_from_zero() {
        let mut smoother = Smoother::new(2, 0.3);
        let first = smoother.apply(&[1.0, 0.5]);
        assert!((first[0] - 0.7).abs() < 1e-6);
        assert!((first[1] - 0.35).abs() < 1e-6);

        let mut last = first;
        for _ in 0..50 {
            last = smoother.apply(&[1.0, 0.5]);
        }
        assert!((last[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn smoothing_state_length_is_fixed() {
        let mut smoother = Smoother::new(2, 0.5);
        let out = smoother.apply(&[1.0, 1.0, 1.0]);
        assert_eq!(out, vec![0.5, 0.5, 0.5]);
        assert_eq!(smoother.len(), 2);
    }

    #[test]
    fn silence_and_zero_rate_give_zero_bands() {
        let mut bands = BandAnalyzer::new(16, 0.3, 1.0);
        assert!(bands.process(&[0.0; 1024], 44_100).iter().all(|v| *v == 0.0));
        assert_eq!(bands.process(&[0.5; 1024], 0), vec![0.0; 16]);
    }

    #[test]
    fn loudest_band_normalizes_to_one() {
        let mut bands = BandAnalyzer::new(16, 0.0, 1.0);
        let values = bands.process(&sine(440.0, 44_100, FFT_SIZE), 44_100);
        let peak = values.iter().copied().fold(0.0_f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-5);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
