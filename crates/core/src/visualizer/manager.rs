use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{
    blank_frame, fit_frame, Circle, CompactSpectrum, DualOscilloscope, Mirror, Oscilloscope,
    Radial, SimpleWaveform, Spectrum, Stereo, StereoWaveform, Symmetry, VectorScope, Visualizer,
    Waveform,
};
use crate::{audio::AudioChunk, config::VisualizerConfig};

/// Name-keyed registry of visualizers plus the current selection.
///
/// Registration order is preserved and drives [`next`](Self::next).
pub struct VisualizerManager {
    visualizers: Vec<Box<dyn Visualizer>>,
    current: Option<usize>,
}

impl VisualizerManager {
    /// Empty registry with nothing selected.
    pub fn empty() -> Self {
        Self {
            visualizers: Vec::new(),
            current: None,
        }
    }

    /// Every built-in variant with default parameters, `spectrum` selected.
    pub fn new() -> Self {
        Self::with_config(&VisualizerConfig::default())
    }

    /// Every built-in variant, spectral ones using the configured bar count,
    /// smoothing and sensitivity. Selects `config.kind`, falling back to the
    /// first registered variant when the name is unknown.
    pub fn with_config(config: &VisualizerConfig) -> Self {
        let (bars, alpha, gain) = (config.bar_count, config.smoothing, config.sensitivity);
        let mut manager = Self::empty();
        manager.register(Box::new(Spectrum::new(bars, alpha, gain)));
        manager.register(Box::new(CompactSpectrum::new(bars, alpha, gain)));
        manager.register(Box::new(Waveform::default()));
        manager.register(Box::new(SimpleWaveform::new()));
        manager.register(Box::new(Circle::new(bars, alpha, gain)));
        manager.register(Box::new(Radial::new(bars, alpha, gain)));
        manager.register(Box::new(Mirror::new(bars, alpha, gain)));
        manager.register(Box::new(Symmetry::new(bars, alpha, gain)));
        manager.register(Box::new(Stereo::new((bars / 2).max(1), alpha, gain)));
        manager.register(Box::new(StereoWaveform::default()));
        manager.register(Box::new(Oscilloscope::default()));
        manager.register(Box::new(DualOscilloscope::default()));
        manager.register(Box::new(VectorScope::default()));

        if !manager.switch_to(&config.kind) {
            tracing::warn!(kind = %config.kind, "unknown visualizer; using the first one");
            manager.current = Some(0);
        }
        manager
    }

    /// Adds `visualizer`, replacing any registered one with the same name in
    /// place. The first registration becomes current.
    pub fn register(&mut self, visualizer: Box<dyn Visualizer>) {
        let name = visualizer.name();
        match self.position(name) {
            Some(index) => self.visualizers[index] = visualizer,
            None => self.visualizers.push(visualizer),
        }
        if self.current.is_none() {
            self.current = Some(0);
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.visualizers.iter().position(|viz| viz.name() == name)
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.visualizers.iter().map(|viz| viz.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.visualizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visualizers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Visualizer> {
        self.position(name).map(|index| self.visualizers[index].as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Visualizer + 'static)> {
        let index = self.position(name)?;
        Some(self.visualizers[index].as_mut())
    }

    pub fn current(&self) -> Option<&dyn Visualizer> {
        self.current.map(|index| self.visualizers[index].as_ref())
    }

    pub fn current_name(&self) -> Option<&'static str> {
        self.current().map(|viz| viz.name())
    }

    /// Selects `name`. Returns false, keeping the selection, if it is unknown.
    pub fn switch_to(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.current = Some(index);
                tracing::debug!(visualizer = name, "visualizer selected");
                true
            }
            None => false,
        }
    }

    /// Cycles the selection forward (or backward) and returns the new name.
    pub fn next(&mut self, reverse: bool) -> Option<&'static str> {
        let count = self.visualizers.len();
        if count == 0 {
            return None;
        }
        let index = self.current.unwrap_or(0);
        let index = if reverse {
            (index + count - 1) % count
        } else {
            (index + 1) % count
        };
        self.current = Some(index);
        let name = self.visualizers[index].name();
        tracing::debug!(visualizer = name, "visualizer selected");
        Some(name)
    }

    /// Runs the current visualizer's `process`. Returns `None` when nothing
    /// is selected or the visualizer panicked.
    pub fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Option<Vec<f32>> {
        let index = self.current?;
        let visualizer = &mut self.visualizers[index];
        match catch_unwind(AssertUnwindSafe(|| visualizer.process(chunk, sample_rate))) {
            Ok(data) => Some(data),
            Err(_) => {
                tracing::warn!(visualizer = visualizer.name(), "visualizer process panicked");
                None
            }
        }
    }

    /// Renders with the current visualizer. Always returns exactly `height`
    /// rows of `width` characters.
    pub fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        let Some(visualizer) = self.current() else {
            return blank_frame(width, height);
        };
        match catch_unwind(AssertUnwindSafe(|| visualizer.render(data, width, height))) {
            Ok(rows) => {
                let well_formed = rows.len() == height
                    && rows.iter().all(|row| row.chars().count() == width);
                if well_formed {
                    rows
                } else {
                    tracing::warn!(visualizer = visualizer.name(), "ill-shaped frame; refitting");
                    fit_frame(rows, width, height)
                }
            }
            Err(_) => {
                tracing::warn!(visualizer = visualizer.name(), "visualizer render panicked");
                blank_frame(width, height)
            }
        }
    }
}

impl Default for VisualizerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VisualizerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizerManager")
            .field("visualizers", &self.list())
            .field("current", &self.current_name())
            .finish()
    }
}
