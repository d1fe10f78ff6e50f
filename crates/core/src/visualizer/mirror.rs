use super::{bar_cell, blank_frame, fit_row, Visualizer, SHADES};
use crate::{analysis::BandAnalyzer, audio::AudioChunk};

fn shade(intensity: f32, ramp: &[char]) -> char {
    ramp[((intensity * ramp.len() as f32) as usize).min(ramp.len() - 1)]
}

/// Bars of `data` clipped to `width`, each `bar_width` columns wide.
fn bar_layout(data: &[f32], width: usize) -> (&[f32], usize) {
    let bar_width = (width / data.len().max(1)).max(1);
    (&data[..data.len().min(width / bar_width)], bar_width)
}

fn shaded_row(
    data: &[f32],
    width: usize,
    threshold: f32,
    rows: usize,
    ramp: impl Fn(usize) -> &'static [char],
) -> String {
    let (visible, bar_width) = bar_layout(data, width);
    let mut line = String::with_capacity(width * 3);
    for (index, value) in visible.iter().enumerate() {
        let glyph = bar_cell(*value, threshold, rows).map_or(' ', |level| shade(level, ramp(index)));
        line.extend(std::iter::repeat(glyph).take(bar_width));
    }
    fit_row(&line, width)
}

/// Spectrum reflected about the horizontal midline.
#[derive(Debug)]
pub struct Mirror {
    bands: BandAnalyzer,
}

impl Mirror {
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            bands: BandAnalyzer::new(bar_count, smoothing, sensitivity),
        }
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new(32, 0.3, 1.0)
    }
}

impl Visualizer for Mirror {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        self.bands.process(&chunk.mono(), sample_rate)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() || width == 0 {
            return blank_frame(width, height);
        }
        // The lower half takes the extra row of an odd height.
        let upper = height / 2;
        let lower = height - upper;

        let top = (0..upper).map(|row| {
            let threshold = 1.0 - row as f32 / upper as f32;
            shaded_row(data, width, threshold, upper, |_| &SHADES[..])
        });
        let bottom = (0..lower).map(|row| {
            let threshold = row as f32 / lower as f32;
            shaded_row(data, width, threshold, lower, |_| &SHADES[..])
        });
        top.chain(bottom).collect()
    }
}

const CORE: [char; 2] = ['▓', '█'];
const MIDDLE: [char; 2] = ['▒', '▓'];
const EDGE: [char; 2] = ['░', '▒'];

/// Half as many bands, mirrored left-right around the center column.
#[derive(Debug)]
pub struct Symmetry {
    bands: BandAnalyzer,
}

impl Symmetry {
    /// `bar_count` is the displayed total; half of it is analysed.
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            bands: BandAnalyzer::new((bar_count / 2).max(1), smoothing, sensitivity),
        }
    }
}

impl Default for Symmetry {
    fn default() -> Self {
        Self::new(32, 0.3, 1.0)
    }
}

impl Visualizer for Symmetry {
    fn name(&self) -> &'static str {
        "symmetry"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        let values = self.bands.process(&chunk.mono(), sample_rate);
        values.iter().rev().chain(&values).copied().collect()
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() || width == 0 {
            return blank_frame(width, height);
        }
        let half = data.len() as f32 / 2.0;
        let ramp = |index: usize| -> &'static [char] {
            let distance = (index as f32 - half).abs() / half;
            if distance < 0.3 {
                &CORE
            } else if distance < 0.7 {
                &MIDDLE
            } else {
                &EDGE
            }
        };

        (0..height)
            .map(|row| {
                let threshold = 1.0 - row as f32 / height as f32;
                shaded_row(data, width, threshold, height, ramp)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_reflects_about_the_midline() {
        let rows = Mirror::default().render(&[1.0, 0.0], 2, 4);
        assert_eq!(rows, vec!["░ ", "█ ", "█░", "█ "]);
    }

    #[test]
    fn odd_heights_give_the_extra_row_to_the_bottom() {
        let rows = Mirror::default().render(&[0.5], 3, 5);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.chars().count() == 3));
        assert_eq!(rows[0], "   ");
        assert_eq!(rows[1], "░░░");
        assert_ne!(rows[2], "   ");
        assert_eq!(rows[4], "   ");
    }

    #[test]
    fn symmetry_output_is_a_palindrome() {
        let mut symmetry = Symmetry::new(16, 0.0, 1.0);
        let tone: Vec<f32> = (0..2048).map(|n| (n as f32 * 0.05).sin()).collect();
        let values = symmetry.process(&AudioChunk::new(tone, 1), 44_100);

        assert_eq!(values.len(), 16);
        let reversed: Vec<f32> = values.iter().rev().copied().collect();
        assert_eq!(values, reversed);
    }

    #[test]
    fn symmetry_center_is_densest() {
        let rows = Symmetry::default().render(&[1.0; 10], 10, 2);
        let bottom: Vec<char> = rows[1].chars().collect();
        assert_eq!(bottom[5], '█');
        assert_eq!(bottom[0], '▒');
    }
}
