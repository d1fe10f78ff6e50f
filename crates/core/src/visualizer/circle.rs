use std::f32::consts::{FRAC_PI_2, TAU};

use super::{blank_frame, Canvas, Visualizer, SHADES};
use crate::{analysis::BandAnalyzer, audio::AudioChunk};

/// Rays get denser toward their tips.
const RAY_GLYPHS: [char; 7] = ['·', '∘', '○', '◯', '●', '◐', '◑'];

/// Character cells are roughly twice as tall as they are wide.
const ASPECT: f32 = 0.5;

/// Angle of band `index` out of `count`, starting at twelve o'clock.
fn band_angle(index: usize, count: usize) -> f32 {
    TAU * index as f32 / count as f32 - FRAC_PI_2
}

fn polar(cx: i64, cy: i64, radius: f32, angle: f32) -> (i64, i64) {
    let x = (cx as f32 + radius * angle.cos()) as i64;
    let y = (cy as f32 + radius * angle.sin() * ASPECT) as i64;
    (x, y)
}

/// Spectrum bands radiating outward from a hollow center.
#[derive(Debug)]
pub struct Circle {
    bands: BandAnalyzer,
}

impl Circle {
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            bands: BandAnalyzer::new(bar_count, smoothing, sensitivity),
        }
    }
}

impl Default for Circle {
    fn default() -> Self {
        Self::new(32, 0.3, 1.0)
    }
}

impl Visualizer for Circle {
    fn name(&self) -> &'static str {
        "circle"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        self.bands.process(&chunk.mono(), sample_rate)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() {
            return blank_frame(width, height);
        }
        let mut canvas = Canvas::new(width, height);
        let radius = (width.min(height * 2) / 4) as i64;
        let inner = radius / 3;
        let (cx, cy) = ((width / 2) as i64, (height / 2) as i64);

        for (index, value) in data.iter().enumerate() {
            let angle = band_angle(index, data.len());
            let length = ((value * radius as f32 * 0.8) as i64).clamp(0, radius);
            for r in inner..inner + length {
                let (x, y) = polar(cx, cy, r as f32, angle);
                let step = ((r - inner) as f32 / length as f32 * RAY_GLYPHS.len() as f32) as usize;
                canvas.set(x, y, RAY_GLYPHS[step.min(RAY_GLYPHS.len() - 1)]);
            }
        }
        canvas.into_rows()
    }
}

/// Filled radial sectors, shaded by distance from the center.
#[derive(Debug)]
pub struct Radial {
    bands: BandAnalyzer,
}

impl Radial {
    pub fn new(bar_count: usize, smoothing: f32, sensitivity: f32) -> Self {
        Self {
            bands: BandAnalyzer::new(bar_count, smoothing, sensitivity),
        }
    }
}

impl Default for Radial {
    fn default() -> Self {
        Self::new(32, 0.3, 1.0)
    }
}

impl Visualizer for Radial {
    fn name(&self) -> &'static str {
        "radial"
    }

    fn process(&mut self, chunk: &AudioChunk, sample_rate: u32) -> Vec<f32> {
        self.bands.process(&chunk.mono(), sample_rate)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() {
            return blank_frame(width, height);
        }
        let mut canvas = Canvas::new(width, height);
        let (cx, cy) = ((width / 2) as i64, (height / 2) as i64);
        let max_radius = cx.min(cy * 2) - 1;
        let shade_step = max_radius / SHADES.len() as i64 + 1;

        for r in (1..=max_radius).rev() {
            let shade = SHADES[((r / shade_step) as usize).min(SHADES.len() - 1)];
            for (index, value) in data.iter().enumerate() {
                let reach = (value * max_radius as f32 * 0.9) as i64;
                if r > reach {
                    continue;
                }
                let start = band_angle(index, data.len());
                let sweep = band_angle(index + 1, data.len()) - start;
                let steps = ((r as f32 * sweep) as usize).max(1);
                for step in 0..steps {
                    let angle = start + sweep * step as f32 / steps as f32;
                    let (x, y) = polar(cx, cy, r as f32, angle);
                    canvas.set(x, y, shade);
                }
            }
        }
        canvas.into_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyphs(rows: &[String]) -> usize {
        rows.iter()
            .flat_map(|row| row.chars())
            .filter(|c| *c != ' ')
            .count()
    }

    #[test]
    fn silent_circle_is_empty() {
        let rows = Circle::default().render(&[0.0; 32], 40, 20);
        assert_eq!(rows.len(), 20);
        assert_eq!(glyphs(&rows), 0);
    }

    #[test]
    fn loud_circle_leaves_the_center_hollow() {
        let rows = Circle::default().render(&[1.0; 32], 80, 40);
        assert!(glyphs(&rows) > 0);
        let center: Vec<char> = rows[20].chars().collect();
        assert_eq!(center[40], ' ');
        assert!(rows.iter().all(|row| row.chars().count() == 80));
    }

    #[test]
    fn oversized_levels_stop_at_the_radius() {
        let circle = Circle::default();
        let huge = circle.render(&[1e9; 8], 40, 20);
        assert_eq!(huge.len(), 20);
        assert!(huge.iter().all(|row| row.chars().count() == 40));
        assert_eq!(circle.render(&[f32::INFINITY; 8], 40, 20), huge);
        assert_eq!(circle.render(&[-1e9; 8], 40, 20), circle.render(&[0.0; 8], 40, 20));
    }

    #[test]
    fn radial_sectors_are_shaded() {
        let rows = Radial::default().render(&[1.0; 8], 40, 20);
        let shaded = rows
            .iter()
            .flat_map(|row| row.chars())
            .filter(|c| SHADES.contains(c))
            .count();
        assert!(shaded > 0);
        assert_eq!(shaded, glyphs(&rows));
    }

    #[test]
    fn tiny_frames_still_have_the_right_shape() {
        for (width, height) in [(0, 0), (1, 1), (3, 0), (0, 4)] {
            let rows = Radial::default().render(&[1.0; 8], width, height);
            assert_eq!(rows.len(), height);
            assert!(rows.iter().all(|row| row.chars().count() == width));
        }
    }
}
