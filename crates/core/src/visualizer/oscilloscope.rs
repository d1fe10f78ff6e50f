use super::{
    blank_frame, deinterleave, fixed_length, interleave, normalize_peak, peak_abs, resample,
    Canvas, Visualizer,
};
use crate::{analysis::Smoother, audio::AudioChunk};

const SCOPE_SAMPLES: usize = 128;
const DUAL_SAMPLES: usize = 64;
const VECTOR_POINTS: usize = 64;

const FLAT: char = '─';
const UP: char = '╱';
const DOWN: char = '╲';
const VERTICAL: char = '│';
const DOT: char = '·';

/// Divides both channels by their shared peak so relative levels survive.
fn normalize_jointly(left: &mut [f32], right: &mut [f32]) {
    let peak = peak_abs(left).max(peak_abs(right));
    if peak > 0.0 {
        for value in left.iter_mut().chain(right.iter_mut()) {
            *value /= peak;
        }
    }
}

/// Single-trace scope joining successive samples with slope glyphs.
#[derive(Debug)]
pub struct Oscilloscope {
    smoother: Smoother,
}

impl Oscilloscope {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoother: Smoother::new(SCOPE_SAMPLES, smoothing),
        }
    }
}

impl Default for Oscilloscope {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Visualizer for Oscilloscope {
    fn name(&self) -> &'static str {
        "oscilloscope"
    }

    fn process(&mut self, chunk: &AudioChunk, _sample_rate: u32) -> Vec<f32> {
        let mut samples = fixed_length(&chunk.mono(), SCOPE_SAMPLES);
        normalize_peak(&mut samples);
        self.smoother.apply(&samples)
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() || height == 0 {
            return blank_frame(width, height);
        }
        let mut canvas = Canvas::new(width, height);
        canvas.hline((height / 2) as i64, DOT);

        let span = (height - 1) as f32 / 2.0;
        let bottom = height as i64 - 1;
        let mut previous: Option<i64> = None;

        for (x, value) in resample(data, width).into_iter().enumerate() {
            let x = x as i64;
            let y = (((1.0 - value) * span) as i64).clamp(0, bottom);
            match previous {
                None => canvas.set(x, y, DOT),
                Some(prev) if prev == y => canvas.set(x, y, FLAT),
                Some(prev) if y < prev => {
                    for py in y..=prev {
                        if py == y {
                            canvas.set(x, py, UP);
                        } else if py == prev {
                            canvas.set(x - 1, py, DOWN);
                        } else {
                            canvas.set(x, py, VERTICAL);
                        }
                    }
                }
                Some(prev) => {
                    for py in prev..=y {
                        if py == prev {
                            canvas.set(x - 1, py, UP);
                        } else if py == y {
                            canvas.set(x, py, DOWN);
                        } else {
                            canvas.set(x, py, VERTICAL);
                        }
                    }
                }
            }
            previous = Some(y);
        }
        canvas.into_rows()
    }
}

/// Two stacked traces, left on top and right below.
#[derive(Debug)]
pub struct DualOscilloscope {
    left: Smoother,
    right: Smoother,
}

impl DualOscilloscope {
    pub fn new(smoothing: f32) -> Self {
        Self {
            left: Smoother::new(DUAL_SAMPLES, smoothing),
            right: Smoother::new(DUAL_SAMPLES, smoothing),
        }
    }

    /// Draws one channel inside rows `top..bottom` around `center`.
    fn trace(canvas: &mut Canvas, data: &[f32], width: usize, center: i64, top: i64, bottom: i64) {
        let amplitude = (center - top).min(bottom - center - 1) as f32;
        let mut previous: Option<i64> = None;

        for (x, value) in resample(data, width).into_iter().enumerate() {
            let y = ((center as f32 - value * amplitude) as i64)
                .min(bottom - 1)
                .max(top);
            let glyph = match previous {
                None => '●',
                Some(prev) if prev == y => FLAT,
                Some(prev) if y < prev => UP,
                Some(_) => DOWN,
            };
            canvas.set(x as i64, y, glyph);
            previous = Some(y);
        }
    }
}

impl Default for DualOscilloscope {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Visualizer for DualOscilloscope {
    fn name(&self) -> &'static str {
        "oscilloscope_dual"
    }

    fn process(&mut self, chunk: &AudioChunk, _sample_rate: u32) -> Vec<f32> {
        let (left, right) = chunk.stereo();
        let mut left = fixed_length(&left, DUAL_SAMPLES);
        let mut right = fixed_length(&right, DUAL_SAMPLES);
        normalize_jointly(&mut left, &mut right);
        interleave(&self.left.apply(&left), &self.right.apply(&right))
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() {
            return blank_frame(width, height);
        }
        let (left, right) = deinterleave(data);
        let mut canvas = Canvas::new(width, height);

        let upper = (height / 2) as i64;
        let lower = height as i64 - upper;
        let left_center = upper / 2;
        let right_center = upper + lower / 2;
        canvas.hline(left_center, DOT);
        canvas.hline(right_center, DOT);

        Self::trace(&mut canvas, &left, width, left_center, 0, upper);
        Self::trace(&mut canvas, &right, width, right_center, upper, height as i64);
        canvas.into_rows()
    }
}

/// Lissajous display: left amplitude on X, right on Y.
#[derive(Debug)]
pub struct VectorScope {
    smoother: Smoother,
}

impl VectorScope {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoother: Smoother::new(VECTOR_POINTS * 2, smoothing),
        }
    }
}

impl Default for VectorScope {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl Visualizer for VectorScope {
    fn name(&self) -> &'static str {
        "vectorscope"
    }

    fn process(&mut self, chunk: &AudioChunk, _sample_rate: u32) -> Vec<f32> {
        let left: Vec<f32> = chunk.channel(0).collect();
        // Mono collapses onto the X axis.
        let right: Vec<f32> = if chunk.channels() == 1 {
            vec![0.0; left.len()]
        } else {
            chunk.channel(1).collect()
        };
        let mut left = fixed_length(&left, VECTOR_POINTS);
        let mut right = fixed_length(&right, VECTOR_POINTS);
        normalize_jointly(&mut left, &mut right);
        self.smoother.apply(&interleave(&left, &right))
    }

    fn render(&self, data: &[f32], width: usize, height: usize) -> Vec<String> {
        if data.is_empty() {
            return blank_frame(width, height);
        }
        let (xs, ys) = deinterleave(data);
        let mut canvas = Canvas::new(width, height);
        let (cx, cy) = ((width / 2) as i64, (height / 2) as i64);
        let scale_x = (cx.min(10) - 1) as f32;
        let scale_y = (cy.min(5) - 1) as f32;
        canvas.hline(cy, DOT);
        canvas.vline(cx, DOT);

        const RECENCY: [char; 4] = ['·', '∘', '○', '●'];
        let per_glyph = xs.len() / RECENCY.len() + 1;
        for (index, (x, y)) in xs.iter().zip(&ys).enumerate() {
            let px = (cx as f32 + x * scale_x) as i64;
            let py = (cy as f32 - y * scale_y) as i64;
            if matches!(canvas.get(px, py), Some(' ') | Some(DOT)) {
                canvas.set(px, py, RECENCY[(index / per_glyph).min(RECENCY.len() - 1)]);
            }
        }
        canvas.into_rows()
    }
}
