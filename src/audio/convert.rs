//! Sample conversion from whatever the device delivers to what the matcher
//! consumes: mono `i16` at the configured rate.
//!
//! ```text
//! device callback (any channels, any rate, f32)
//!   └─▶ downmix_to_mono ─▶ LinearResampler ─▶ f32_to_i16 ─▶ CpalDevice
//! ```
//!
//! When the device already runs mono at the configured rate every step is a
//! pass-through and `i16` input comes back bit-exact.

// ---------------------------------------------------------------------------
// downmix_to_mono / f32_to_i16
// ---------------------------------------------------------------------------

/// Average interleaved channels into one.
///
/// A trailing partial frame is ignored; `channels == 0` yields nothing.
///
/// ```rust
/// use sound_trigger::audio::convert::downmix_to_mono;
///
/// let stereo = [0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Full-scale `f32` to `i16`, saturating at the rails.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16
}

// ---------------------------------------------------------------------------
// LinearResampler
// ---------------------------------------------------------------------------

/// Streaming linear-interpolation resampler.
///
/// Interpolation state carries over between calls, so feeding a signal in
/// arbitrary pieces gives the same output as feeding it at once.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input samples advanced per output sample.
    step: f64,
    /// Position of the next output sample, relative to `last`.
    phase: f64,
    /// Final input sample of the previous call.
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = if source_rate == 0 || target_rate == 0 {
            1.0
        } else {
            f64::from(source_rate) / f64::from(target_rate)
        };
        Self {
            step,
            phase: 0.0,
            last: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Resample `input`, appending to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        let Some((&first, tail)) = input.split_first() else {
            return;
        };
        // Work on `[last, rest...]`; on the very first call `last` is the
        // first input sample.
        let (last, rest) = match self.last {
            Some(last) => (last, input),
            None => (first, tail),
        };
        let at = |i: usize| if i == 0 { last } else { rest[i - 1] };

        let n = rest.len();
        while self.phase < n as f64 {
            let idx = self.phase as usize;
            let frac = (self.phase - idx as f64) as f32;
            out.push(at(idx) * (1.0 - frac) + at(idx + 1) * frac);
            self.phase += self.step;
        }
        self.phase -= n as f64;
        self.last = Some(rest.last().copied().unwrap_or(last));
    }
}

// ---------------------------------------------------------------------------
// MonoConverter
// ---------------------------------------------------------------------------

/// The full device-to-matcher conversion for one open stream.
#[derive(Debug, Clone)]
pub struct MonoConverter {
    channels: u16,
    resampler: LinearResampler,
    mono: Vec<f32>,
    resampled: Vec<f32>,
}

impl MonoConverter {
    pub fn new(channels: u16, source_rate: u32, target_rate: u32) -> Self {
        Self {
            channels,
            resampler: LinearResampler::new(source_rate, target_rate),
            mono: Vec::new(),
            resampled: Vec::new(),
        }
    }

    /// Convert one interleaved callback buffer.
    pub fn convert(&mut self, interleaved: &[f32]) -> Vec<i16> {
        self.mono = downmix_to_mono(interleaved, self.channels);
        self.resampled.clear();
        self.resampler.process(&self.mono, &mut self.resampled);
        self.resampled.iter().map(|&s| f32_to_i16(s)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
