//! Rolling analysis buffer.
//!
//! Holds at most `capacity` normalized `f32` samples.  Appending past the
//! capacity drops samples from the **front**, so the buffer always ends with
//! the most recent audio.
//!
//! ```rust
//! use sound_trigger::matcher::RollingWindow;
//!
//! let mut window = RollingWindow::new(4);
//! window.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
//! assert_eq!(window.as_slice(), &[2.0, 3.0, 4.0, 5.0]);
//! ```

use std::collections::VecDeque;

/// Full-scale magnitude of signed 16-bit PCM.
pub const PCM_FULL_SCALE: f32 = 32_768.0;

/// Convert one i16 PCM sample to `[-1.0, 1.0)`.
#[inline]
pub fn pcm_to_f32(sample: i16) -> f32 {
    f32::from(sample) / PCM_FULL_SCALE
}

// ---------------------------------------------------------------------------
// RollingWindow
// ---------------------------------------------------------------------------

/// Bounded, front-truncating sample buffer.
///
/// Storage is reserved once at construction and never grows past it.
pub struct RollingWindow {
    buf: VecDeque<f32>,
    capacity: usize,
}

impl RollingWindow {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RollingWindow capacity must be > 0");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Normalize and append a block of PCM samples.
    pub fn push_pcm(&mut self, block: &[i16]) {
        let skip = block.len().saturating_sub(self.capacity);
        self.buf.extend(block[skip..].iter().map(|&s| pcm_to_f32(s)));
        self.truncate_front();
    }

    pub fn push_slice(&mut self, data: &[f32]) {
        let skip = data.len().saturating_sub(self.capacity);
        self.buf.extend(&data[skip..]);
        self.truncate_front();
    }

    fn truncate_front(&mut self) {
        let excess = self.buf.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.buf.drain(..excess);
        }
    }

    /// Contiguous view, oldest sample first.
    pub fn as_slice(&mut self) -> &[f32] {
        self.buf.make_contiguous()
    }

    /// Discard every sample.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seconds of audio held, assuming `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.buf.len() as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_conversion_divides_by_full_scale() {
        assert_eq!(pcm_to_f32(0), 0.0);
        assert_eq!(pcm_to_f32(16_384), 0.5);
        assert_eq!(pcm_to_f32(i16::MIN), -1.0);
        assert!(pcm_to_f32(i16::MAX) < 1.0);
    }

    #[test]
    fn push_within_capacity() {
        let mut window = RollingWindow::new(8);
        window.push_pcm(&[16_384, -16_384, 0]);
        assert_eq!(window.len(), 3);
        assert_eq!(window.as_slice(), &[0.5, -0.5, 0.0]);
    }

    #[test]
    fn overflow_keeps_most_recent() {
        let mut window = RollingWindow::new(4);
        window.push_slice(&[1.0, 2.0, 3.0]);
        window.push_slice(&[4.0, 5.0, 6.0]);
        assert_eq!(window.len(), 4);
        assert_eq!(window.as_slice(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn block_larger_than_capacity_keeps_its_tail() {
        let mut window = RollingWindow::new(3);
        window.push_slice(&[9.0]);
        window.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(window.as_slice(), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn many_pushes_never_exceed_capacity_and_keep_tail() {
        let capacity = 1_000;
        let mut window = RollingWindow::new(capacity);
        let mut history: Vec<i16> = Vec::new();

        for block_idx in 0..257_i32 {
            let block: Vec<i16> = (0..37).map(|i| ((block_idx * 37 + i) % 30_000) as i16).collect();
            history.extend_from_slice(&block);
            window.push_pcm(&block);
            assert!(window.len() <= capacity);
        }

        let expected: Vec<f32> = history[history.len() - capacity..]
            .iter()
            .map(|&s| pcm_to_f32(s))
            .collect();
        assert_eq!(window.as_slice(), expected.as_slice());
    }

    #[test]
    fn clear_resets_and_is_reusable() {
        let mut window = RollingWindow::new(4);
        window.push_slice(&[1.0, 2.0]);
        window.clear();
        assert!(window.is_empty());

        window.push_slice(&[7.0]);
        assert_eq!(window.as_slice(), &[7.0]);
    }

    #[test]
    fn duration_secs_calculation() {
        let mut window = RollingWindow::new(88_200);
        window.push_slice(&vec![0.0; 22_050]);
        assert!((window.duration_secs(44_100) - 0.5).abs() < 1e-6);
        assert_eq!(window.duration_secs(0), 0.0);
    }

    #[test]
    #[should_panic(expected = "RollingWindow capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = RollingWindow::new(0);
    }
}
