//! Valid-mode cross-correlation of the rolling buffer against the etalon.
//!
//! For a signal `x` of length `n` and reference `r` of length `L ≤ n`:
//!
//! ```text
//! c[k] = Σ_{j=0}^{L-1} x[k + j] · r[j]        k = 0 ..= n - L
//! ```
//!
//! Small problems use the direct sum.  Larger ones compute the same values as
//! `IFFT(FFT(x) · conj(FFT(r)))` with an FFT of at least `n` points, which
//! cannot wrap for any valid lag.  All arithmetic is `f64`.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::Normalization;

use super::etalon::Reference;

/// Added to every normalization divisor.
pub const EPSILON: f64 = 1e-10;

/// Windows with less energy than this are treated as silence under
/// [`Normalization::Windowed`].
const ENERGY_FLOOR: f64 = 1e-12;

/// Above this many multiply-adds the FFT path is used.
const DIRECT_MAX_OPS: usize = 1 << 16;

struct Plan {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    /// `conj(FFT(r))`, zero-padded to the plan size.
    reference_conj: Vec<Complex<f64>>,
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

/// Correlates signals against one fixed reference, caching FFT plans and the
/// reference spectrum per transform size.
pub struct Correlator {
    reference: Vec<f64>,
    reference_norm: f64,
    plans: HashMap<usize, Plan>,
    scratch: Vec<Complex<f64>>,
}

impl Correlator {
    /// Uses the norm already computed by [`Reference::new`].
    pub fn new(reference: &Reference) -> Self {
        Self {
            reference: reference.samples().iter().map(|&s| f64::from(s)).collect(),
            reference_norm: reference.norm(),
            plans: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    /// Raw valid-mode correlation; empty when `signal` is shorter than the
    /// reference.
    pub fn correlate_valid(&mut self, signal: &[f32]) -> Vec<f64> {
        let n = signal.len();
        let l = self.reference.len();
        if n < l {
            return Vec::new();
        }
        let lags = n - l + 1;
        if lags.saturating_mul(l) <= DIRECT_MAX_OPS {
            direct(signal, &self.reference)
        } else {
            self.via_fft(signal, lags)
        }
    }

    /// Maximum normalized correlation, or `None` when `signal` is shorter
    /// than the reference.
    pub fn max_score(&mut self, signal: &[f32], mode: Normalization) -> Option<f64> {
        let raw = self.correlate_valid(signal);
        if raw.is_empty() {
            return None;
        }

        let best = match mode {
            Normalization::Reference => {
                let divisor = self.reference_norm + EPSILON;
                raw.iter().map(|c| c / divisor).fold(f64::NEG_INFINITY, f64::max)
            }
            Normalization::Windowed => {
                let energies = window_energies(signal, self.reference.len());
                raw.iter()
                    .zip(energies)
                    .map(|(c, energy)| {
                        if energy <= ENERGY_FLOOR {
                            0.0
                        } else {
                            c / (self.reference_norm * energy.sqrt() + EPSILON)
                        }
                    })
                    .fold(f64::NEG_INFINITY, f64::max)
            }
        };
        Some(best)
    }

    fn via_fft(&mut self, signal: &[f32], lags: usize) -> Vec<f64> {
        let size = signal.len().next_power_of_two();
        let reference = &self.reference;
        let plan = self.plans.entry(size).or_insert_with(|| {
            log::debug!("correlator: planning {size}-point FFT");
            build_plan(reference, size)
        });

        self.scratch.clear();
        self.scratch
            .extend(signal.iter().map(|&s| Complex::new(f64::from(s), 0.0)));
        self.scratch.resize(size, Complex::new(0.0, 0.0));

        plan.forward.process(&mut self.scratch);
        for (x, r) in self.scratch.iter_mut().zip(&plan.reference_conj) {
            *x *= *r;
        }
        plan.inverse.process(&mut self.scratch);

        let scale = 1.0 / size as f64;
        self.scratch[..lags].iter().map(|c| c.re * scale).collect()
    }
}

fn build_plan(reference: &[f64], size: usize) -> Plan {
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut spectrum: Vec<Complex<f64>> = reference
        .iter()
        .map(|&r| Complex::new(r, 0.0))
        .collect();
    spectrum.resize(size, Complex::new(0.0, 0.0));
    forward.process(&mut spectrum);
    for bin in spectrum.iter_mut() {
        *bin = bin.conj();
    }

    Plan {
        forward,
        inverse,
        reference_conj: spectrum,
    }
}

fn direct(signal: &[f32], reference: &[f64]) -> Vec<f64> {
    signal
        .windows(reference.len())
        .map(|w| {
            w.iter()
                .zip(reference)
                .map(|(&x, r)| f64::from(x) * r)
                .sum()
        })
        .collect()
}

/// Sum of squares of every length-`l` window of `signal`.
fn window_energies(signal: &[f32], l: usize) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(signal.len() + 1);
    prefix.push(0.0_f64);
    let mut acc = 0.0_f64;
    for &s in signal {
        acc += f64::from(s) * f64::from(s);
        prefix.push(acc);
    }
    (0..=signal.len() - l)
        .map(|k| (prefix[k + l] - prefix[k]).max(0.0))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn correlator_for(samples: &[f32]) -> Correlator {
        Correlator::new(&Reference::new(samples.to_vec()).expect("valid reference"))
    }

    #[test]
    fn reuses_reference_norm() {
        let reference = Reference::new(vec![3.0, 4.0]).expect("valid reference");
        let correlator = Correlator::new(&reference);
        assert_eq!(correlator.reference_norm, reference.norm());
        assert_eq!(correlator.reference_len(), 2);
    }

    /// Deterministic pseudo-noise in `[-1, 1)`.
    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed.wrapping_mul(2_654_435_761).max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn direct_matches_hand_computed_values() {
        let mut correlator = correlator_for(&[1.0, 2.0]);
        let out = correlator.correlate_valid(&[1.0, 0.0, -1.0, 3.0]);
        assert_eq!(out, vec![1.0, -2.0, 5.0]);
    }

    #[test]
    fn output_length_is_valid_mode() {
        let mut correlator = correlator_for(&[0.5; 10]);
        assert_eq!(correlator.correlate_valid(&[0.0; 10]).len(), 1);
        assert_eq!(correlator.correlate_valid(&[0.0; 25]).len(), 16);
        assert!(correlator.correlate_valid(&[0.0; 9]).is_empty());
    }

    #[test]
    fn fft_path_agrees_with_direct_sum() {
        let reference = noise(700, 7);
        let signal = noise(5_000, 11);
        let expected = direct(&signal, &reference.iter().map(|&r| f64::from(r)).collect::<Vec<_>>());

        let mut correlator = correlator_for(&reference);
        let got = correlator.correlate_valid(&signal);

        assert_eq!(got.len(), expected.len());
        for (k, (g, e)) in got.iter().zip(&expected).enumerate() {
            assert!((g - e).abs() < 1e-9, "lag {k}: fft {g} vs direct {e}");
        }
    }

    #[test]
    fn plans_are_reused_per_size() {
        let reference = noise(400, 3);
        let mut correlator = correlator_for(&reference);
        correlator.correlate_valid(&noise(3_000, 1));
        correlator.correlate_valid(&noise(3_500, 2));
        correlator.correlate_valid(&noise(5_000, 4));
        assert_eq!(correlator.plans.len(), 2); // 4096 and 8192
    }

    #[test]
    fn silence_scores_zero() {
        let reference = noise(300, 5);
        let mut correlator = correlator_for(&reference);
        let silent = vec![0.0_f32; 4_000];
        for mode in [Normalization::Reference, Normalization::Windowed] {
            assert_eq!(correlator.max_score(&silent, mode), Some(0.0));
        }
    }

    #[test]
    fn verbatim_occurrence_scores_one_when_windowed() {
        let reference = noise(512, 9);
        let mut correlator = correlator_for(&reference);

        for offset in [0_usize, 1, 1_234, 3_488] {
            let mut signal = vec![0.0_f32; 4_000];
            signal[offset..offset + reference.len()].copy_from_slice(&reference);
            let score = correlator
                .max_score(&signal, Normalization::Windowed)
                .expect("long enough");
            assert!((score - 1.0).abs() < 1e-6, "offset {offset}: score {score}");
        }
    }

    #[test]
    fn reference_normalization_scores_reference_norm() {
        let reference = noise(256, 21);
        let norm = reference
            .iter()
            .map(|&r| f64::from(r) * f64::from(r))
            .sum::<f64>()
            .sqrt();
        let mut signal = vec![0.0_f32; 2_000];
        signal[900..900 + reference.len()].copy_from_slice(&reference);

        let mut correlator = correlator_for(&reference);
        let score = correlator
            .max_score(&signal, Normalization::Reference)
            .expect("long enough");
        assert!((score - norm).abs() < 1e-6, "score {score} vs norm {norm}");
    }

    #[test]
    fn windowed_score_is_scale_invariant() {
        let reference = noise(128, 2);
        let mut signal = vec![0.0_f32; 1_000];
        for (dst, src) in signal[300..428].iter_mut().zip(&reference) {
            *dst = src * 0.1;
        }
        let mut correlator = correlator_for(&reference);
        let score = correlator
            .max_score(&signal, Normalization::Windowed)
            .expect("long enough");
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn short_signal_has_no_score() {
        let mut correlator = correlator_for(&[0.1; 32]);
        assert_eq!(correlator.max_score(&[0.1; 31], Normalization::Reference), None);
    }

    #[test]
    fn window_energies_are_sliding_sums() {
        let energies = window_energies(&[1.0, 2.0, 3.0], 2);
        assert_eq!(energies, vec![5.0, 13.0]);
    }
}
