use super::ChannelCore;
use nalgebra::{DVector, Point2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClockParams {
    /// Spatial period of the clocking signal, angstroms.
    pub wavelength: f64,
    /// Clock frequency, Hz.
    pub frequency: f64,
    /// Waveform amplitude, eV.
    pub amplitude: f64,
    /// Waveform offset, eV.
    pub offset: f64,
    /// Fraction of a clock period between samples.
    pub sample_fraction: f64,
    /// Squareness of the waveform; zero is a pure sinusoid.
    pub sharpness: f64,
    /// Apply the same potential to every site.
    pub flat: bool,
    pub scale: f64,
    pub enabled: bool,
}

impl Default for ClockParams {
    fn default() -> Self {
        Self {
            wavelength: 2e3,
            frequency: 0.1,
            amplitude: 0.1,
            offset: 0.0,
            sample_fraction: 1e-2,
            sharpness: 0.0,
            flat: false,
            scale: 1.0,
            enabled: true,
        }
    }
}

/// Travelling-wave clocking field. Never exchanges charge with the surface.
#[derive(Debug, Clone)]
pub struct Clock {
    pub(crate) core: ChannelCore,
    params: ClockParams,
    time: f64,
    xs: Vec<f64>,
    bias: DVector<f64>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(ClockParams::default())
    }
}

impl Clock {
    pub fn new(params: ClockParams) -> Self {
        let mut core = ChannelCore::new(params.scale);
        core.enabled = params.enabled;
        Self {
            core,
            params,
            time: 0.0,
            xs: Vec::new(),
            bias: DVector::zeros(0),
        }
    }

    pub fn params(&self) -> &ClockParams {
        &self.params
    }

    /// Internal clock time, s.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.params.frequency = frequency;
        self.refresh();
    }

    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.params.amplitude = amplitude;
        self.refresh();
    }

    pub(super) fn setup(&mut self, sites: &[Point2<f64>], kt: f64, rng: &mut impl Rng) {
        self.core.setup(sites.to_vec(), kt, false, rng);
        self.xs = sites.iter().map(|p| p.x).collect();
        self.refresh();
    }

    pub(super) fn tick(&self) -> f64 {
        self.params.sample_fraction / self.params.frequency
    }

    pub(super) fn advance(&mut self, dt: f64) {
        if self.core.enabled {
            self.time += dt;
            self.refresh();
        }
    }

    pub(super) fn update(&mut self, occ: &[usize], nocc: &[usize]) {
        self.core.store_occupation(occ, nocc);
        self.core.exit_rates = vec![0.0; occ.len()];
        self.core.entry_rates = vec![0.0; nocc.len()];
        self.core.tickrate = 0.0;
    }

    pub(super) fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    /// Field at position `x` (angstroms) and time `t`, eV.
    pub fn waveform(&self, x: f64, t: f64) -> f64 {
        let p = &self.params;
        let xx = if p.flat { 0.0 } else { x / p.wavelength };
        let phase = 2.0 * PI * (xx - p.frequency * t);
        p.offset + p.amplitude * sinus(phase, p.sharpness)
    }

    fn refresh(&mut self) {
        self.bias = DVector::from_iterator(
            self.xs.len(),
            self.xs.iter().map(|&x| self.waveform(x, self.time)),
        );
    }
}

/// 2π-periodic function bounded by ±1; squarer as `b` grows.
fn sinus(phase: f64, b: f64) -> f64 {
    let s = phase.sin();
    ((1.0 + b * b) / (1.0 + (b * s).powi(2))).sqrt() * s
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TOLERANCE: f64 = 1e-12;

    fn clock_over(xs: &[f64], params: ClockParams) -> Clock {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let sites: Vec<_> = xs.iter().map(|&x| Point2::new(x, 0.0)).collect();
        let mut clock = Clock::new(params);
        clock.setup(&sites, 1.0, &mut rng);
        clock
    }

    #[test]
    fn waveform_is_periodic_in_time() {
        let clock = clock_over(&[0.0], ClockParams::default());
        let period = 1.0 / clock.params().frequency;
        for x in [0.0, 300.0, 1234.0] {
            assert!((clock.waveform(x, 0.7) - clock.waveform(x, 0.7 + period)).abs() < TOLERANCE);
        }
    }

    #[test]
    fn waveform_is_bounded_by_amplitude_for_any_sharpness() {
        for b in [0.0, 1.0, 10.0] {
            let clock = clock_over(
                &[0.0],
                ClockParams {
                    sharpness: b,
                    ..Default::default()
                },
            );
            for i in 0..200 {
                let v = clock.waveform(10.0 * i as f64, 0.0);
                assert!(v.abs() <= 0.1 + TOLERANCE);
            }
        }
    }

    #[test]
    fn quarter_wavelength_reaches_peak() {
        let clock = clock_over(&[500.0], ClockParams::default());
        assert!((clock.bias()[0] - 0.1).abs() < TOLERANCE);
    }

    #[test]
    fn flat_mode_is_spatially_uniform() {
        let mut clock = clock_over(
            &[0.0, 500.0, 1500.0],
            ClockParams {
                flat: true,
                ..Default::default()
            },
        );
        clock.advance(2.5);
        let b = clock.bias();
        assert!((b[0] - b[1]).abs() < TOLERANCE);
        assert!((b[0] - b[2]).abs() < TOLERANCE);
        assert!((b[0] + 0.1).abs() < TOLERANCE);
    }

    #[test]
    fn tick_samples_a_fixed_fraction_of_the_period() {
        let clock = clock_over(&[0.0], ClockParams::default());
        assert!((clock.tick() - 0.1).abs() < TOLERANCE);
    }

    fn assert_bias_tracks_waveform(clock: &Clock, xs: &[f64]) {
        for (i, &x) in xs.iter().enumerate() {
            assert!((clock.bias()[i] - clock.waveform(x, clock.time())).abs() < TOLERANCE);
        }
    }

    #[test]
    fn setters_recompute_the_stored_bias() {
        let xs = [0.0, 250.0, 700.0];
        let mut clock = clock_over(&xs, ClockParams::default());
        clock.advance(1.0);
        let before = clock.bias().clone();

        clock.set_frequency(0.35);
        assert_eq!(clock.params().frequency, 0.35);
        assert_bias_tracks_waveform(&clock, &xs);
        assert!((clock.bias() - &before).amax() > 1e-3);

        clock.set_amplitude(0.3);
        assert_eq!(clock.params().amplitude, 0.3);
        assert_bias_tracks_waveform(&clock, &xs);
    }

    #[test]
    fn frequency_sets_the_sampling_tick() {
        let mut clock = clock_over(&[0.0], ClockParams::default());
        clock.set_frequency(0.5);
        assert!((clock.tick() - 0.02).abs() < TOLERANCE);
    }

    #[test]
    fn disabled_clock_holds_its_phase() {
        let mut clock = clock_over(&[0.0], ClockParams::default());
        clock.core.enabled = false;
        clock.advance(3.0);
        assert_eq!(clock.time(), 0.0);
    }
}
