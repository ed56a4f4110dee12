use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{ResonanceError, Result};

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

/// Tuning of the [`SpectrumAnalyser`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    /// Window length, a power of two between 32 and 32768.
    pub fft_size: usize,
    /// Weight of the previous frame when smoothing bin magnitudes.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 32,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(ResonanceError::InvalidInput(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ResonanceError::InvalidInput(
                "smoothing must lie within [0, 1]",
            ));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(ResonanceError::InvalidInput(
                "min decibels must be below max decibels",
            ));
        }
        Ok(())
    }
}

/// Byte-scaled spectrum of the most recent `fft_size` samples, smoothed over
/// time the way a browser analyser node does it.
pub struct SpectrumAnalyser {
    settings: AnalyserSettings,
    window: Vec<f32>,
    samples: Vec<f32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    fft: FftResources,
}

impl SpectrumAnalyser {
    pub fn new(settings: AnalyserSettings) -> Result<Self> {
        settings.validate()?;
        let size = settings.fft_size;
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        Ok(Self {
            settings,
            window: (0..size).map(|i| blackman_value(i, size)).collect(),
            samples: vec![0.0; size],
            smoothed: vec![0.0; size / 2],
            bytes: vec![0; size / 2],
            fft: FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            },
        })
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    /// Number of frequency bins, half the FFT size.
    pub fn bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Appends samples, keeping only the latest `fft_size` of them.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let size = self.settings.fft_size;
        if samples.len() >= size {
            self.samples.copy_from_slice(&samples[samples.len() - size..]);
        } else {
            self.samples.drain(..samples.len());
            self.samples.extend_from_slice(samples);
        }
    }

    /// Recomputes the spectrum and returns one byte per bin. Every call also
    /// advances the temporal smoothing.
    pub fn byte_frequency_data(&mut self) -> Result<&[u8]> {
        let size = self.fft.size;
        for (index, (sample, weight)) in self.samples.iter().zip(&self.window).enumerate() {
            self.fft.input[index] = sample * weight;
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let AnalyserSettings {
            smoothing,
            min_decibels,
            max_decibels,
            ..
        } = self.settings;
        let scale = 255.0 / (max_decibels - min_decibels);

        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft.spectrum[bin].norm() / size as f32;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
            let decibels = 20.0 * smoothed.log10();
            self.bytes[bin] = ((decibels - min_decibels) * scale).floor().clamp(0.0, 255.0) as u8;
        }

        Ok(&self.bytes)
    }

    /// Mean of [`SpectrumAnalyser::byte_frequency_data`], in `0..=255`.
    pub fn average_frequency(&mut self) -> Result<f32> {
        let bytes = self.byte_frequency_data()?;
        let sum: u32 = bytes.iter().map(|&byte| u32::from(byte)).sum();
        Ok(sum as f32 / bytes.len() as f32)
    }

    /// Clears the sample history and the smoothing state.
    pub fn reset(&mut self) {
        self.samples.fill(0.0);
        self.smoothed.fill(0.0);
        self.bytes.fill(0);
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("settings", &self.settings)
            .field("bytes", &self.bytes)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / len as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> SpectrumAnalyser {
        SpectrumAnalyser::new(AnalyserSettings::default()).unwrap()
    }

    fn sine(len: usize, cycles: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * cycles * i as f32 / len as f32).sin())
            .collect()
    }

    #[test]
    fn silence_reads_as_zero() {
        let mut analyser = analyser();
        assert_eq!(analyser.average_frequency().unwrap(), 0.0);
        assert_eq!(analyser.bin_count(), 16);
    }

    #[test]
    fn loud_tone_raises_its_bin() {
        let mut analyser = analyser();
        analyser.push_samples(&sine(32, 4.0, 1.0));

        // Let the smoothing settle.
        for _ in 0..20 {
            analyser.byte_frequency_data().unwrap();
        }
        let bytes = analyser.byte_frequency_data().unwrap().to_vec();
        assert_eq!(bytes[4], 255);
        assert!(analyser.average_frequency().unwrap() > 0.0);
    }

    #[test]
    fn smoothing_decays_gradually() {
        let mut analyser = analyser();
        analyser.push_samples(&sine(32, 4.0, 1.0));
        let loud = analyser.average_frequency().unwrap();

        analyser.push_samples(&vec![0.0; 32]);
        let fading = analyser.average_frequency().unwrap();
        assert!(fading > 0.0);
        assert!(fading <= loud);

        analyser.reset();
        assert_eq!(analyser.average_frequency().unwrap(), 0.0);
    }

    #[test]
    fn keeps_only_the_latest_window() {
        let mut analyser = analyser();
        analyser.push_samples(&[1.0; 40]);
        analyser.push_samples(&[0.5; 8]);
        assert_eq!(analyser.samples.len(), 32);
        assert_eq!(analyser.samples[0], 1.0);
        assert_eq!(analyser.samples[31], 0.5);
    }

    #[test]
    fn rejects_invalid_settings() {
        let settings = AnalyserSettings {
            fft_size: 48,
            ..Default::default()
        };
        assert!(SpectrumAnalyser::new(settings).is_err());

        let settings = AnalyserSettings {
            min_decibels: -10.0,
            max_decibels: -20.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ResonanceError::InvalidInput(_))
        ));
    }
}
