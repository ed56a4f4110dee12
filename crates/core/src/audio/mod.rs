use std::{f32::consts::PI, fmt, path::Path};

use crate::{AnalyserSettings, ResonanceError, Result, SpectrumAnalyser};

/// Upper bound of samples pumped in one frame, so a stalled host does not
/// allocate minutes of audio when it wakes up.
const MAX_PUMP_SECONDS: f64 = 0.25;

/// Anything that can report the current frequency magnitude once per frame.
pub trait FrequencyAnalyser {
    /// Non-negative magnitude of the current frame.
    fn magnitude(&mut self) -> f32;
}

impl FrequencyAnalyser for SpectrumAnalyser {
    fn magnitude(&mut self) -> f32 {
        match self.average_frequency() {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, "spectrum analysis failed, reporting silence");
                0.0
            }
        }
    }
}

/// Produces mono samples on demand.
pub trait SampleSource {
    /// Fills `out` completely. Exhausted sources write silence.
    fn fill(&mut self, out: &mut [f32]);
}

/// Decoded mono PCM held in memory.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    cursor: usize,
    looping: bool,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, looping: bool) -> Self {
        Self {
            samples,
            cursor: 0,
            looping,
        }
    }

    /// Parses raw little-endian `f32` samples.
    pub fn from_le_bytes(bytes: &[u8], looping: bool) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(ResonanceError::InvalidInput(
                "pcm data must be a whole number of f32 samples",
            ));
        }
        let samples = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self::new(samples, looping))
    }

    pub fn from_file(path: &Path, looping: bool) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_le_bytes(&bytes, looping)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleSource for PcmBuffer {
    fn fill(&mut self, out: &mut [f32]) {
        for slot in out.iter_mut() {
            if self.cursor >= self.samples.len() {
                if self.looping && !self.samples.is_empty() {
                    self.cursor = 0;
                } else {
                    *slot = 0.0;
                    continue;
                }
            }
            *slot = self.samples[self.cursor];
            self.cursor += 1;
        }
    }
}

/// Synthetic tone pulsing on a fixed tempo, used when no track is configured.
#[derive(Debug, Clone)]
pub struct PulseSource {
    sample_rate: u32,
    frequency_hz: f32,
    tempo_bpm: f32,
    position: u64,
}

impl PulseSource {
    pub fn new(sample_rate: u32, frequency_hz: f32, tempo_bpm: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frequency_hz,
            tempo_bpm: tempo_bpm.max(1.0),
            position: 0,
        }
    }
}

impl SampleSource for PulseSource {
    fn fill(&mut self, out: &mut [f32]) {
        let rate = self.sample_rate as f32;
        let beat = 60.0 / self.tempo_bpm;
        for slot in out.iter_mut() {
            let t = self.position as f32 / rate;
            let since_beat = t % beat;
            let envelope = (-since_beat * 8.0).exp();
            *slot = envelope * (2.0 * PI * self.frequency_hz * t).sin();
            self.position += 1;
        }
    }
}

/// Streams a [`SampleSource`] into a [`SpectrumAnalyser`] at frame pace.
pub struct AudioEngine {
    source: Box<dyn SampleSource>,
    analyser: SpectrumAnalyser,
    sample_rate: u32,
    volume: f32,
    carry: f64,
    block: Vec<f32>,
}

impl AudioEngine {
    pub fn new(
        source: Box<dyn SampleSource>,
        settings: AnalyserSettings,
        sample_rate: u32,
        volume: f32,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ResonanceError::InvalidInput("sample rate must be positive"));
        }
        Ok(Self {
            source,
            analyser: SpectrumAnalyser::new(settings)?,
            sample_rate,
            volume: volume.clamp(0.0, 1.0),
            carry: 0.0,
            block: Vec::new(),
        })
    }

    /// Returns the sample rate the engine operates at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn analyser(&self) -> &SpectrumAnalyser {
        &self.analyser
    }

    /// Pulls the samples that played during `delta_ms` and feeds them to the
    /// analyser. Returns the number of samples pushed.
    pub fn pump(&mut self, delta_ms: f64) -> usize {
        let exact = delta_ms.max(0.0).min(MAX_PUMP_SECONDS * 1000.0) * self.sample_rate as f64
            / 1000.0
            + self.carry;
        let count = exact.floor() as usize;
        self.carry = exact - count as f64;
        if count == 0 {
            return 0;
        }

        self.block.resize(count, 0.0);
        self.source.fill(&mut self.block);
        let volume = self.volume;
        self.block.iter_mut().for_each(|sample| *sample *= volume);
        self.analyser.push_samples(&self.block);
        count
    }
}

impl FrequencyAnalyser for AudioEngine {
    fn magnitude(&mut self) -> f32 {
        self.analyser.magnitude()
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("sample_rate", &self.sample_rate)
            .field("volume", &self.volume)
            .field("analyser", &self.analyser)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(source: Box<dyn SampleSource>) -> AudioEngine {
        AudioEngine::new(source, AnalyserSettings::default(), 1_000, 0.5).unwrap()
    }

    #[test]
    fn pcm_buffer_loops_or_falls_silent() {
        let mut looping = PcmBuffer::new(vec![1.0, 2.0], true);
        let mut out = [0.0; 5];
        looping.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 1.0, 2.0, 1.0]);

        let mut once = PcmBuffer::new(vec![1.0, 2.0], false);
        once.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn parses_little_endian_pcm() {
        let bytes: Vec<u8> = [0.25_f32, -1.0].iter().flat_map(|s| s.to_le_bytes()).collect();
        let buffer = PcmBuffer::from_le_bytes(&bytes, false).unwrap();
        assert_eq!(buffer.len(), 2);
        assert!(PcmBuffer::from_le_bytes(&bytes[..5], false).is_err());
    }

    #[test]
    fn reads_pcm_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.f32");
        let bytes: Vec<u8> = [0.5_f32; 8].iter().flat_map(|s| s.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();

        let buffer = PcmBuffer::from_file(&path, true).unwrap();
        assert_eq!(buffer.len(), 8);
        assert!(PcmBuffer::from_file(&dir.path().join("missing.f32"), true).is_err());
    }

    #[test]
    fn pump_tracks_fractional_samples() {
        let mut engine = engine(Box::new(PcmBuffer::new(vec![0.0; 64], true)));
        // 16.5 ms at 1 kHz is 16.5 samples: 16 now, the half carries over.
        assert_eq!(engine.pump(16.5), 16);
        assert_eq!(engine.pump(16.5), 17);
        assert_eq!(engine.pump(-3.0), 0);
    }

    #[test]
    fn pump_is_capped_after_a_stall() {
        let mut engine = engine(Box::new(PcmBuffer::new(vec![0.0; 4], true)));
        assert_eq!(engine.pump(60_000.0), 250);
    }

    #[test]
    fn pulse_source_reaches_the_analyser() {
        let mut engine = engine(Box::new(PulseSource::new(1_000, 125.0, 120.0)));
        engine.pump(32.0);
        assert!(engine.magnitude() > 0.0);
    }

    #[test]
    fn muted_engine_reports_silence() {
        let mut engine = engine(Box::new(PulseSource::new(1_000, 125.0, 120.0)));
        engine.set_volume(0.0);
        engine.pump(32.0);
        assert_eq!(engine.magnitude(), 0.0);
    }
}
