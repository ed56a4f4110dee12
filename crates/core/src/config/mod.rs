use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    animation::{Ease, ParameterSpec},
    assets::SourceDescriptor,
    mapping::{MappingDescriptor, BYTE_FREQUENCY_MAX},
    render::Viewport,
    AnalyserSettings, Result,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub assets: AssetConfig,
    pub audio: AudioConfig,
    pub animation: AnimationConfig,
    pub debug: DebugConfig,
    pub viewport: Viewport,
}

impl AppConfig {
    /// Reads a JSON configuration file; missing sections fall back to their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(content)?;
        config.audio.analyser.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Where assets live and which ones the scene waits for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub root: PathBuf,
    pub sources: Vec<SourceDescriptor>,
    /// Loaded item bound as the scene environment map, if present.
    pub environment_map: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("static"),
            sources: SourceDescriptor::defaults(),
            environment_map: Some("environmentMapTexture".to_string()),
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub analyser: AnalyserSettings,
    /// Raw little-endian `f32` mono track; a synthetic pulse plays when unset.
    pub track: Option<PathBuf>,
    pub volume: f32,
    pub looping: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            analyser: AnalyserSettings::default(),
            track: None,
            volume: 0.5,
            looping: true,
        }
    }
}

/// Parameters, frequency mappings and the click animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Magnitude that normalises to `1.0`.
    pub reference_max: f32,
    pub parameters: Vec<ParameterSpec>,
    pub mappings: Vec<MappingDescriptor>,
    pub click: ClickAnimation,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            reference_max: BYTE_FREQUENCY_MAX,
            parameters: ParameterSpec::defaults(),
            mappings: MappingDescriptor::defaults(),
            click: ClickAnimation::default(),
            seed: None,
        }
    }
}

/// Transition triggered by pointer input: `target` moves to
/// `random * amplitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickAnimation {
    pub target: String,
    pub amplitude: f32,
    pub duration_ms: f64,
    pub ease: Ease,
}

impl Default for ClickAnimation {
    fn default() -> Self {
        Self {
            target: "distortion_strength".to_string(),
            amplitude: -1.5,
            duration_ms: 1_000.0,
            ease: Ease::OutExpo,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.assets.sources.len(), 4);
        assert_eq!(config.audio.analyser.fft_size, 32);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = AppConfig::from_json(
            r#"{ "assets": { "sources": [] }, "audio": { "volume": 0.2 }, "debug": { "active": true } }"#,
        )
        .unwrap();
        assert!(config.assets.sources.is_empty());
        assert_eq!(config.assets.root, PathBuf::from("static"));
        assert_eq!(config.audio.volume, 0.2);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert!(config.debug.active);
    }

    #[test]
    fn rejects_invalid_analyser_settings() {
        let err = AppConfig::from_json(r#"{ "audio": { "analyser": { "fft_size": 30 } } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn saves_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("resonance.json");

        let mut config = AppConfig::default();
        config.animation.seed = Some(42);
        config.save(&path).unwrap();

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.animation.seed, Some(42));
        assert_eq!(reloaded.animation.parameters, config.animation.parameters);
    }
}
