//! Asset descriptors and the loading barrier.

mod loaders;
mod resources;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub use loaders::{AssetLoader, Completion, FileLoader, LoaderRegistry};
pub use resources::{
    LoadState, ResourceEvent, ResourceLoader, LOAD_ERROR_EVENT, READY_EVENT,
};

/// Tag selecting which loader handles a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Texture,
    CubeTexture,
    Gltf,
    Audio,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Texture,
        SourceKind::CubeTexture,
        SourceKind::Gltf,
        SourceKind::Audio,
    ];

    /// Exact number of files a source of this kind must point at, if fixed.
    pub fn expected_files(self) -> Option<usize> {
        match self {
            SourceKind::CubeTexture => Some(6),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::Texture => "texture",
            SourceKind::CubeTexture => "cube_texture",
            SourceKind::Gltf => "gltf",
            SourceKind::Audio => "audio",
        };
        f.write_str(label)
    }
}

/// One configured asset. Names are expected to be unique; duplicates
/// overwrite each other in the loaded item map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(deserialize_with = "one_or_many")]
    pub locator: Vec<String>,
    pub kind: SourceKind,
}

impl SourceDescriptor {
    pub fn new<I, S>(name: impl Into<String>, locator: I, kind: SourceKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            locator: locator.into_iter().map(Into::into).collect(),
            kind,
        }
    }

    /// Sources used by the default scene.
    pub fn defaults() -> Vec<SourceDescriptor> {
        vec![
            SourceDescriptor::new(
                "environmentMapTexture",
                ["px", "nx", "py", "ny", "pz", "nz"]
                    .map(|face| format!("textures/environmentMap/{face}.jpg")),
                SourceKind::CubeTexture,
            ),
            SourceDescriptor::new(
                "fox",
                ["models/Fox/glTF-Binary/Fox.glb"],
                SourceKind::Gltf,
            ),
            SourceDescriptor::new(
                "grassColor",
                ["textures/dirt/color.jpg"],
                SourceKind::Texture,
            ),
            SourceDescriptor::new(
                "grassNormal",
                ["textures/dirt/normal.jpg"],
                SourceKind::Texture,
            ),
        ]
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

/// Raw payload of a single fetched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub locator: String,
    pub bytes: Vec<u8>,
}

/// Opaque loaded asset. Decoding is left to the rendering side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    kind: SourceKind,
    files: Vec<AssetFile>,
}

impl Asset {
    pub fn new(kind: SourceKind, files: Vec<AssetFile>) -> Self {
        Self { kind, files }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn files(&self) -> &[AssetFile] {
        &self.files
    }

    pub fn byte_len(&self) -> usize {
        self.files.iter().map(|file| file.bytes.len()).sum()
    }
}

/// A fetch that failed permanently. The barrier never counts the slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load `{source_name}` from `{locator}`: {reason}")]
pub struct LoadFailure {
    pub source_name: String,
    pub locator: String,
    pub reason: String,
}

impl LoadFailure {
    pub fn new(
        source_name: impl Into<String>,
        locator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            locator: locator.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_accepts_single_string_or_list() {
        let single: SourceDescriptor = serde_json::from_str(
            r#"{ "name": "grassColor", "locator": "textures/dirt/color.jpg", "kind": "texture" }"#,
        )
        .unwrap();
        assert_eq!(single.locator, vec!["textures/dirt/color.jpg"]);

        let many: SourceDescriptor = serde_json::from_str(
            r#"{ "name": "env", "locator": ["a.jpg", "b.jpg"], "kind": "cube_texture" }"#,
        )
        .unwrap();
        assert_eq!(many.locator.len(), 2);
        assert_eq!(many.kind, SourceKind::CubeTexture);
    }

    #[test]
    fn default_sources_have_unique_names() {
        let sources = SourceDescriptor::defaults();
        let mut names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), sources.len());

        let cube = &sources[0];
        assert_eq!(Some(cube.locator.len()), cube.kind.expected_files());
    }

    #[test]
    fn failure_message_names_the_source() {
        let failure = LoadFailure::new("fox", "models/Fox.glb", "not found");
        let text = failure.to_string();
        assert!(text.contains("fox"));
        assert!(text.contains("models/Fox.glb"));
    }
}
