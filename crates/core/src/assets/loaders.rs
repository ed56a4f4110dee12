use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use super::{Asset, AssetFile, LoadFailure, SourceKind};
use crate::{runtime::EventLoop, ResonanceError, Result};

/// Callback handed to a loader for one fetch. Must be invoked on the event
/// loop thread once the fetch settles.
pub type Completion = Box<dyn FnOnce(std::result::Result<Asset, LoadFailure>) -> Result<()>>;

/// Fetches every file of one source kind.
pub trait AssetLoader {
    fn kind(&self) -> SourceKind;

    /// Starts fetching `locators` for the source called `name`. The fetch
    /// must not complete synchronously; `done` runs in a later turn of
    /// `event_loop`.
    fn load(&self, name: &str, locators: &[String], event_loop: &EventLoop, done: Completion);
}

type LoaderFactory = Box<dyn Fn() -> Box<dyn AssetLoader>>;

/// Maps each [`SourceKind`] to the factory building its loader.
#[derive(Default)]
pub struct LoaderRegistry {
    factories: HashMap<SourceKind, LoaderFactory>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that reads every kind from disk below `root`.
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut registry = Self::new();
        for kind in SourceKind::ALL {
            let root = root.clone();
            registry.register(kind, move || -> Box<dyn AssetLoader> {
                Box::new(FileLoader::new(root.clone(), kind))
            });
        }
        registry
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register<F>(&mut self, kind: SourceKind, factory: F)
    where
        F: Fn() -> Box<dyn AssetLoader> + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn contains(&self, kind: SourceKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn instantiate(&self, kind: SourceKind) -> Result<Box<dyn AssetLoader>> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or_else(|| ResonanceError::Config(format!("no loader registered for `{kind}`")))
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<SourceKind> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        f.debug_struct("LoaderRegistry").field("kinds", &kinds).finish()
    }
}

/// Reads source files relative to an asset root.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
    kind: SourceKind,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_all(
        root: &Path,
        kind: SourceKind,
        name: &str,
        locators: &[String],
    ) -> std::result::Result<Asset, LoadFailure> {
        if locators.is_empty() {
            return Err(LoadFailure::new(name, "", "no locator configured"));
        }
        if let Some(expected) = kind.expected_files() {
            if locators.len() != expected {
                return Err(LoadFailure::new(
                    name,
                    locators.join(", "),
                    format!("{kind} needs {expected} files, got {}", locators.len()),
                ));
            }
        }

        let mut files = Vec::with_capacity(locators.len());
        for locator in locators {
            let bytes = std::fs::read(root.join(locator))
                .map_err(|err| LoadFailure::new(name, locator.as_str(), err.to_string()))?;
            files.push(AssetFile {
                locator: locator.clone(),
                bytes,
            });
        }
        Ok(Asset::new(kind, files))
    }
}

impl AssetLoader for FileLoader {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn load(&self, name: &str, locators: &[String], event_loop: &EventLoop, done: Completion) {
        let root = self.root.clone();
        let kind = self.kind;
        let name = name.to_string();
        let locators = locators.to_vec();
        event_loop.defer(0.0, move |_| done(Self::read_all(&root, kind, &name, &locators)));
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    type Outcome = Rc<RefCell<Option<std::result::Result<Asset, LoadFailure>>>>;

    fn capture() -> (Outcome, Completion) {
        let slot: Outcome = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        let done: Completion = Box::new(move |outcome| {
            *sink.borrow_mut() = Some(outcome);
            Ok(())
        });
        (slot, done)
    }

    #[test]
    fn registry_reports_missing_kinds() {
        let registry = LoaderRegistry::new();
        assert!(!registry.contains(SourceKind::Gltf));
        let err = registry.instantiate(SourceKind::Gltf).err().unwrap();
        assert!(err.to_string().contains("gltf"));
    }

    #[test]
    fn filesystem_registry_covers_every_kind() {
        let registry = LoaderRegistry::filesystem("assets");
        for kind in SourceKind::ALL {
            assert_eq!(registry.instantiate(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn file_loader_completes_on_a_later_turn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("color.jpg"), b"jpeg").unwrap();

        let event_loop = EventLoop::new();
        let loader = FileLoader::new(dir.path(), SourceKind::Texture);
        let (outcome, done) = capture();

        loader.load("grassColor", &["color.jpg".to_string()], &event_loop, done);
        assert!(outcome.borrow().is_none());

        event_loop.run_until_idle().unwrap();
        let asset = outcome.borrow_mut().take().unwrap().unwrap();
        assert_eq!(asset.kind(), SourceKind::Texture);
        assert_eq!(asset.files()[0].bytes, b"jpeg");
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let event_loop = EventLoop::new();
        let loader = FileLoader::new(dir.path(), SourceKind::Gltf);
        let (outcome, done) = capture();

        loader.load("fox", &["Fox.glb".to_string()], &event_loop, done);
        event_loop.run_until_idle().unwrap();

        let failure = outcome.borrow_mut().take().unwrap().unwrap_err();
        assert_eq!(failure.source_name, "fox");
        assert_eq!(failure.locator, "Fox.glb");
    }

    #[test]
    fn cube_texture_requires_six_faces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("px.jpg"), b"x").unwrap();

        let event_loop = EventLoop::new();
        let loader = FileLoader::new(dir.path(), SourceKind::CubeTexture);
        let (outcome, done) = capture();

        loader.load("env", &["px.jpg".to_string()], &event_loop, done);
        event_loop.run_until_idle().unwrap();

        let failure = outcome.borrow_mut().take().unwrap().unwrap_err();
        assert!(failure.reason.contains("needs 6 files"));
    }
}
