//! Filesystem layout helpers and atomic write operations
//!
//! A macro directory holds `config.json` (the [`EngineConfig`]) and a
//! `macros/` folder with one `<name>.macro` text file per macro. An optional
//! `<name>.json` sidecar carries the macro's language and craft-loop settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::EngineConfig;
use super::host::{MacroDefinition, MacroLanguage, MacroRegistry};

const MACRO_EXTENSION: &str = "macro";
const META_EXTENSION: &str = "json";

/// Storage manager for a macro directory
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the config file path
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Get the macros directory path
    pub fn macros_dir(&self) -> PathBuf {
        self.root.join("macros")
    }

    /// Source file for a macro name
    pub fn macro_path(&self, name: &str) -> PathBuf {
        self.macros_dir()
            .join(format!("{}.{}", file_stem(name), MACRO_EXTENSION))
    }

    /// Sidecar settings file for a macro name
    pub fn meta_path(&self, name: &str) -> PathBuf {
        self.macros_dir()
            .join(format!("{}.{}", file_stem(name), META_EXTENSION))
    }

    /// Write data atomically to a file
    ///
    /// Creates a temporary file, writes the data, syncs, then renames
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");

        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
        file.write_all(data).context("Failed to write data")?;
        file.sync_all().context("Failed to sync file")?;
        drop(file);

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

        if let Some(parent) = path.parent() {
            let dir = OpenOptions::new()
                .read(true)
                .open(parent)
                .with_context(|| format!("Failed to open directory: {:?}", parent))?;
            dir.sync_all().context("Failed to sync directory")?;
        }

        Ok(())
    }

    /// Read a file
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))
    }

    /// Create a directory and all parent directories
    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {:?}", path))
    }

    /// List macro source files
    pub fn list_macros(&self) -> Result<Vec<PathBuf>> {
        let dir = self.macros_dir();
        let mut entries = Vec::new();
        for entry in
            fs::read_dir(&dir).with_context(|| format!("Failed to read directory: {:?}", dir))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == MACRO_EXTENSION) {
                entries.push(path);
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// Per-macro settings stored next to the source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroMeta {
    /// Display name, when it differs from the file stem
    pub name: Option<String>,
    /// Source language
    pub language: MacroLanguage,
    /// Apply craft-loop scaffolding
    pub craft_loop: bool,
    /// Craft-loop repeat count
    pub craft_count: i32,
}

/// Initialize a macro directory with a default config
pub fn init_storage(root: &Path) -> Result<()> {
    let storage = Storage::new(root.to_path_buf());
    storage.create_dir_all(root)?;
    storage.create_dir_all(&storage.macros_dir())?;

    if !storage.config_path().exists() {
        write_config(root, &EngineConfig::default())?;
    }
    Ok(())
}

/// Write engine configuration
pub fn write_config(root: &Path, config: &EngineConfig) -> Result<()> {
    let storage = Storage::new(root.to_path_buf());
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    storage.write_atomic(&storage.config_path(), &json)
}

/// Load engine configuration
pub fn load_config(root: &Path) -> Result<EngineConfig> {
    let storage = Storage::new(root.to_path_buf());
    let data = storage.read_file(&storage.config_path())?;
    serde_json::from_slice(&data).context("Failed to deserialize config")
}

/// Store a macro's source and settings
pub fn save_macro(root: &Path, definition: &MacroDefinition) -> Result<()> {
    let storage = Storage::new(root.to_path_buf());
    storage.create_dir_all(&storage.macros_dir())?;
    storage.write_atomic(
        &storage.macro_path(&definition.name),
        definition.contents.as_bytes(),
    )?;

    let meta = MacroMeta {
        name: Some(definition.name.clone()),
        language: definition.language,
        craft_loop: definition.craft_loop,
        craft_count: definition.craft_count,
    };
    let json = serde_json::to_vec_pretty(&meta).context("Failed to serialize macro settings")?;
    storage.write_atomic(&storage.meta_path(&definition.name), &json)
}

/// Load every stored macro
pub fn load_macros(root: &Path) -> Result<Vec<MacroDefinition>> {
    let storage = Storage::new(root.to_path_buf());
    let mut macros = Vec::new();
    for path in storage.list_macros()? {
        macros.push(load_macro(&storage, &path)?);
    }
    Ok(macros)
}

fn load_macro(storage: &Storage, path: &Path) -> Result<MacroDefinition> {
    let contents = String::from_utf8(storage.read_file(path)?)
        .with_context(|| format!("Macro is not valid UTF-8: {:?}", path))?;

    let meta_path = path.with_extension(META_EXTENSION);
    let meta: MacroMeta = if meta_path.exists() {
        serde_json::from_slice(&storage.read_file(&meta_path)?)
            .with_context(|| format!("Failed to deserialize macro settings: {:?}", meta_path))?
    } else {
        MacroMeta::default()
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(MacroDefinition {
        name: meta.name.unwrap_or(stem),
        contents,
        language: meta.language,
        craft_loop: meta.craft_loop,
        craft_count: meta.craft_count,
    })
}

/// Registry reading macros from a storage directory on every lookup
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    /// Registry over `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MacroRegistry for DirectoryRegistry {
    fn find_by_name(&self, name: &str) -> Result<Vec<MacroDefinition>> {
        let name = name.trim();
        Ok(load_macros(&self.root)?
            .into_iter()
            .filter(|def| def.name.eq_ignore_ascii_case(name))
            .collect())
    }
}

fn file_stem(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_storage() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        init_storage(root).unwrap();

        assert!(root.join("macros").exists());
        assert!(root.join("config.json").exists());
        assert_eq!(load_config(root).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.stop_on_action_timeout = false;
        config.craft_loop.echo = true;

        write_config(temp.path(), &config).unwrap();
        assert_eq!(load_config(temp.path()).unwrap(), config);
        assert!(!temp.path().join("config.tmp").exists());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.json"), br#"{"addon_poll_ms": 100}"#).unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.addon_poll_ms, 100);
        assert_eq!(config.addon_max_wait_ms, 5000);
    }

    #[test]
    fn test_directory_registry() {
        let temp = TempDir::new().unwrap();
        init_storage(temp.path()).unwrap();
        save_macro(
            temp.path(),
            &MacroDefinition::new("Tincture: Grade 8", "/ac Reflect").with_craft_loop(5),
        )
        .unwrap();
        fs::write(temp.path().join("macros/plain.macro"), "/echo plain").unwrap();

        let registry = DirectoryRegistry::new(temp.path());
        let found = registry.find_by_name("tincture: grade 8").unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].craft_loop);
        assert_eq!(found[0].craft_count, 5);

        let plain = registry.find_by_name("PLAIN").unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].contents, "/echo plain");
        assert!(!plain[0].craft_loop);

        assert!(registry.find_by_name("missing").unwrap().is_empty());
    }
}
