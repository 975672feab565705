//! Manifest reads and writes.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::manifest::{self, CONFIG_FILE_NAME, CURRENT_VERSION, Manifest};
use crate::errors::PgitError;
use crate::git::{ExcludeSettings, FallbackBehavior};

/// Manifest health report.
#[derive(Debug)]
pub struct ConfigHealth {
    pub exists: bool,
    pub valid: bool,
    pub errors: Vec<String>,
    pub needs_migration: bool,
    pub current_version: Option<String>,
    pub target_version: String,
}

/// Partial update over the `gitExclude` settings sub-tree.
#[derive(Debug, Default)]
pub struct ExcludeSettingsUpdate {
    pub enabled: Option<bool>,
    pub marker_comment: Option<String>,
    pub fallback_behavior: Option<FallbackBehavior>,
    pub validate_operations: Option<bool>,
}

/// Owner of the persisted manifest for one working directory.
///
/// Parsed manifests are cached per manager instance and refreshed on save;
/// the cache is deliberately not global so two managers never observe each
/// other's stale state.
#[derive(Debug)]
pub struct ConfigManager {
    working_dir: PathBuf,
    cache: Option<Manifest>,
}

impl ConfigManager {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            cache: None,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.working_dir.join(CONFIG_FILE_NAME)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn exists(&self) -> bool {
        self.config_path().is_file()
    }

    /// Load the manifest, migrating old schema versions in memory and
    /// validating the result. Cached until the next save.
    pub fn load(&mut self) -> anyhow::Result<&Manifest> {
        if self.cache.is_none() {
            self.cache = Some(self.read_from_disk()?);
        }
        Ok(self.cache.as_ref().expect("cache populated above"))
    }

    fn read_from_disk(&self) -> anyhow::Result<Manifest> {
        let path = self.config_path();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let document: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| PgitError::ConfigValidation {
                errors: vec![format!("manifest is not valid JSON: {e}")],
            })?;

        let manifest = manifest::migrate(document)?;
        let errors = manifest.validate();
        if !errors.is_empty() {
            return Err(PgitError::ConfigValidation { errors }.into());
        }
        Ok(manifest)
    }

    /// Validate and persist, refreshing `lastModified` and the cache.
    pub fn save(&mut self, mut manifest: Manifest) -> anyhow::Result<()> {
        manifest.touch();
        let errors = manifest.validate();
        if !errors.is_empty() {
            return Err(PgitError::ConfigValidation { errors }.into());
        }

        let mut json = serde_json::to_string_pretty(&manifest)
            .context("Failed to serialize manifest")?;
        json.push('\n');

        let path = self.config_path();
        let parent = path.parent().expect("config path has the workdir as parent");
        let mut staged = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to stage manifest write in {}", parent.display()))?;
        staged
            .write_all(json.as_bytes())
            .context("Failed to write manifest")?;
        staged
            .persist(&path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        self.cache = Some(manifest);
        Ok(())
    }

    /// Create a fresh manifest. Refuses to clobber an existing one.
    pub fn create(&mut self, working_dir: &Path) -> anyhow::Result<Manifest> {
        if self.exists() {
            return Err(PgitError::InvalidInput {
                message: format!("{CONFIG_FILE_NAME} already exists; is this directory already initialized?"),
            }
            .into());
        }
        let manifest = Manifest::new(working_dir);
        self.save(manifest.clone())?;
        Ok(manifest)
    }

    /// Drop the in-memory cache (next load re-reads the file).
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn add_tracked_path(&mut self, path: &str) -> anyhow::Result<()> {
        self.add_tracked_paths(std::slice::from_ref(&path.to_string()))
    }

    /// Append paths to `trackedPaths`, skipping ones already present.
    pub fn add_tracked_paths(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let mut manifest = self.load()?.clone();
        for path in paths {
            if !manifest.tracked_paths.iter().any(|p| p == path) {
                manifest.tracked_paths.push(path.clone());
            }
        }
        self.save(manifest)
    }

    pub fn remove_tracked_path(&mut self, path: &str) -> anyhow::Result<()> {
        self.remove_tracked_paths(std::slice::from_ref(&path.to_string()))
    }

    pub fn remove_tracked_paths(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let mut manifest = self.load()?.clone();
        manifest
            .tracked_paths
            .retain(|tracked| !paths.iter().any(|p| p == tracked));
        self.save(manifest)
    }

    /// Compare-and-write over the `gitExclude` settings sub-tree.
    pub fn update_git_exclude_settings(
        &mut self,
        update: ExcludeSettingsUpdate,
    ) -> anyhow::Result<ExcludeSettings> {
        let mut manifest = self.load()?.clone();
        let settings = &mut manifest.settings.git_exclude;
        let before = settings.clone();

        if let Some(enabled) = update.enabled {
            settings.enabled = enabled;
        }
        if let Some(marker) = update.marker_comment {
            settings.marker_comment = marker;
        }
        if let Some(fallback) = update.fallback_behavior {
            settings.fallback_behavior = fallback;
        }
        if let Some(validate) = update.validate_operations {
            settings.validate_operations = validate;
        }

        let after = settings.clone();
        if after != before {
            self.save(manifest)?;
        }
        Ok(after)
    }

    /// Report on the manifest's condition without failing.
    pub fn health(&self) -> ConfigHealth {
        let path = self.config_path();
        let mut health = ConfigHealth {
            exists: path.is_file(),
            valid: false,
            errors: Vec::new(),
            needs_migration: false,
            current_version: None,
            target_version: CURRENT_VERSION.to_string(),
        };
        if !health.exists {
            health.errors.push("manifest file does not exist".to_string());
            return health;
        }

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                health.errors.push(format!("unreadable: {e}"));
                return health;
            }
        };
        let document: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                health.errors.push(format!("not valid JSON: {e}"));
                return health;
            }
        };

        let version = document
            .get("version")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        health.needs_migration = version
            .as_deref()
            .map(manifest::needs_migration)
            .unwrap_or(true);
        health.current_version = version;

        match manifest::migrate(document) {
            Ok(manifest) => {
                let errors = manifest.validate();
                health.valid = errors.is_empty();
                health.errors.extend(errors);
            }
            Err(e) => health.errors.push(e.to_string()),
        }
        health
    }
}
