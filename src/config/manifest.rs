//! Manifest schema: versioned, camelCase JSON, ISO-8601 dates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::ExcludeSettings;
use crate::utils;

/// Manifest file name inside the working directory.
pub const CONFIG_FILE_NAME: &str = ".private-config.json";

/// Schema version written by this build. Older versions migrate on load.
pub const CURRENT_VERSION: &str = "2.0.0";

/// Default location of the secondary repository's git directory.
pub const DEFAULT_PRIVATE_REPO_PATH: &str = ".git-private";

/// Default location files are relocated into.
pub const DEFAULT_STORAGE_PATH: &str = ".private-storage";

/// Tool behavior switches persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub auto_gitignore: bool,
    pub auto_cleanup: bool,
    pub verbose_output: bool,
    pub create_backups: bool,
    pub max_backups: usize,
    pub git_exclude: ExcludeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_gitignore: false,
            auto_cleanup: true,
            verbose_output: false,
            create_backups: true,
            max_backups: 5,
            git_exclude: ExcludeSettings::default(),
        }
    }
}

/// Descriptive metadata, refreshed on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub project_name: String,
    pub main_repo_path: String,
    pub cli_version: String,
    pub platform: String,
    pub last_modified: DateTime<Utc>,
}

/// A named group of paths the user adds together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub description: String,
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

/// The persisted tracked-paths manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub private_repo_path: String,
    pub storage_path: String,
    pub tracked_paths: Vec<String>,
    pub initialized: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: Settings,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presets: Option<BTreeMap<String, Preset>>,
}

impl Manifest {
    /// Fresh manifest for a working directory, stamped with the current
    /// tool version, platform, and time.
    pub fn new(working_dir: &Path) -> Self {
        let now = now_utc();
        let project_name = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        Self {
            version: CURRENT_VERSION.to_string(),
            private_repo_path: DEFAULT_PRIVATE_REPO_PATH.to_string(),
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            tracked_paths: Vec::new(),
            initialized: now,
            last_cleanup: None,
            settings: Settings::default(),
            metadata: Metadata {
                project_name,
                main_repo_path: working_dir.to_string_lossy().into_owned(),
                cli_version: env!("CARGO_PKG_VERSION").to_string(),
                platform: utils::platform().to_string(),
                last_modified: now,
            },
            presets: None,
        }
    }

    /// Absolute storage root for a working directory.
    pub fn storage_root(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.storage_path)
    }

    /// Absolute git directory of the secondary repository.
    pub fn private_repo_root(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.private_repo_path)
    }

    /// Schema validation. Returns every violated invariant.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.version.is_empty() {
            errors.push("version is empty".to_string());
        }
        for (field, value) in [
            ("privateRepoPath", &self.private_repo_path),
            ("storagePath", &self.storage_path),
        ] {
            if value.is_empty() {
                errors.push(format!("{field} is empty"));
            } else if Path::new(value).is_absolute() {
                errors.push(format!("{field} must be relative to the working directory"));
            } else if value.split('/').any(|seg| seg == "..") {
                errors.push(format!("{field} must stay inside the working directory"));
            }
        }
        if self.private_repo_path == self.storage_path {
            errors.push("privateRepoPath and storagePath must differ".to_string());
        }

        let mut seen = std::collections::BTreeSet::new();
        for path in &self.tracked_paths {
            if !seen.insert(path) {
                errors.push(format!("duplicate tracked path '{path}'"));
            }
            if Path::new(path).is_absolute() || path.split('/').any(|seg| seg == "..") {
                errors.push(format!("tracked path '{path}' escapes the working directory"));
            }
            if path_is_under(path, &self.storage_path) || path_is_under(path, &self.private_repo_path)
            {
                errors.push(format!(
                    "tracked path '{path}' lies inside an internal directory"
                ));
            }
        }

        errors
    }

    /// Stamp `lastModified` ahead of a save.
    pub fn touch(&mut self) {
        self.metadata.last_modified = now_utc();
    }
}

/// Whether a schema version needs migration before write.
pub fn needs_migration(version: &str) -> bool {
    version != CURRENT_VERSION
}

/// Migrate an older manifest document to the current schema.
///
/// Version 1.x manifests predate the `metadata` block and the `gitExclude`
/// settings sub-tree; migration fills both with defaults and advances the
/// version. Unknown (newer) versions are refused rather than guessed at.
pub fn migrate(mut document: serde_json::Value) -> Result<Manifest, crate::errors::PgitError> {
    let version = document
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    if version.starts_with("1.") {
        let object = document
            .as_object_mut()
            .ok_or_else(|| migration_error(&version, "manifest is not a JSON object"))?;

        if !object.contains_key("metadata") {
            let fallback = Metadata {
                project_name: "project".to_string(),
                main_repo_path: String::new(),
                cli_version: env!("CARGO_PKG_VERSION").to_string(),
                platform: utils::platform().to_string(),
                last_modified: now_utc(),
            };
            object.insert(
                "metadata".to_string(),
                serde_json::to_value(fallback)
                    .map_err(|e| migration_error(&version, &e.to_string()))?,
            );
        }

        let settings = object
            .entry("settings")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(settings) = settings.as_object_mut() {
            if !settings.contains_key("gitExclude") {
                settings.insert(
                    "gitExclude".to_string(),
                    serde_json::to_value(ExcludeSettings::default())
                        .map_err(|e| migration_error(&version, &e.to_string()))?,
                );
            }
        }

        object.insert(
            "version".to_string(),
            serde_json::Value::String(CURRENT_VERSION.to_string()),
        );
    } else if version != CURRENT_VERSION {
        return Err(migration_error(
            &version,
            "unknown schema version (newer than this build?)",
        ));
    }

    serde_json::from_value(document).map_err(|e| crate::errors::PgitError::ConfigValidation {
        errors: vec![e.to_string()],
    })
}

fn migration_error(from: &str, message: &str) -> crate::errors::PgitError {
    crate::errors::PgitError::ConfigMigration {
        from: from.to_string(),
        to: CURRENT_VERSION.to_string(),
        message: message.to_string(),
    }
}

fn path_is_under(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&format!("{root}/"))
}

fn now_utc() -> DateTime<Utc> {
    DateTime::from_timestamp(utils::get_now() as i64, 0).unwrap_or_else(Utc::now)
}
