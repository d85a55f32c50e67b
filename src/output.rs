//! Writing reshaped results to local disk or a notebook-attached lakehouse mount.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

static RE_UNSAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ /\\]").unwrap());

const LAKEHOUSE_PREFIX: &str = "/lakehouse/";
const ONELAKE_PREFIX: &str = "abfss://";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON serialization failed: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Cannot write to {0}: OneLake URLs are only writable from a Fabric notebook session")]
    UnsupportedTarget(String),
}

/// Where result files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    CurrentDir,
    Local(PathBuf),
    /// A `/lakehouse/...` mount inside a Fabric notebook; plain filesystem writes.
    Lakehouse(PathBuf),
    /// An `abfss://` OneLake URL.
    OneLake(String),
}

impl OutputTarget {
    pub fn parse(directory: Option<&str>) -> Self {
        match directory.map(str::trim) {
            None | Some("") => OutputTarget::CurrentDir,
            Some(dir) if dir.starts_with(LAKEHOUSE_PREFIX) => {
                OutputTarget::Lakehouse(PathBuf::from(dir))
            }
            Some(dir) if dir.starts_with(ONELAKE_PREFIX) => {
                OutputTarget::OneLake(dir.trim_end_matches('/').to_string())
            }
            Some(dir) => OutputTarget::Local(PathBuf::from(dir)),
        }
    }

    pub fn is_lakehouse(&self) -> bool {
        matches!(self, OutputTarget::Lakehouse(_) | OutputTarget::OneLake(_))
    }

    /// Display location of `file_name` under this target.
    pub fn location_for(&self, file_name: &str) -> String {
        match self {
            OutputTarget::CurrentDir => file_name.to_string(),
            OutputTarget::Local(dir) | OutputTarget::Lakehouse(dir) => {
                dir.join(file_name).display().to_string()
            }
            OutputTarget::OneLake(url) => format!("{}/{}", url, file_name),
        }
    }

    /// Pretty-print `value` as JSON into `file_name`, returning the written location.
    pub fn save_json<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<String, OutputError> {
        let location = self.location_for(file_name);
        let path = match self {
            OutputTarget::OneLake(_) => return Err(OutputError::UnsupportedTarget(location)),
            OutputTarget::CurrentDir => PathBuf::from(file_name),
            OutputTarget::Local(dir) | OutputTarget::Lakehouse(dir) => {
                create_dir(dir)?;
                dir.join(file_name)
            }
        };

        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|source| OutputError::Io {
            path: location.clone(),
            source,
        })?;

        log::info!("Saved {}", location);
        Ok(location)
    }

    /// Like [`OutputTarget::save_json`], but a target this process cannot write to is logged and skipped.
    pub fn save_json_or_skip<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<Option<String>, OutputError> {
        match self.save_json(file_name, value) {
            Ok(location) => Ok(Some(location)),
            Err(OutputError::UnsupportedTarget(location)) => {
                log::warn!("Lakehouse path specified but not writable here, skipping {}", location);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn create_dir(dir: &Path) -> Result<(), OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.display().to_string(),
        source,
    })
}

/// Replace spaces and path separators so a display name can be used in a file name.
pub fn sanitize_name(name: &str) -> String {
    RE_UNSAFE_NAME.replace_all(name, "_").to_string()
}

pub fn timestamp_suffix(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// `{prefix}_{name}_{timestamp}_{suffix}.json`
pub fn timestamped_file_name(prefix: &str, name: &str, suffix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}_{}.json",
        prefix,
        sanitize_name(name),
        timestamp_suffix(at),
        suffix
    )
}
