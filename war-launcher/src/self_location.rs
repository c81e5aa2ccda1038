use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::config::{LauncherConfig, ARCHIVE_VAR};
use crate::error::{LaunchError, Result};

/// Canonical path of the archive being launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfLocation {
    path: PathBuf,
}

impl SelfLocation {
    /// Uses the configured override when present, the running executable otherwise.
    pub fn resolve(config: &LauncherConfig) -> Result<Self> {
        let raw = match &config.archive_override {
            Some(value) => {
                let path = override_to_path(value)?;
                tracing::debug!(var = ARCHIVE_VAR, path = %path.display(), "archive location overridden");
                path
            }
            None => env::current_exe()
                .map_err(|e| LaunchError::path("cannot query the path of the running executable", Some(e)))?,
        };
        Self::from_path(&raw)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let canonical = fs::canonicalize(path)
            .map_err(|e| LaunchError::path(format!("cannot resolve {}", path.display()), Some(e)))?;
        if !canonical.is_file() {
            return Err(LaunchError::path(
                format!("{} is not a regular file", canonical.display()),
                None,
            ));
        }
        Ok(Self { path: canonical })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or_default()
    }
}

/// Turns the override value into a local path.
///
/// Deployment tools that report where the code came from may hand over
/// `file:` or `jar:file:…!/` URLs; those are mapped back to the local file.
fn override_to_path(value: &OsString) -> Result<PathBuf> {
    let Some(text) = value.to_str() else {
        return Ok(PathBuf::from(value));
    };

    let text = match text.strip_prefix("jar:") {
        Some(inner) => inner.split("!/").next().unwrap_or(inner),
        None => text,
    };

    match Url::parse(text) {
        // Single letter schemes are Windows drive letters, not URLs.
        Ok(url) if url.scheme().len() > 1 => {
            if url.scheme() != "file" {
                return Err(LaunchError::path(
                    format!("{} must be a local path or a file: URL, got {}", ARCHIVE_VAR, text),
                    None,
                ));
            }
            url.to_file_path()
                .map_err(|()| LaunchError::path(format!("{} does not name a local file", text), None))
        }
        _ => Ok(PathBuf::from(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(value: impl Into<OsString>) -> LauncherConfig {
        LauncherConfig {
            archive_override: Some(value.into()),
            ..LauncherConfig::default()
        }
    }

    #[test]
    fn defaults_to_the_running_executable() {
        let location = SelfLocation::resolve(&LauncherConfig::default()).unwrap();
        let expected = fs::canonicalize(env::current_exe().unwrap()).unwrap();
        assert_eq!(location.path(), expected);
        assert!(location.path().is_absolute());
    }

    #[test]
    fn plain_path_override_is_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let war = dir.path().join("app.war");
        fs::write(&war, b"war").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let indirect = dir.path().join("sub").join("..").join("app.war");
        let location = SelfLocation::resolve(&config_with(indirect)).unwrap();
        assert_eq!(location.path(), fs::canonicalize(&war).unwrap());
        assert_eq!(location.file_name(), "app.war");
    }

    #[test]
    fn file_and_jar_urls_are_translated() {
        let dir = tempfile::tempdir().unwrap();
        let war = dir.path().join("my app.war");
        fs::write(&war, b"war").unwrap();
        let expected = fs::canonicalize(&war).unwrap();

        let file_url = Url::from_file_path(&war).unwrap().to_string();
        assert!(file_url.contains("my%20app.war"));
        let location = SelfLocation::resolve(&config_with(file_url.clone())).unwrap();
        assert_eq!(location.path(), expected);

        let jar_url = format!("jar:{}!/org/example/App.class", file_url);
        let location = SelfLocation::resolve(&config_with(jar_url)).unwrap();
        assert_eq!(location.path(), expected);
    }

    #[test]
    fn remote_urls_are_rejected() {
        let err = SelfLocation::resolve(&config_with("http://example.com/app.war")).unwrap_err();
        assert!(matches!(err, LaunchError::PathResolution { .. }));
        assert!(err.to_string().contains("file: URL"), "{err}");
    }

    #[test]
    fn missing_or_non_file_locations_fail() {
        let dir = tempfile::tempdir().unwrap();
        let err = SelfLocation::from_path(&dir.path().join("absent.war")).unwrap_err();
        assert!(matches!(err, LaunchError::PathResolution { source: Some(_), .. }));

        let err = SelfLocation::from_path(dir.path()).unwrap_err();
        assert!(err.to_string().contains("is not a regular file"), "{err}");
    }
}
