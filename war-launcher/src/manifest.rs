//! `META-INF/MANIFEST.MF` main attributes.

use crate::archive::Archive;
use crate::error::{LaunchError, Result};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Name of the embedded runtime jar inside `WEB-INF/lib`.
pub const RUNTIME_JAR_ATTRIBUTE: &str = "X-Winstone-Jar";
/// Whitespace separated arguments appended after the launcher's own.
pub const EXTRA_PARAMETERS_ATTRIBUTE: &str = "X-Extra-Winstone-Parameters";

const MAX_NAME_LEN: usize = 70;

/// Flat attribute set. Names compare ASCII case-insensitively, as in JAR manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets `name`, replacing an earlier value under any spelling of the name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ManifestError {
    pub line: usize,
    pub reason: String,
}

/// Parses the main section of a manifest: everything up to the first blank line.
pub fn parse_main_section(text: &str) -> std::result::Result<Attributes, ManifestError> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut attributes = Attributes::default();
    let mut current: Option<(String, String)> = None;

    for (index, line) in normalized.split('\n').enumerate() {
        let line_no = index + 1;
        if line.is_empty() {
            break;
        }

        // Continuation of the previous value.
        if let Some(rest) = line.strip_prefix(' ') {
            match current.as_mut() {
                Some((_, value)) => value.push_str(rest),
                None => {
                    return Err(ManifestError {
                        line: line_no,
                        reason: "continuation line without a preceding header".to_string(),
                    })
                }
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            attributes.insert(name, value);
        }

        let (name, value) = line.split_once(": ").ok_or_else(|| ManifestError {
            line: line_no,
            reason: format!("invalid header {:?}", line),
        })?;
        if !is_valid_name(name) {
            return Err(ManifestError {
                line: line_no,
                reason: format!("invalid attribute name {:?}", name),
            });
        }
        current = Some((name.to_string(), value.to_string()));
    }

    if let Some((name, value)) = current {
        attributes.insert(name, value);
    }
    Ok(attributes)
}

/// Reads and parses the main attributes of the archive's manifest.
pub fn read_main_attributes(archive: &Archive) -> Result<Attributes> {
    let entry = archive
        .entry(MANIFEST_PATH)
        .ok_or_else(|| LaunchError::archive(archive.path(), format!("archive has no {}", MANIFEST_PATH)))?;
    let bytes = archive.read_entry(entry)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| LaunchError::archive(archive.path(), format!("{} is not valid UTF-8", MANIFEST_PATH)))?;

    let attributes = parse_main_section(text.trim_start_matches('\u{feff}'))
        .map_err(|e| LaunchError::archive(archive.path(), format!("malformed {}: {}", MANIFEST_PATH, e)))?;

    tracing::debug!(attributes = attributes.len(), "read manifest main attributes");
    Ok(attributes)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ArchiveBuilder;

    #[test]
    fn parses_main_section_only() {
        let text = "Manifest-Version: 1.0\r\n\
                    X-Winstone-Jar: winstone-lite-0.9.10.jar\r\n\
                    \r\n\
                    Name: WEB-INF/classes/\r\n\
                    X-Winstone-Jar: ignored.jar\r\n";
        let attrs = parse_main_section(text).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("Manifest-Version"), Some("1.0"));
        assert_eq!(attrs.get(RUNTIME_JAR_ATTRIBUTE), Some("winstone-lite-0.9.10.jar"));
    }

    #[test]
    fn joins_continuation_lines() {
        let text = "X-Extra-Winstone-Parameters: --useJNDI=false --ajp13Port=-1 --http\n Port=8080\n";
        let attrs = parse_main_section(text).unwrap();
        assert_eq!(
            attrs.get(EXTRA_PARAMETERS_ATTRIBUTE),
            Some("--useJNDI=false --ajp13Port=-1 --httpPort=8080")
        );
    }

    #[test]
    fn names_are_case_insensitive() {
        let attrs = parse_main_section("x-winstone-jar: a.jar\rX-WINSTONE-JAR: b.jar\r").unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("X-Winstone-Jar"), Some("b.jar"));
    }

    #[test]
    fn empty_values_are_kept() {
        let attrs = parse_main_section("X-Winstone-Jar: \n").unwrap();
        assert_eq!(attrs.get(RUNTIME_JAR_ATTRIBUTE), Some(""));
    }

    #[test]
    fn rejects_malformed_headers() {
        let err = parse_main_section("Manifest-Version: 1.0\nnot a header\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_main_section(" orphan continuation\n").unwrap_err();
        assert_eq!(err.line, 1);

        let err = parse_main_section("Bad Name: x\n").unwrap_err();
        assert!(err.reason.contains("invalid attribute name"));
    }

    #[test]
    fn reads_manifest_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.war");
        ArchiveBuilder::new()
            .manifest(&[(RUNTIME_JAR_ATTRIBUTE, "runtime-1.0.jar")])
            .write_to(&path)
            .unwrap();

        let archive = Archive::open(&path).unwrap();
        let attrs = read_main_attributes(&archive).unwrap();
        assert_eq!(attrs.get(RUNTIME_JAR_ATTRIBUTE), Some("runtime-1.0.jar"));
    }

    #[test]
    fn archive_without_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.war");
        ArchiveBuilder::new()
            .stored("index.html", b"<html/>".to_vec())
            .write_to(&path)
            .unwrap();

        let archive = Archive::open(&path).unwrap();
        let err = read_main_attributes(&archive).unwrap_err();
        assert!(err.to_string().contains("archive has no META-INF/MANIFEST.MF"), "{err}");
    }
}
