use crate::archive::{Archive, Entry};
use crate::error::{LaunchError, Result};
use crate::manifest::{Attributes, RUNTIME_JAR_ATTRIBUTE};

/// Folder inside the archive that holds bundled libraries, the runtime included.
pub const LIBRARY_FOLDER: &str = "/WEB-INF/lib/";

/// The embedded runtime jar, found but not yet extracted.
#[derive(Debug, Clone)]
pub struct RuntimeLocation {
    jar_name: String,
    entry: Entry,
}

impl RuntimeLocation {
    pub fn jar_name(&self) -> &str {
        &self.jar_name
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

/// Returns the validated runtime jar name from the manifest.
pub fn runtime_jar_name(attributes: &Attributes) -> Result<String> {
    let raw = attributes.get(RUNTIME_JAR_ATTRIBUTE).ok_or_else(|| {
        LaunchError::ConfigurationMissing(format!(
            "The Winstone jar to use is not set in the manifest. The META-INF/MANIFEST.MF file \
             should contain an entry such as '{}: winstone-lite-0.9.jar'.",
            RUNTIME_JAR_ATTRIBUTE
        ))
    })?;

    let name = crate::arguments::trim_control(raw);
    if name.is_empty() || !name.ends_with(".jar") {
        return Err(LaunchError::ConfigurationInvalid(format!(
            "The Winstone jar name {:?} was an empty string or did not look like a JAR file. \
             It needs to contain an entry such as 'winstone-lite-0.9.jar'.",
            raw
        )));
    }
    Ok(name.to_string())
}

pub fn locate(attributes: &Attributes, archive: &Archive) -> Result<RuntimeLocation> {
    let jar_name = runtime_jar_name(attributes)?;
    let entry = archive
        .entry(&format!("{}{}", LIBRARY_FOLDER, jar_name))
        .filter(|entry| !entry.is_dir())
        .ok_or_else(|| {
            LaunchError::ResourceNotFound(format!(
                "Could not find '{}' in the {} directory inside the .war file.",
                jar_name, LIBRARY_FOLDER
            ))
        })?;

    tracing::debug!(runtime = %jar_name, size = entry.size(), "located embedded runtime");
    Ok(RuntimeLocation {
        jar_name,
        entry: entry.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ArchiveBuilder;

    fn attrs(value: Option<&str>) -> Attributes {
        let mut attributes = Attributes::default();
        attributes.insert("Manifest-Version", "1.0");
        if let Some(value) = value {
            attributes.insert(RUNTIME_JAR_ATTRIBUTE, value);
        }
        attributes
    }

    #[test]
    fn missing_attribute_is_configuration_missing() {
        let err = runtime_jar_name(&attrs(None)).unwrap_err();
        assert!(matches!(err, LaunchError::ConfigurationMissing(_)));
        assert!(err.to_string().contains("X-Winstone-Jar: winstone-lite-0.9.jar"));
    }

    #[test]
    fn blank_or_non_jar_values_are_invalid() {
        for value in ["", "   ", "\t", "winstone.zip", "winstone", "winstone.jar.bak"] {
            let err = runtime_jar_name(&attrs(Some(value))).unwrap_err();
            assert!(
                matches!(err, LaunchError::ConfigurationInvalid(_)),
                "{value:?} gave {err}"
            );
        }
    }

    #[test]
    fn value_is_trimmed() {
        assert_eq!(
            runtime_jar_name(&attrs(Some("  winstone-lite-0.9.10.jar \t"))).unwrap(),
            "winstone-lite-0.9.10.jar"
        );
        assert_eq!(
            runtime_jar_name(&attrs(Some("\u{1}winstone.jar\r"))).unwrap(),
            "winstone.jar"
        );
    }

    #[test]
    fn non_breaking_space_is_kept_in_the_name() {
        let err = runtime_jar_name(&attrs(Some("winstone.jar\u{a0}"))).unwrap_err();
        assert!(matches!(err, LaunchError::ConfigurationInvalid(_)), "{err}");
    }

    #[test]
    fn locates_runtime_under_library_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.war");
        ArchiveBuilder::new()
            .stored("WEB-INF/lib/", Vec::new())
            .stored("WEB-INF/lib/runtime-1.0.jar", b"jar bytes".to_vec())
            .stored("runtime-2.0.jar", b"wrong place".to_vec())
            .write_to(&path)
            .unwrap();
        let archive = Archive::open(&path).unwrap();

        let location = locate(&attrs(Some("runtime-1.0.jar")), &archive).unwrap();
        assert_eq!(location.jar_name(), "runtime-1.0.jar");
        assert_eq!(location.entry().name(), "WEB-INF/lib/runtime-1.0.jar");

        let err = locate(&attrs(Some("runtime-2.0.jar")), &archive).unwrap_err();
        assert!(matches!(err, LaunchError::ResourceNotFound(_)));
        assert!(err.to_string().contains("'runtime-2.0.jar'"));
    }
}
