use std::io::{self, Read, Write};
use std::path::Path;

use tempfile::TempPath;

use crate::archive::Archive;
use crate::error::{LaunchError, Result};
use crate::locator::RuntimeLocation;

const BUFFER_SIZE: usize = 4 * 1024;

pub const TEMP_PREFIX: &str = "winstone";
pub const TEMP_SUFFIX: &str = "jar";

/// The runtime jar copied out of the archive. The file is removed when this
/// value is dropped.
#[derive(Debug)]
pub struct ExtractedRuntime {
    path: TempPath,
}

impl ExtractedRuntime {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copies the embedded runtime into a new temp file under `temp_dir`.
pub fn extract(archive: &Archive, location: &RuntimeLocation, temp_dir: &Path) -> Result<ExtractedRuntime> {
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(temp_dir)
        .map_err(|source| LaunchError::TempFileCreation {
            dir: temp_dir.to_path_buf(),
            source,
        })?;
    let (file, path) = temp.into_parts();

    let entry = location.entry();
    let copy_error = |source: io::Error| LaunchError::Copy {
        entry: entry.name().to_string(),
        target: path.to_path_buf(),
        source,
    };

    let mut input = archive.open_entry(entry)?;
    let mut output = file;
    let copied = copy_stream(&mut input, &mut output).map_err(copy_error)?;
    output.sync_all().map_err(copy_error)?;
    drop(output);
    drop(input);

    tracing::info!(
        runtime = location.jar_name(),
        target = %path.display(),
        bytes = copied,
        "extracted embedded runtime"
    );
    Ok(ExtractedRuntime { path })
}

fn copy_stream<R: Read, W: Write>(input: &mut R, output: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let len = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&buf[..len])?;
        total += len as u64;
    }

    output.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator;
    use crate::manifest::{Attributes, RUNTIME_JAR_ATTRIBUTE};
    use crate::testing::ArchiveBuilder;

    fn runtime_attrs(name: &str) -> Attributes {
        let mut attributes = Attributes::default();
        attributes.insert(RUNTIME_JAR_ATTRIBUTE, name);
        attributes
    }

    fn temp_files(dir: &Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn extracted_file_matches_embedded_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        // Larger than the copy buffer and not a multiple of it.
        let runtime: Vec<u8> = (0..(3 * BUFFER_SIZE + 123)).map(|i| (i * 7 % 256) as u8).collect();

        for (name, builder) in [
            ("stored.war", ArchiveBuilder::new().stored("WEB-INF/lib/rt.jar", runtime.clone())),
            ("deflated.war", ArchiveBuilder::new().deflated("WEB-INF/lib/rt.jar", runtime.clone())),
        ] {
            let path = dir.path().join(name);
            builder.write_to(&path).unwrap();
            let archive = Archive::open(&path).unwrap();
            let location = locator::locate(&runtime_attrs("rt.jar"), &archive).unwrap();

            let extracted = extract(&archive, &location, tmp.path()).unwrap();
            let file_name = extracted.path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(file_name.starts_with(TEMP_PREFIX), "{file_name}");
            assert!(file_name.ends_with(TEMP_SUFFIX), "{file_name}");
            assert_eq!(std::fs::read(extracted.path()).unwrap(), runtime);
        }
    }

    #[test]
    fn dropping_the_runtime_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.war");
        ArchiveBuilder::new()
            .stored("WEB-INF/lib/rt.jar", b"runtime".to_vec())
            .write_to(&path)
            .unwrap();
        let archive = Archive::open(&path).unwrap();
        let location = locator::locate(&runtime_attrs("rt.jar"), &archive).unwrap();

        let extracted = extract(&archive, &location, tmp.path()).unwrap();
        let extracted_path = extracted.path().to_path_buf();
        assert!(extracted_path.exists());
        drop(extracted);
        assert!(!extracted_path.exists());
        assert!(temp_files(tmp.path()).is_empty());
    }

    #[test]
    fn corrupt_runtime_fails_and_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let mut bytes = ArchiveBuilder::new()
            .stored("WEB-INF/lib/rt.jar", b"runtime payload".to_vec())
            .build()
            .unwrap();
        let at = bytes.windows(15).position(|w| w == b"runtime payload").unwrap();
        bytes[at + 3] ^= 0xFF;
        let path = dir.path().join("app.war");
        std::fs::write(&path, bytes).unwrap();

        let archive = Archive::open(&path).unwrap();
        let location = locator::locate(&runtime_attrs("rt.jar"), &archive).unwrap();
        let err = extract(&archive, &location, tmp.path()).unwrap_err();
        assert!(matches!(err, LaunchError::Copy { .. }), "{err}");
        assert!(temp_files(tmp.path()).is_empty());
    }

    #[test]
    fn temp_file_failure_names_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.war");
        ArchiveBuilder::new()
            .stored("WEB-INF/lib/rt.jar", b"runtime".to_vec())
            .write_to(&path)
            .unwrap();
        let archive = Archive::open(&path).unwrap();
        let location = locator::locate(&runtime_attrs("rt.jar"), &archive).unwrap();

        let missing = dir.path().join("no-such-tmp");
        let err = extract(&archive, &location, &missing).unwrap_err();
        assert!(matches!(err, LaunchError::TempFileCreation { .. }));
        assert_eq!(
            err.to_string(),
            format!("Failed to create a temporary file in '{}'.", missing.display())
        );
    }

    #[test]
    fn copy_stream_copies_until_end_of_stream() {
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let mut output = Vec::new();
        let copied = copy_stream(&mut data.as_slice(), &mut output).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(output, data);
    }
}
