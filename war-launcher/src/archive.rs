//! Read-only access to zip archives (WAR and JAR files).
//!
//! A self-executing archive is the launcher binary with a zip appended, so the
//! reader locates the central directory from the end of the file and computes
//! how many prefix bytes precede the zip data. Offsets recorded in the archive
//! are relative to the zip start and get shifted by that prefix.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use flate2::Crc;

use crate::error::{LaunchError, Result};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

const EOCD_LEN: usize = 22;
const ZIP64_LOCATOR_LEN: u64 = 20;
const ZIP64_EOCD_LEN: u64 = 56;
const CENTRAL_HEADER_LEN: usize = 46;
const LOCAL_HEADER_LEN: usize = 30;
const MAX_COMMENT_LEN: usize = 0xFFFF;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const FLAG_ENCRYPTED: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Deflated,
    Unsupported(u16),
}

impl Compression {
    fn from_method(method: u16) -> Self {
        match method {
            0 => Self::Stored,
            8 => Self::Deflated,
            other => Self::Unsupported(other),
        }
    }
}

/// One central directory record.
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    compression: Compression,
    flags: u16,
    crc32: u32,
    compressed_size: u64,
    size: u64,
    // Offset of the local header from the start of the zip data.
    header_offset: u64,
}

impl Entry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    prefix_len: u64,
    entries: Vec<Entry>,
}

struct EndRecord {
    entry_count: u64,
    cd_size: u64,
    cd_offset: u64,
    // File position of the record that immediately follows the central directory.
    cd_end: u64,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| LaunchError::archive_io(path, "cannot open file", e))?;
        let len = file
            .metadata()
            .map_err(|e| LaunchError::archive_io(path, "cannot read file metadata", e))?
            .len();

        let end = read_end_record(&mut file, len).map_err(|e| with_path(e, path))?;

        let prefix_len = end
            .cd_end
            .checked_sub(end.cd_offset.saturating_add(end.cd_size))
            .ok_or_else(|| LaunchError::archive(path, "central directory offset out of range"))?;

        let cd_len = usize::try_from(end.cd_size)
            .ok()
            .filter(|_| end.cd_size <= len)
            .ok_or_else(|| LaunchError::archive(path, "central directory size out of range"))?;
        let mut central = vec![0u8; cd_len];
        file.seek(SeekFrom::Start(prefix_len + end.cd_offset))
            .and_then(|_| file.read_exact(&mut central))
            .map_err(|e| LaunchError::archive_io(path, "cannot read central directory", e))?;

        let entries = parse_central_directory(&central, end.entry_count)
            .map_err(|e| with_path(e, path))?;

        tracing::debug!(
            archive = %path.display(),
            prefix_len,
            entries = entries.len(),
            "opened archive"
        );

        Ok(Self {
            path: path.to_path_buf(),
            prefix_len,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes in front of the zip data (the launcher executable).
    #[cfg(test)]
    pub(crate) fn prefix_len(&self) -> u64 {
        self.prefix_len
    }

    /// Looks up an entry by name. A leading `/` is ignored.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        let name = name.trim_start_matches('/');
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Opens a streaming reader over the uncompressed contents of `entry`.
    ///
    /// The reader checks size and CRC-32 once it reaches end-of-stream and
    /// reports a mismatch as [`io::ErrorKind::InvalidData`].
    pub fn open_entry(&self, entry: &Entry) -> Result<EntryReader> {
        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(LaunchError::archive(
                &self.path,
                format!("entry {} is encrypted", entry.name),
            ));
        }

        let header_start = self.prefix_len.checked_add(entry.header_offset).ok_or_else(|| {
            LaunchError::archive(
                &self.path,
                format!("local header offset of {} is out of range", entry.name),
            )
        })?;

        let mut file = File::open(&self.path)
            .map_err(|e| LaunchError::archive_io(&self.path, "cannot open file", e))?;
        let data_start = data_offset(&mut file, header_start).map_err(|e| {
            LaunchError::archive_io(&self.path, format!("cannot read local header of {}", entry.name), e)
        })?;
        file.seek(SeekFrom::Start(data_start))
            .map_err(|e| LaunchError::archive_io(&self.path, format!("cannot seek to {}", entry.name), e))?;

        let raw = BufReader::new(file).take(entry.compressed_size);
        let inner: Box<dyn Read> = match entry.compression {
            Compression::Stored => Box::new(raw),
            Compression::Deflated => Box::new(DeflateDecoder::new(raw)),
            Compression::Unsupported(method) => {
                return Err(LaunchError::archive(
                    &self.path,
                    format!("entry {} uses unsupported compression method {}", entry.name, method),
                ));
            }
        };

        Ok(EntryReader {
            inner,
            name: entry.name.clone(),
            crc: Crc::new(),
            read: 0,
            expected_crc: entry.crc32,
            expected_size: entry.size,
        })
    }

    /// Reads a whole entry into memory. Meant for small entries such as the
    /// manifest or a single class file.
    pub fn read_entry(&self, entry: &Entry) -> Result<Vec<u8>> {
        let mut reader = self.open_entry(entry)?;
        let mut data = Vec::with_capacity(usize::try_from(entry.size).unwrap_or(0).min(1 << 20));
        reader
            .read_to_end(&mut data)
            .map_err(|e| LaunchError::archive_io(&self.path, format!("cannot read {}", entry.name), e))?;
        Ok(data)
    }
}

/// Streaming reader over one entry that verifies length and CRC-32 at the end.
pub struct EntryReader {
    inner: Box<dyn Read>,
    name: String,
    crc: Crc,
    read: u64,
    expected_crc: u32,
    expected_size: u64,
}

impl EntryReader {
    fn verify(&self) -> io::Result<()> {
        if self.read != self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "entry {} is truncated: expected {} bytes, got {}",
                    self.name, self.expected_size, self.read
                ),
            ));
        }
        if self.crc.sum() != self.expected_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "entry {} failed CRC-32 check: expected {:08x}, got {:08x}",
                    self.name,
                    self.expected_crc,
                    self.crc.sum()
                ),
            ));
        }
        Ok(())
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.verify()?;
            }
            return Ok(0);
        }

        self.crc.update(&buf[..n]);
        self.read += n as u64;
        if self.read > self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {} is longer than its recorded size {}", self.name, self.expected_size),
            ));
        }
        Ok(n)
    }
}

// Errors raised before the archive path is attached carry an empty path.
fn with_path(err: LaunchError, path: &Path) -> LaunchError {
    match err {
        LaunchError::ArchiveRead { reason, source, .. } => LaunchError::ArchiveRead {
            path: path.to_path_buf(),
            reason,
            source,
        },
        other => other,
    }
}

fn format_error(reason: impl Into<String>) -> LaunchError {
    LaunchError::archive(PathBuf::new(), reason)
}

fn io_error(reason: impl Into<String>, source: io::Error) -> LaunchError {
    LaunchError::archive_io(PathBuf::new(), reason, source)
}

fn read_end_record(file: &mut File, len: u64) -> Result<EndRecord> {
    if len < EOCD_LEN as u64 {
        return Err(format_error("file is too short to be a zip archive"));
    }

    // The end record sits in the last 22 bytes plus an optional comment.
    let tail_len = len.min((EOCD_LEN + MAX_COMMENT_LEN) as u64);
    let tail_start = len - tail_len;
    let mut tail = vec![0u8; tail_len as usize];
    file.seek(SeekFrom::Start(tail_start))
        .and_then(|_| file.read_exact(&mut tail))
        .map_err(|e| io_error("cannot read end of central directory", e))?;

    let eocd = (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&i| {
            le_u32(&tail, i) == EOCD_SIGNATURE
                && i + EOCD_LEN + le_u16(&tail, i + 20) as usize <= tail.len()
        })
        .ok_or_else(|| format_error("end of central directory not found (not a zip archive)"))?;
    let eocd_pos = tail_start + eocd as u64;
    let record = &tail[eocd..eocd + EOCD_LEN];

    let disk = le_u16(record, 4);
    let cd_disk = le_u16(record, 6);
    let entry_count = le_u16(record, 10);
    let cd_size = le_u32(record, 12);
    let cd_offset = le_u32(record, 16);

    let needs_zip64 = entry_count == 0xFFFF || cd_size == 0xFFFF_FFFF || cd_offset == 0xFFFF_FFFF;
    if !needs_zip64 {
        if disk != 0 || cd_disk != 0 {
            return Err(format_error("multi-volume archives are not supported"));
        }
        return Ok(EndRecord {
            entry_count: u64::from(entry_count),
            cd_size: u64::from(cd_size),
            cd_offset: u64::from(cd_offset),
            cd_end: eocd_pos,
        });
    }

    // Zip64: a locator precedes the classic record, and the zip64 end record
    // precedes the locator.
    let locator_pos = eocd_pos
        .checked_sub(ZIP64_LOCATOR_LEN)
        .ok_or_else(|| format_error("zip64 end of central directory locator not found"))?;
    let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
    file.seek(SeekFrom::Start(locator_pos))
        .and_then(|_| file.read_exact(&mut locator))
        .map_err(|e| io_error("cannot read zip64 locator", e))?;
    if le_u32(&locator, 0) != ZIP64_LOCATOR_SIGNATURE {
        return Err(format_error("zip64 end of central directory locator not found"));
    }

    let zip64_pos = locator_pos
        .checked_sub(ZIP64_EOCD_LEN)
        .ok_or_else(|| format_error("zip64 end of central directory record not found"))?;
    let mut zip64 = [0u8; ZIP64_EOCD_LEN as usize];
    file.seek(SeekFrom::Start(zip64_pos))
        .and_then(|_| file.read_exact(&mut zip64))
        .map_err(|e| io_error("cannot read zip64 end of central directory", e))?;
    if le_u32(&zip64, 0) != ZIP64_EOCD_SIGNATURE {
        return Err(format_error("zip64 end of central directory record not found"));
    }
    if le_u32(&zip64, 16) != 0 || le_u32(&zip64, 20) != 0 {
        return Err(format_error("multi-volume archives are not supported"));
    }

    Ok(EndRecord {
        entry_count: le_u64(&zip64, 32),
        cd_size: le_u64(&zip64, 40),
        cd_offset: le_u64(&zip64, 48),
        cd_end: zip64_pos,
    })
}

fn parse_central_directory(data: &[u8], entry_count: u64) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(usize::try_from(entry_count).unwrap_or(0).min(1 << 16));
    let mut pos = 0usize;

    for index in 0..entry_count {
        if pos + CENTRAL_HEADER_LEN > data.len() || le_u32(data, pos) != CENTRAL_HEADER_SIGNATURE {
            return Err(format_error(format!("central directory record {} is corrupt", index)));
        }

        let flags = le_u16(data, pos + 8);
        let method = le_u16(data, pos + 10);
        let crc32 = le_u32(data, pos + 16);
        let mut compressed_size = u64::from(le_u32(data, pos + 20));
        let mut size = u64::from(le_u32(data, pos + 24));
        let name_len = le_u16(data, pos + 28) as usize;
        let extra_len = le_u16(data, pos + 30) as usize;
        let comment_len = le_u16(data, pos + 32) as usize;
        let mut header_offset = u64::from(le_u32(data, pos + 42));

        let name_start = pos + CENTRAL_HEADER_LEN;
        let extra_start = name_start + name_len;
        let next = extra_start + extra_len + comment_len;
        if next > data.len() {
            return Err(format_error(format!("central directory record {} is truncated", index)));
        }

        let name = String::from_utf8_lossy(&data[name_start..extra_start]).into_owned();

        // Zip64 extra field: only the values saturated in the fixed header are present, in order.
        let mut extra = &data[extra_start..extra_start + extra_len];
        while extra.len() >= 4 {
            let id = le_u16(extra, 0);
            let field_len = le_u16(extra, 2) as usize;
            let field = extra
                .get(4..4 + field_len)
                .ok_or_else(|| format_error(format!("extra field of {} is truncated", name)))?;
            if id == ZIP64_EXTRA_ID {
                let mut values = field.chunks_exact(8).map(|chunk| le_u64(chunk, 0));
                if size == 0xFFFF_FFFF {
                    size = values.next().ok_or_else(|| format_error(format!("zip64 size of {} missing", name)))?;
                }
                if compressed_size == 0xFFFF_FFFF {
                    compressed_size = values
                        .next()
                        .ok_or_else(|| format_error(format!("zip64 compressed size of {} missing", name)))?;
                }
                if header_offset == 0xFFFF_FFFF {
                    header_offset = values
                        .next()
                        .ok_or_else(|| format_error(format!("zip64 offset of {} missing", name)))?;
                }
            }
            extra = &extra[4 + field_len..];
        }

        entries.push(Entry {
            name,
            compression: Compression::from_method(method),
            flags,
            crc32,
            compressed_size,
            size,
            header_offset,
        });
        pos = next;
    }

    Ok(entries)
}

fn data_offset(file: &mut File, header_start: u64) -> io::Result<u64> {
    let mut header = [0u8; LOCAL_HEADER_LEN];
    file.seek(SeekFrom::Start(header_start))?;
    file.read_exact(&mut header)?;
    if le_u32(&header, 0) != LOCAL_HEADER_SIGNATURE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad local header signature"));
    }
    let name_len = u64::from(le_u16(&header, 26));
    let extra_len = u64::from(le_u16(&header, 28));
    header_start
        .checked_add(LOCAL_HEADER_LEN as u64 + name_len + extra_len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "entry data offset out of range"))
}

fn le_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ArchiveBuilder;

    fn write(dir: &Path, name: &str, builder: &ArchiveBuilder) -> PathBuf {
        let path = dir.join(name);
        builder.write_to(&path).unwrap();
        path
    }

    fn read_all(archive: &Archive, name: &str) -> Vec<u8> {
        let entry = archive.entry(name).unwrap();
        archive.read_entry(entry).unwrap()
    }

    #[test]
    fn reads_stored_and_deflated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let path = write(
            dir.path(),
            "plain.zip",
            &ArchiveBuilder::new()
                .stored("a/stored.bin", payload.clone())
                .deflated("a/deflated.bin", payload.clone())
                .stored("a/", Vec::new()),
        );

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.prefix_len(), 0);
        assert_eq!(archive.entries.len(), 3);
        assert_eq!(read_all(&archive, "a/stored.bin"), payload);
        assert_eq!(read_all(&archive, "/a/deflated.bin"), payload);
        assert_eq!(archive.entry("a/deflated.bin").unwrap().compression, Compression::Deflated);
        assert!(archive.entry("a/").unwrap().is_dir());
        assert!(archive.entry("a/missing.bin").is_none());
    }

    #[test]
    fn handles_executable_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = b"#!/bin/false\n\x7fELF pretend launcher bytes".repeat(40);
        let path = write(
            dir.path(),
            "prefixed.war",
            &ArchiveBuilder::new()
                .prefix(prefix.clone())
                .deflated("WEB-INF/web.xml", b"<web-app/>".to_vec()),
        );

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.prefix_len(), prefix.len() as u64);
        assert_eq!(read_all(&archive, "WEB-INF/web.xml"), b"<web-app/>");
    }

    #[test]
    fn reads_zip64_end_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "zip64.zip",
            &ArchiveBuilder::new()
                .prefix(b"#!launcher".to_vec())
                .zip64()
                .stored("one.txt", b"first".to_vec())
                .deflated("two.txt", b"second second second".to_vec()),
        );

        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.prefix_len(), b"#!launcher".len() as u64);
        assert_eq!(read_all(&archive, "one.txt"), b"first");
        assert_eq!(read_all(&archive, "two.txt"), b"second second second");
    }

    #[test]
    fn out_of_range_zip64_offset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = ArchiveBuilder::new()
            .prefix(b"#!launcher".to_vec())
            .zip64()
            .stored("one.txt", b"first".to_vec())
            .build()
            .unwrap();

        // The offset is the last value of the zip64 extra field in the central record.
        let record = bytes.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
        let name_len = le_u16(&bytes, record + 28) as usize;
        let offset_at = record + CENTRAL_HEADER_LEN + name_len + 4 + 16;
        bytes[offset_at..offset_at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        let path = dir.path().join("crafted.zip");
        std::fs::write(&path, bytes).unwrap();

        let archive = Archive::open(&path).unwrap();
        let err = archive.read_entry(archive.entry("one.txt").unwrap()).unwrap_err();
        assert!(matches!(err, LaunchError::ArchiveRead { .. }));
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn detects_corrupted_entry_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = ArchiveBuilder::new()
            .stored("data.txt", b"hello world".to_vec())
            .build()
            .unwrap();
        let at = bytes.windows(11).position(|w| w == b"hello world").unwrap();
        bytes[at] = b'j';
        let path = dir.path().join("corrupt.zip");
        std::fs::write(&path, bytes).unwrap();

        let archive = Archive::open(&path).unwrap();
        let err = archive.read_entry(archive.entry("data.txt").unwrap()).unwrap_err();
        assert!(err.to_string().contains("cannot read data.txt"), "{err}");
        let cause = std::error::Error::source(&err).unwrap().to_string();
        assert!(cause.contains("CRC-32"), "{cause}");
    }

    #[test]
    fn rejects_files_that_are_not_archives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not.zip");
        std::fs::write(&path, b"just some text that is long enough to scan").unwrap();

        let err = Archive::open(&path).unwrap_err();
        match err {
            LaunchError::ArchiveRead { path: reported, reason, .. } => {
                assert_eq!(reported, path);
                assert!(reason.contains("not a zip archive"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Archive::open(&dir.path().join("absent.war")).unwrap_err();
        assert!(matches!(err, LaunchError::ArchiveRead { source: Some(_), .. }));
    }
}
