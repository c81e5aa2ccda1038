//! Builders for archives and class files used by the tests.
//!
//! Only compiled for `cfg(test)` and the `test-support` feature.

use std::io::{self, Write};
use std::path::Path;

use flate2::write::DeflateEncoder;
use flate2::Crc;

use crate::archive::Compression;
use crate::classfile::{ACC_PUBLIC, ACC_STATIC};
use crate::entry_point::MAIN_DESCRIPTOR;

// 1980-01-01 00:00 in MS-DOS format.
const DOS_DATE: u16 = (1 << 5) | 1;
const FLAG_UTF8: u16 = 0x0800;

struct PendingEntry {
    name: String,
    data: Vec<u8>,
    compression: Compression,
}

/// Writes zip archives, optionally behind a prefix the way a self-executing
/// archive carries the launcher in front of the zip data.
#[derive(Default)]
pub struct ArchiveBuilder {
    prefix: Vec<u8>,
    zip64: bool,
    entries: Vec<PendingEntry>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.prefix = bytes.into();
        self
    }

    /// Emits zip64 end records and zip64 extra fields for every entry.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn stored(self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entry(name, data.into(), Compression::Stored)
    }

    pub fn deflated(self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entry(name, data.into(), Compression::Deflated)
    }

    /// Adds `META-INF/MANIFEST.MF` with `Manifest-Version` and the given attributes.
    pub fn manifest(self, attributes: &[(&str, &str)]) -> Self {
        let mut text = String::from("Manifest-Version: 1.0\r\n");
        for (name, value) in attributes {
            text.push_str(&format!("{}: {}\r\n", name, value));
        }
        text.push_str("\r\n");
        self.deflated("META-INF/MANIFEST.MF", text.into_bytes())
    }

    fn entry(mut self, name: &str, data: Vec<u8>, compression: Compression) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            data,
            compression,
        });
        self
    }

    pub fn build(&self) -> io::Result<Vec<u8>> {
        let mut out = self.prefix.clone();
        let base = out.len();
        let mut central = Vec::new();

        for entry in &self.entries {
            let offset = (out.len() - base) as u64;
            let mut crc = Crc::new();
            crc.update(&entry.data);

            let (method, payload) = match entry.compression {
                Compression::Deflated => {
                    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                    encoder.write_all(&entry.data)?;
                    (8u16, encoder.finish()?)
                }
                _ => (0u16, entry.data.clone()),
            };
            let name = entry.name.as_bytes();

            // Local header
            put_u32(&mut out, 0x0403_4b50);
            put_u16(&mut out, 20);
            put_u16(&mut out, FLAG_UTF8);
            put_u16(&mut out, method);
            put_u16(&mut out, 0);
            put_u16(&mut out, DOS_DATE);
            put_u32(&mut out, crc.sum());
            put_u32(&mut out, payload.len() as u32);
            put_u32(&mut out, entry.data.len() as u32);
            put_u16(&mut out, name.len() as u16);
            put_u16(&mut out, 0);
            out.extend_from_slice(name);
            out.extend_from_slice(&payload);

            // Central directory record
            let mut extra = Vec::new();
            if self.zip64 {
                put_u16(&mut extra, 0x0001);
                put_u16(&mut extra, 24);
                put_u64(&mut extra, entry.data.len() as u64);
                put_u64(&mut extra, payload.len() as u64);
                put_u64(&mut extra, offset);
            }
            let saturate = |value: u64| if self.zip64 { 0xFFFF_FFFF } else { value as u32 };

            put_u32(&mut central, 0x0201_4b50);
            put_u16(&mut central, if self.zip64 { 45 } else { 20 });
            put_u16(&mut central, if self.zip64 { 45 } else { 20 });
            put_u16(&mut central, FLAG_UTF8);
            put_u16(&mut central, method);
            put_u16(&mut central, 0);
            put_u16(&mut central, DOS_DATE);
            put_u32(&mut central, crc.sum());
            put_u32(&mut central, saturate(payload.len() as u64));
            put_u32(&mut central, saturate(entry.data.len() as u64));
            put_u16(&mut central, name.len() as u16);
            put_u16(&mut central, extra.len() as u16);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u32(&mut central, 0);
            put_u32(&mut central, saturate(offset));
            central.extend_from_slice(name);
            central.extend_from_slice(&extra);
        }

        let cd_offset = (out.len() - base) as u64;
        let cd_size = central.len() as u64;
        let count = self.entries.len() as u64;
        out.extend_from_slice(&central);

        if self.zip64 {
            let zip64_offset = (out.len() - base) as u64;
            put_u32(&mut out, 0x0606_4b50);
            put_u64(&mut out, 44);
            put_u16(&mut out, 45);
            put_u16(&mut out, 45);
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
            put_u64(&mut out, count);
            put_u64(&mut out, count);
            put_u64(&mut out, cd_size);
            put_u64(&mut out, cd_offset);

            put_u32(&mut out, 0x0706_4b50);
            put_u32(&mut out, 0);
            put_u64(&mut out, zip64_offset);
            put_u32(&mut out, 1);
        }

        put_u32(&mut out, 0x0605_4b50);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0);
        if self.zip64 {
            put_u16(&mut out, 0xFFFF);
            put_u16(&mut out, 0xFFFF);
            put_u32(&mut out, 0xFFFF_FFFF);
            put_u32(&mut out, 0xFFFF_FFFF);
        } else {
            put_u16(&mut out, count as u16);
            put_u16(&mut out, count as u16);
            put_u32(&mut out, cd_size as u32);
            put_u32(&mut out, cd_offset as u32);
        }
        put_u16(&mut out, 0);

        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.build()?)
    }
}

pub struct ClassMethod<'a> {
    name: &'a str,
    descriptor: &'a str,
    access_flags: u16,
}

impl<'a> ClassMethod<'a> {
    pub fn new(name: &'a str, descriptor: &'a str, access_flags: u16) -> Self {
        Self {
            name,
            descriptor,
            access_flags,
        }
    }
}

/// Assembles a class file declaring `methods`. Method bodies are left out;
/// the result only has to satisfy a structural reader.
pub fn class_file(internal_name: &str, methods: &[ClassMethod<'_>]) -> Vec<u8> {
    let mut pool: Vec<Vec<u8>> = Vec::new();
    let utf8 = |pool: &mut Vec<Vec<u8>>, text: &str| -> u16 {
        let mut constant = vec![1u8];
        put_u16_be(&mut constant, text.len() as u16);
        constant.extend_from_slice(text.as_bytes());
        pool.push(constant);
        pool.len() as u16
    };
    let class = |pool: &mut Vec<Vec<u8>>, name_index: u16| -> u16 {
        let mut constant = vec![7u8];
        put_u16_be(&mut constant, name_index);
        pool.push(constant);
        pool.len() as u16
    };

    let this_name = utf8(&mut pool, internal_name);
    let this_class = class(&mut pool, this_name);
    let super_name = utf8(&mut pool, "java/lang/Object");
    let super_class = class(&mut pool, super_name);

    // A long takes two pool slots; the empty vector fills the second one.
    let mut long = vec![5u8];
    long.extend_from_slice(&42u64.to_be_bytes());
    pool.push(long);
    pool.push(Vec::new());

    let field_name = utf8(&mut pool, "DEFAULT_PORT");
    let field_descriptor = utf8(&mut pool, "I");
    let attribute_name = utf8(&mut pool, "Synthetic");

    let method_indices: Vec<(u16, u16, u16)> = methods
        .iter()
        .map(|m| {
            let name = utf8(&mut pool, m.name);
            let descriptor = utf8(&mut pool, m.descriptor);
            (m.access_flags, name, descriptor)
        })
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    put_u16_be(&mut out, 0);
    put_u16_be(&mut out, 52);
    put_u16_be(&mut out, pool.len() as u16 + 1);
    for constant in &pool {
        out.extend_from_slice(constant);
    }
    put_u16_be(&mut out, ACC_PUBLIC | 0x0020);
    put_u16_be(&mut out, this_class);
    put_u16_be(&mut out, super_class);
    put_u16_be(&mut out, 0);

    // One field with one (empty) attribute.
    put_u16_be(&mut out, 1);
    put_u16_be(&mut out, ACC_STATIC);
    put_u16_be(&mut out, field_name);
    put_u16_be(&mut out, field_descriptor);
    put_u16_be(&mut out, 1);
    put_u16_be(&mut out, attribute_name);
    out.extend_from_slice(&0u32.to_be_bytes());

    put_u16_be(&mut out, method_indices.len() as u16);
    for (flags, name, descriptor) in method_indices {
        put_u16_be(&mut out, flags);
        put_u16_be(&mut out, name);
        put_u16_be(&mut out, descriptor);
        put_u16_be(&mut out, 0);
    }
    put_u16_be(&mut out, 0);
    out
}

/// A class `winstone/Launcher` with `public static void main(String[])`.
pub fn launcher_class() -> Vec<u8> {
    class_file(
        "winstone/Launcher",
        &[
            ClassMethod::new("<init>", "()V", ACC_PUBLIC),
            ClassMethod::new("main", MAIN_DESCRIPTOR, ACC_PUBLIC | ACC_STATIC),
        ],
    )
}

/// A runtime jar whose entry point satisfies the default loader.
pub fn runtime_jar() -> io::Result<Vec<u8>> {
    ArchiveBuilder::new()
        .manifest(&[("Main-Class", "winstone.Launcher")])
        .deflated("winstone/Launcher.class", launcher_class())
        .stored("winstone/LocalStrings.properties", b"ServerName=test\n".to_vec())
        .build()
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u16_be(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}
