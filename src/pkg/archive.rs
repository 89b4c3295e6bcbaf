// src/pkg/archive.rs
//! `.l6e` container access
//!
//! A package is a deflate-compressed zip of regular files. Readers also
//! accept a gzip-compressed tar with the same member layout; the container
//! is picked by its magic bytes. Member names form a flat contract (see the
//! constants below); everything a reader needs is loaded into memory in
//! archive order.

use crate::error::{Error, Result};
use chrono::{Datelike, TimeZone, Timelike, Utc};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MANIFEST_MEMBER: &str = "package.toml";
pub const LEDGER_MEMBER: &str = "checksums.txt";
pub const SIGNATURE_MEMBER: &str = "signature.sig";
pub const PUBLIC_KEY_MEMBER: &str = "signature.pub";
pub const SIGNATURE_META_MEMBER: &str = "signature.meta";
pub const OVERLAY_MEMBER: &str = "compose/stack.yaml";
pub const REQUIREMENTS_MEMBER: &str = "artifacts/requirements.txt";

/// Prefix of every packaged source file
pub const AGENT_PREFIX: &str = "agent/";

/// Package file extension
pub const PACKAGE_EXTENSION: &str = "l6e";

/// Member mtime used when `SOURCE_DATE_EPOCH` is unset (2024-01-01 00:00:00 UTC)
pub const DEFAULT_MTIME: u64 = 1704067200;

/// Members that certify the ledger rather than being covered by it
pub const SIGNATURE_MEMBERS: [&str; 3] = [SIGNATURE_MEMBER, PUBLIC_KEY_MEMBER, SIGNATURE_META_MEMBER];

/// One regular file inside a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub data: Vec<u8>,
}

/// A package loaded into memory
#[derive(Debug)]
pub struct PackageArchive {
    path: PathBuf,
    members: Vec<Member>,
    index: HashMap<String, usize>,
}

impl PackageArchive {
    /// Open and fully read a package file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_reader(path, file)
    }

    /// Read a package from any supported container stream
    ///
    /// `path` is only used for error messages.
    pub fn from_reader<R: Read>(path: &Path, mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    /// Read a package held in memory
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let mut package = Self {
            path: path.to_path_buf(),
            members: Vec::new(),
            index: HashMap::new(),
        };

        for_each_member(path, bytes, |name, reader| {
            let mut data = Vec::new();
            reader
                .read_to_end(&mut data)
                .map_err(|e| Error::archive(path, format!("{}: {}", name, e)))?;
            package.insert(name, data);
            Ok(())
        })?;

        Ok(package)
    }

    /// Later duplicates replace the earlier member's bytes in place
    fn insert(&mut self, name: String, data: Vec<u8>) {
        match self.index.get(&name) {
            Some(&i) => self.members[i].data = data,
            None => {
                self.index.insert(name.clone(), self.members.len());
                self.members.push(Member { name, data });
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All members in archive order
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.index.get(name).map(|&i| self.members[i].data.as_slice())
    }

    /// Member bytes, or a missing-member error naming it
    pub fn require(&self, name: &str) -> Result<&[u8]> {
        self.get(name)
            .ok_or_else(|| Error::MissingMember(name.to_string()))
    }

    /// Member decoded as UTF-8 text
    pub fn text(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| Error::Parse {
                    member: name.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// `agent/**` members with the prefix stripped
    pub fn agent_members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members
            .iter()
            .filter_map(|m| m.name.strip_prefix(AGENT_PREFIX).map(|rel| (rel, m)))
    }
}

/// Container layouts a package may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Deflate-compressed zip, the format packages are written in
    Zip,
    /// Gzip-compressed tar
    TarGz,
}

impl ContainerFormat {
    /// Sniff the container from its leading magic bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Visit every regular-file member in archive order
///
/// Directory, link and other non-file entries are skipped. Names are
/// passed through [`normalize_member_name`].
pub fn for_each_member<F>(path: &Path, bytes: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(String, &mut dyn Read) -> Result<()>,
{
    match ContainerFormat::detect(bytes) {
        Some(ContainerFormat::Zip) => {
            let mut archive =
                ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::archive(path, e))?;
            for i in 0..archive.len() {
                let mut file = archive.by_index(i).map_err(|e| Error::archive(path, e))?;
                if !file.is_file() {
                    continue;
                }
                let name = normalize_member_name(file.name());
                visit(name, &mut file)?;
            }
            Ok(())
        }
        Some(ContainerFormat::TarGz) => {
            let mut archive = tar::Archive::new(GzDecoder::new(bytes));
            let entries = archive.entries().map_err(|e| Error::archive(path, e))?;
            for entry in entries {
                let mut entry = entry.map_err(|e| Error::archive(path, e))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = normalize_member_name(&String::from_utf8_lossy(&entry.path_bytes()));
                visit(name, &mut entry)?;
            }
            Ok(())
        }
        None => Err(Error::archive(path, "not a zip or gzip-compressed tar container")),
    }
}

/// Strip the leading `./` some archive writers add
pub fn normalize_member_name(raw: &str) -> String {
    let mut name = raw;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name.to_string()
}

/// Archive member name for a file at `relative` under the agent root
///
/// Separators are normalised to `/` regardless of platform.
pub fn agent_member_name(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("{}{}", AGENT_PREFIX, parts.join("/"))
}

/// Validate an extracted member's relative path
///
/// Rejects absolute paths, `..` components and paths that reduce to
/// nothing. Backslashes are treated as separators so a member written on
/// another platform cannot smuggle a parent reference.
pub fn safe_relative_path(member: &str, relative: &str) -> Result<PathBuf> {
    let unsafe_path = || Error::UnsafeMemberPath(member.to_string());

    if relative.starts_with('/') || relative.starts_with('\\') {
        return Err(unsafe_path());
    }

    let mut out = PathBuf::new();
    for part in relative.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            _ => {
                let component = Path::new(part);
                if component.is_absolute()
                    || !matches!(component.components().next(), Some(Component::Normal(_)))
                {
                    return Err(unsafe_path());
                }
                out.push(part);
            }
        }
    }

    if out.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(out)
}

/// Package writer with normalised member metadata
///
/// Every member is deflated with the same timestamp and `0644`
/// permissions, so identical inputs produce identical bytes.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(writer: W, mtime: u64) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip_timestamp(mtime))
            .unix_permissions(0o644);
        Self {
            zip: ZipWriter::new(writer),
            options,
        }
    }

    /// Append one regular file member
    pub fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(data)
    }

    /// Write the central directory, returning the inner writer
    pub fn finish(self) -> io::Result<W> {
        Ok(self.zip.finish()?)
    }
}

/// Zip timestamps cover 1980..=2107; anything outside clamps to 1980-01-01
fn zip_timestamp(mtime: u64) -> zip::DateTime {
    i64::try_from(mtime)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .and_then(|t| {
            zip::DateTime::from_date_and_time(
                u16::try_from(t.year()).ok()?,
                t.month() as u8,
                t.day() as u8,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_members(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DEFAULT_MTIME);
        for (name, data) in members {
            writer.append(name, data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Gzip tar with arbitrary entry types, duplicates allowed
    fn write_tar_gz(entries: &[(&str, tar::EntryType, &[u8])]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, kind, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(*kind);
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
            if kind.is_symlink() {
                header.set_link_name("elsewhere").unwrap();
            }
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let bytes = write_members(&[
            (MANIFEST_MEMBER, b"[metadata]\n"),
            (LEDGER_MEMBER, b""),
            ("agent/agent.py", b"print('hi')\n"),
            ("agent/tools/x.py", b"x = 1\n"),
        ]);

        let pkg = PackageArchive::from_reader(Path::new("t.l6e"), bytes.as_slice()).unwrap();
        let names: Vec<&str> = pkg.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![MANIFEST_MEMBER, LEDGER_MEMBER, "agent/agent.py", "agent/tools/x.py"]
        );
        assert_eq!(pkg.get("agent/agent.py"), Some(&b"print('hi')\n"[..]));

        let agent: Vec<&str> = pkg.agent_members().map(|(rel, _)| rel).collect();
        assert_eq!(agent, vec!["agent.py", "tools/x.py"]);
    }

    #[test]
    fn test_identical_input_identical_bytes() {
        let a = write_members(&[(MANIFEST_MEMBER, b"x"), ("agent/agent.py", b"y")]);
        let b = write_members(&[(MANIFEST_MEMBER, b"x"), ("agent/agent.py", b"y")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_long_member_names() {
        let long = format!("agent/{}/file.py", "d".repeat(150));
        let bytes = write_members(&[(long.as_str(), b"z")]);
        let pkg = PackageArchive::from_reader(Path::new("t.l6e"), bytes.as_slice()).unwrap();
        assert!(pkg.contains(&long));
    }

    #[test]
    fn test_missing_member_error() {
        let bytes = write_members(&[("agent/agent.py", b"y")]);
        let pkg = PackageArchive::from_reader(Path::new("t.l6e"), bytes.as_slice()).unwrap();
        let err = pkg.require(MANIFEST_MEMBER).unwrap_err();
        assert!(err.to_string().contains("package.toml"));
        assert!(pkg.text(MANIFEST_MEMBER).unwrap().is_none());
    }

    #[test]
    fn test_written_as_deflated_zip() {
        let bytes = write_members(&[(MANIFEST_MEMBER, b"[metadata]\n")]);
        assert_eq!(ContainerFormat::detect(&bytes), Some(ContainerFormat::Zip));

        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let file = zip.by_index(0).unwrap();
        assert_eq!(file.name(), MANIFEST_MEMBER);
        assert_eq!(file.compression(), CompressionMethod::Deflated);
        assert_eq!(file.unix_mode().map(|m| m & 0o777), Some(0o644));
    }

    #[test]
    fn test_reads_plain_zip_with_directories() {
        // the layout a stock zip tool produces: explicit directory entries, default options
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.add_directory("agent/", options).unwrap();
        zip.start_file("package.toml", options).unwrap();
        zip.write_all(b"[metadata]\nname = \"demo\"\n").unwrap();
        zip.start_file("agent/agent.py", options).unwrap();
        zip.write_all(b"class Agent: ...\n").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let pkg = PackageArchive::from_bytes(Path::new("t.l6e"), &bytes).unwrap();
        let names: Vec<&str> = pkg.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec![MANIFEST_MEMBER, "agent/agent.py"]);
    }

    #[test]
    fn test_reads_tar_gz_last_duplicate_wins() {
        let bytes = write_tar_gz(&[
            (MANIFEST_MEMBER, tar::EntryType::Regular, b"first"),
            ("agent", tar::EntryType::Directory, b""),
            ("./agent/agent.py", tar::EntryType::Regular, b"x"),
            (MANIFEST_MEMBER, tar::EntryType::Regular, b"second"),
            (MANIFEST_MEMBER, tar::EntryType::Symlink, b""),
        ]);
        assert_eq!(ContainerFormat::detect(&bytes), Some(ContainerFormat::TarGz));

        let pkg = PackageArchive::from_bytes(Path::new("t.l6e"), &bytes).unwrap();
        let names: Vec<&str> = pkg.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec![MANIFEST_MEMBER, "agent/agent.py"]);
        assert_eq!(pkg.get(MANIFEST_MEMBER), Some(&b"second"[..]));
    }

    #[test]
    fn test_unknown_container_is_archive_error() {
        let err = PackageArchive::from_reader(Path::new("bad.l6e"), &b"not an archive"[..])
            .unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
        assert!(err.to_string().contains("bad.l6e"));
    }

    #[test]
    fn test_zip_timestamp_clamps() {
        let t = zip_timestamp(DEFAULT_MTIME);
        assert_eq!((t.year(), t.month(), t.day()), (2024, 1, 1));
        assert_eq!(zip_timestamp(0), zip::DateTime::default());
    }

    #[test]
    fn test_normalize_member_name() {
        assert_eq!(normalize_member_name("./package.toml"), "package.toml");
        assert_eq!(normalize_member_name("agent/a.py"), "agent/a.py");
    }

    #[test]
    fn test_agent_member_name() {
        assert_eq!(
            agent_member_name(Path::new("tools").join("x.py").as_path()),
            "agent/tools/x.py"
        );
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path("agent/a/b.py", "a/b.py").unwrap(),
            Path::new("a").join("b.py")
        );
        assert_eq!(
            safe_relative_path("agent/./a.py", "./a.py").unwrap(),
            PathBuf::from("a.py")
        );
        for bad in ["../evil.py", "a/../../evil", "/etc/passwd", "", "\\x", "a\\..\\b"] {
            let err = safe_relative_path(bad, bad).unwrap_err();
            assert!(matches!(err, Error::UnsafeMemberPath(_)), "{bad}");
        }
    }
}
