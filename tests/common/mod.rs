// tests/common/mod.rs

//! Shared fixtures for package integration tests.

#![allow(dead_code)]

use l6e_forge::pkg::archive::{ArchiveWriter, PackageArchive, DEFAULT_MTIME};
use l6e_forge::Workspace;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create an agent directory containing only `agent.py`.
pub fn create_agent(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("agent.py"),
        "class Agent:\n    def handle(self, msg):\n        return msg\n",
    )
    .unwrap();
    dir
}

/// Create an initialised workspace under `root/ws`.
pub fn create_workspace(root: &Path) -> Workspace {
    Workspace::init(&root.join("ws"), "test-ws").unwrap()
}

/// Fresh temp dir plus a workspace inside it.
///
/// Returns (TempDir, Workspace) - keep the TempDir alive to prevent cleanup.
pub fn setup() -> (TempDir, Workspace) {
    let temp = tempfile::tempdir().unwrap();
    let ws = create_workspace(temp.path());
    (temp, ws)
}

/// Rewrite a package, replacing one member's bytes and leaving the rest
/// (including checksums.txt) untouched.
pub fn tamper_member(package: &Path, member: &str, data: &[u8]) {
    let archive = PackageArchive::open(package).unwrap();
    assert!(archive.contains(member), "no member {member}");

    let rewritten: Vec<(String, Vec<u8>)> = archive
        .members()
        .iter()
        .map(|m| {
            if m.name == member {
                (m.name.clone(), data.to_vec())
            } else {
                (m.name.clone(), m.data.clone())
            }
        })
        .collect();
    drop(archive);

    write_members(package, &rewritten);
}

/// Rewrite a package without the named member.
pub fn drop_member(package: &Path, member: &str) {
    let archive = PackageArchive::open(package).unwrap();
    let kept: Vec<(String, Vec<u8>)> = archive
        .members()
        .iter()
        .filter(|m| m.name != member)
        .map(|m| (m.name.clone(), m.data.clone()))
        .collect();
    drop(archive);

    write_members(package, &kept);
}

fn write_members(package: &Path, members: &[(String, Vec<u8>)]) {
    let file = File::create(package).unwrap();
    let mut writer = ArchiveWriter::new(file, DEFAULT_MTIME);
    for (name, data) in members {
        writer.append(name, data).unwrap();
    }
    writer.finish().unwrap();
}
