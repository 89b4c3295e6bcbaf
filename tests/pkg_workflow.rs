// tests/pkg_workflow.rs

//! Build, inspect, verify and install round trips for .l6e packages.

mod common;

use common::{create_agent, drop_member, setup, tamper_member};
use l6e_forge::pkg::archive::{
    PackageArchive, LEDGER_MEMBER, PUBLIC_KEY_MEMBER, SIGNATURE_MEMBER, SIGNATURE_META_MEMBER,
};
use l6e_forge::pkg::{
    self, BuildOptions, InstallOptions, KeyEncoding, Ledger, Profile, VerifyOptions,
};
use l6e_forge::{Error, ErrorKind};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn versioned(version: &str) -> BuildOptions {
    BuildOptions {
        version: Some(version.to_string()),
        ..Default::default()
    }
}

#[test]
fn test_build_then_inspect_recovers_metadata() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");

    let options = BuildOptions {
        name: Some("helper".to_string()),
        version: Some("3.1.4".to_string()),
        description: Some("Answers \"questions\"".to_string()),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();

    let report = pkg::inspect(&outcome.archive_path, false).unwrap();
    assert_eq!(report.metadata.name, "helper");
    assert_eq!(report.metadata.version, "3.1.4");
    assert_eq!(report.metadata.description, "Answers \"questions\"");
    assert_eq!(report.metadata.package_format_version, "1.0");
    assert!(report.metadata.created_at.ends_with('Z'));
    assert_eq!(report.entrypoint, "agent.py:Agent");
}

#[test]
fn test_demo_example_has_two_ledger_entries() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");

    let outcome = pkg::build(&agent, &temp.path().join("dist"), &versioned("0.2.0")).unwrap();

    let paths: Vec<&str> = outcome.ledger.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["package.toml", "agent/agent.py"]);

    let report = pkg::inspect(&outcome.archive_path, false).unwrap();
    assert_eq!(report.metadata.version, "0.2.0");
    assert_eq!(report.checksum_entries, Some(2));
    assert!(report.to_string().contains("version: 0.2.0"));
}

#[test]
fn test_config_description_fallback() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");
    fs::write(
        agent.join("config.toml"),
        "[agent]\ndescription = \"Config Desc\"\n\n[model]\nprovider = \"ollama\"\n",
    )
    .unwrap();

    let outcome = pkg::build(&agent, &temp.path().join("dist"), &BuildOptions::default()).unwrap();
    assert_eq!(outcome.manifest.metadata.description, "Config Desc");

    let report = pkg::inspect(&outcome.archive_path, true).unwrap();
    assert_eq!(report.metadata.description, "Config Desc");
    let config = report.config.unwrap();
    assert!(config
        .text
        .contains("[agent_config.agent]\ndescription = \"Config Desc\"\n"));
}

#[test]
fn test_ledger_rederives_from_archive() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");
    fs::create_dir_all(agent.join("tools")).unwrap();
    fs::write(agent.join("tools").join("search.py"), "def search(): ...\n").unwrap();
    fs::write(agent.join("data.bin"), [0u8, 159, 146, 150, b'\r', b'\n']).unwrap();
    fs::write(agent.join("requirements.txt"), "httpx\n").unwrap();

    let options = BuildOptions {
        profile: Some(Profile::Fat),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();

    let archive = PackageArchive::open(&outcome.archive_path).unwrap();
    let stored = archive.text(LEDGER_MEMBER).unwrap().unwrap();
    assert_eq!(Ledger::derive(&archive).render(), stored);
    assert_eq!(Ledger::parse(&stored).unwrap(), outcome.ledger);
}

#[test]
fn test_reproducible_with_fixed_epoch() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");

    let options = BuildOptions {
        source_date_epoch: Some(1_700_000_000),
        ..Default::default()
    };
    let a = pkg::build(&agent, &temp.path().join("a"), &options).unwrap();
    let b = pkg::build(&agent, &temp.path().join("b"), &options).unwrap();

    assert_eq!(a.manifest.metadata.created_at, "2023-11-14T22:13:20Z");
    assert_eq!(
        fs::read(&a.archive_path).unwrap(),
        fs::read(&b.archive_path).unwrap()
    );
}

#[test]
fn test_install_extracts_agent_tree() {
    let (temp, ws) = setup();
    let agent = create_agent(temp.path(), "demo");
    fs::create_dir_all(agent.join("prompts")).unwrap();
    fs::write(agent.join("prompts").join("system.txt"), "Be brief.").unwrap();
    fs::create_dir_all(agent.join("__pycache__")).unwrap();
    fs::write(agent.join("__pycache__").join("agent.cpython-312.pyc"), "junk").unwrap();

    let outcome = pkg::build(&agent, &temp.path().join("dist"), &BuildOptions::default()).unwrap();
    let report = pkg::install(&outcome.archive_path, ws.root(), &InstallOptions::default()).unwrap();

    assert_eq!(report.installed_path, ws.agent_dir("demo"));
    assert_eq!(report.files, 2);
    assert!(!report.replaced);
    assert_eq!(report.verification.checksum_entries, Some(3));
    assert_eq!(
        fs::read_to_string(ws.agent_dir("demo").join("prompts").join("system.txt")).unwrap(),
        "Be brief."
    );
    assert!(!ws.agent_dir("demo").join("__pycache__").exists());

    // no staging leftovers
    let entries: Vec<String> = fs::read_dir(ws.agents_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["demo"]);
}

#[test]
fn test_tampered_member_fails_on_its_path() {
    let (temp, ws) = setup();
    let agent = create_agent(temp.path(), "demo");
    fs::write(agent.join("helpers.py"), "X = 1\n").unwrap();

    let outcome = pkg::build(&agent, &temp.path().join("dist"), &BuildOptions::default()).unwrap();
    tamper_member(&outcome.archive_path, "agent/helpers.py", b"X = 2\n");

    let err = pkg::install(&outcome.archive_path, ws.root(), &InstallOptions::default())
        .unwrap_err();
    match &err {
        Error::ChecksumMismatch { path, .. } => assert_eq!(path, "agent/helpers.py"),
        other => panic!("expected checksum mismatch, got {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(!ws.agent_dir("demo").exists());

    // explicitly disabling verification still installs
    let options = InstallOptions {
        verify: Some(false),
        ..Default::default()
    };
    pkg::install(&outcome.archive_path, ws.root(), &options).unwrap();
    assert_eq!(
        fs::read_to_string(ws.agent_dir("demo").join("helpers.py")).unwrap(),
        "X = 2\n"
    );
}

#[test]
fn test_ledgerless_package_installs_unless_required() {
    let (temp, ws) = setup();
    let agent = create_agent(temp.path(), "legacy");

    let outcome = pkg::build(&agent, &temp.path().join("dist"), &BuildOptions::default()).unwrap();
    drop_member(&outcome.archive_path, LEDGER_MEMBER);

    let strict = InstallOptions {
        require_checksums: Some(true),
        ..Default::default()
    };
    let err = pkg::install(&outcome.archive_path, ws.root(), &strict).unwrap_err();
    assert!(matches!(err, Error::LedgerRequired));

    let report = pkg::install(&outcome.archive_path, ws.root(), &InstallOptions::default()).unwrap();
    assert!(!report.verification.checksums_verified());
    assert!(ws.agent_dir("legacy").join("agent.py").is_file());
}

/// A package as earlier l6e tooling wrote it: deflated zip, manifest and
/// `agent/**` only, no ledger or signature.
fn write_legacy_zip(path: &Path) {
    let manifest = "[metadata]\n\
                    name = \"legacy\"\n\
                    version = \"0.1.0\"\n\
                    description = \"Older agent\"\n\
                    package_format_version = \"1.0\"\n\
                    created_at = \"2025-03-01T12:00:00.000000+00:00Z\"\n\
                    \n\
                    [runtime]\n\
                    entrypoint = \"agent.py:Agent\"\n\
                    \n\
                    [agent_config]\n\
                    [agent_config.agent]\n\
                    name = \"legacy\"\n";

    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let members: [(&str, &[u8]); 4] = [
        ("package.toml", manifest.as_bytes()),
        ("agent/agent.py", b"class Agent:\n    pass\n"),
        ("agent/config.toml", b"[agent]\nname = \"legacy\"\n"),
        ("agent/prompts/system.txt", b"Be brief."),
    ];
    for (name, data) in members {
        zip.start_file(name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_legacy_zip_package_inspects_and_installs() {
    let (temp, ws) = setup();
    let package = temp.path().join("legacy-0.1.0.l6e");
    write_legacy_zip(&package);

    let report = pkg::inspect(&package, true).unwrap();
    assert_eq!(report.metadata.name, "legacy");
    assert_eq!(report.metadata.description, "Older agent");
    assert_eq!(report.checksum_entries, None);
    assert!(report.signature.is_none());
    assert!(report.config.unwrap().text.contains("[agent_config.agent]\nname = \"legacy\"\n"));
    assert!(pkg::manifest_bytes(&package).unwrap().starts_with(b"[metadata]\n"));

    let strict = InstallOptions {
        require_checksums: Some(true),
        ..Default::default()
    };
    let err = pkg::install(&package, ws.root(), &strict).unwrap_err();
    assert!(matches!(err, Error::LedgerRequired));
    assert!(!ws.agent_dir("legacy").exists());

    let report = pkg::install(&package, ws.root(), &InstallOptions::default()).unwrap();
    assert!(!report.verification.checksums_verified());
    assert_eq!(report.files, 3);
    assert_eq!(
        fs::read_to_string(ws.agent_dir("legacy").join("prompts").join("system.txt")).unwrap(),
        "Be brief."
    );
}

#[test]
fn test_workspace_config_requires_checksums() {
    let (temp, ws) = setup();
    fs::write(
        ws.root().join("forge.toml"),
        "[workspace]\nname = \"strict\"\n\n[packaging]\nrequire_checksums = true\n",
    )
    .unwrap();
    let agent = create_agent(temp.path(), "legacy");

    let outcome = pkg::build(&agent, &temp.path().join("dist"), &BuildOptions::default()).unwrap();
    drop_member(&outcome.archive_path, LEDGER_MEMBER);

    let err = pkg::install(&outcome.archive_path, ws.root(), &InstallOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::LedgerRequired));
}

#[test]
fn test_signature_roundtrip() {
    let (temp, ws) = setup();
    let agent = create_agent(temp.path(), "signed");
    let key = pkg::keygen(&temp.path().join("keys").join("release"), false).unwrap();
    let other = pkg::keygen(&temp.path().join("keys").join("other"), false).unwrap();

    let options = BuildOptions {
        sign_key: Some(key.private_path.clone()),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();
    assert_eq!(outcome.fingerprint.as_deref(), Some(key.fingerprint.as_str()));

    // embedded public key
    let embedded = VerifyOptions {
        verify_signature: true,
        ..Default::default()
    };
    let report = pkg::verify(&outcome.archive_path, &embedded).unwrap();
    assert!(report.signature_verified);
    assert_eq!(report.fingerprint.as_deref(), Some(key.fingerprint.as_str()));

    // independently supplied copy of the same key
    let external = VerifyOptions {
        verify_signature: true,
        public_key: Some(key.public_path.clone()),
        ..Default::default()
    };
    assert!(pkg::verify(&outcome.archive_path, &external).is_ok());

    // a different key pair
    let wrong = VerifyOptions {
        verify_signature: true,
        public_key: Some(other.public_path.clone()),
        ..Default::default()
    };
    let err = pkg::verify(&outcome.archive_path, &wrong).unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid { ref fingerprint } if *fingerprint == other.fingerprint));

    let install_opts = InstallOptions {
        verify_signature: Some(true),
        public_key: Some(other.public_path.clone()),
        ..Default::default()
    };
    assert!(pkg::install(&outcome.archive_path, ws.root(), &install_opts).is_err());
    assert!(!ws.agent_dir("signed").exists());

    let install_opts = InstallOptions {
        verify_signature: Some(true),
        ..Default::default()
    };
    let report = pkg::install(&outcome.archive_path, ws.root(), &install_opts).unwrap();
    assert!(report.verification.signature_verified);
}

#[test]
fn test_signature_covers_ledger() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "signed");
    let key = pkg::keygen(&temp.path().join("release"), false).unwrap();

    let options = BuildOptions {
        sign_key: Some(key.private_path.clone()),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();

    // re-digesting a tampered file into the ledger breaks the signature
    tamper_member(&outcome.archive_path, "agent/agent.py", b"evil = True\n");
    let archive = PackageArchive::open(&outcome.archive_path).unwrap();
    let forged = Ledger::derive(&archive).render();
    drop(archive);
    tamper_member(&outcome.archive_path, LEDGER_MEMBER, forged.as_bytes());

    let options = VerifyOptions {
        verify_signature: true,
        ..Default::default()
    };
    let err = pkg::verify(&outcome.archive_path, &options).unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid { .. }));
}

#[test]
fn test_signature_verification_requires_members() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "signed");
    let key = pkg::keygen(&temp.path().join("release"), false).unwrap();

    let options = BuildOptions {
        sign_key: Some(key.private_path.clone()),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();
    drop_member(&outcome.archive_path, PUBLIC_KEY_MEMBER);

    let embedded = VerifyOptions {
        verify_signature: true,
        ..Default::default()
    };
    assert!(matches!(
        pkg::verify(&outcome.archive_path, &embedded).unwrap_err(),
        Error::PublicKeyMissing
    ));

    // an external key still works without the embedded one
    let external = VerifyOptions {
        verify_signature: true,
        public_key: Some(key.public_path.clone()),
        key_encoding: KeyEncoding::Base64,
        ..Default::default()
    };
    assert!(pkg::verify(&outcome.archive_path, &external).is_ok());

    drop_member(&outcome.archive_path, SIGNATURE_MEMBER);
    assert!(matches!(
        pkg::verify(&outcome.archive_path, &external).unwrap_err(),
        Error::SignatureMissing(_)
    ));
}

#[test]
fn test_meta_fingerprint_mismatch() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "signed");
    let key = pkg::keygen(&temp.path().join("release"), false).unwrap();

    let options = BuildOptions {
        sign_key: Some(key.private_path.clone()),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();
    tamper_member(
        &outcome.archive_path,
        SIGNATURE_META_MEMBER,
        format!("algo=ed25519\nfpr={}\n", "0".repeat(40)).as_bytes(),
    );

    let options = VerifyOptions {
        verify_signature: true,
        ..Default::default()
    };
    assert!(matches!(
        pkg::verify(&outcome.archive_path, &options).unwrap_err(),
        Error::FingerprintMismatch { .. }
    ));
}

#[test]
fn test_overwrite_policy() {
    let (temp, ws) = setup();
    let agent = create_agent(temp.path(), "demo");

    let v1 = pkg::build(&agent, &temp.path().join("dist"), &versioned("1.0.0")).unwrap();
    pkg::install(&v1.archive_path, ws.root(), &InstallOptions::default()).unwrap();

    // local edits in the installed copy
    let installed = ws.agent_dir("demo");
    fs::write(installed.join("local.txt"), "keep me").unwrap();

    fs::write(agent.join("agent.py"), "class Agent:\n    VERSION = 2\n").unwrap();
    let v2 = pkg::build(&agent, &temp.path().join("dist"), &versioned("2.0.0")).unwrap();

    let err = pkg::install(&v2.archive_path, ws.root(), &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert!(err.to_string().contains("already exists"));
    assert_eq!(fs::read_to_string(installed.join("local.txt")).unwrap(), "keep me");
    assert!(fs::read_to_string(installed.join("agent.py")).unwrap().contains("handle"));

    let options = InstallOptions {
        overwrite: true,
        ..Default::default()
    };
    let report = pkg::install(&v2.archive_path, ws.root(), &options).unwrap();
    assert!(report.replaced);
    assert!(!installed.join("local.txt").exists());
    assert!(fs::read_to_string(installed.join("agent.py")).unwrap().contains("VERSION = 2"));
    assert_eq!(fs::read_dir(ws.agents_dir()).unwrap().count(), 1);
}

#[test]
fn test_missing_entrypoint_is_input_error() {
    let (temp, _ws) = setup();
    let dir = temp.path().join("not-an-agent");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("main.py"), "print()").unwrap();
    let out = temp.path().join("dist");

    let err = pkg::build(&dir, &out, &BuildOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MissingEntrypoint(_)));
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(!out.exists());
}

#[test]
fn test_install_into_non_workspace() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &BuildOptions::default()).unwrap();

    let bare = temp.path().join("bare");
    fs::create_dir_all(&bare).unwrap();
    let err = pkg::install(&outcome.archive_path, &bare, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NotAWorkspace { .. }));
    assert!(err.to_string().contains("forge.toml"));
    assert_eq!(err.kind(), ErrorKind::State);

    fs::write(bare.join("forge.toml"), "").unwrap();
    let err = pkg::install(&outcome.archive_path, &bare, &InstallOptions::default()).unwrap_err();
    assert!(err.to_string().contains("agents/"));
}

#[test]
fn test_profiles_embed_artifacts() {
    let (temp, ws) = setup();
    let agent = create_agent(temp.path(), "stack");
    fs::write(
        agent.join("config.toml"),
        "[memory]\nprovider = \"redis\"\n\n[model]\nprovider = \"ollama\"\n",
    )
    .unwrap();

    let options = BuildOptions {
        profile: Some(Profile::Medium),
        ..Default::default()
    };
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &options).unwrap();

    let report = pkg::inspect(&outcome.archive_path, false).unwrap();
    assert_eq!(report.profile, Some(Profile::Medium));
    assert_eq!(
        report.services,
        Some(vec!["monitor".to_string(), "redis".to_string(), "ollama".to_string()])
    );

    let archive = PackageArchive::open(&outcome.archive_path).unwrap();
    let overlay = archive.text("compose/stack.yaml").unwrap().unwrap();
    assert!(overlay.contains("ollama:"));
    assert!(!archive.contains("artifacts/requirements.txt"));

    // artifacts are verified but not installed into the agent directory
    pkg::install(&outcome.archive_path, ws.root(), &InstallOptions::default()).unwrap();
    assert!(!ws.agent_dir("stack").join("stack.yaml").exists());
    assert!(ws.agent_dir("stack").join("config.toml").is_file());
}

#[test]
fn test_inspect_json_report() {
    let (temp, _ws) = setup();
    let agent = create_agent(temp.path(), "demo");
    let outcome = pkg::build(&agent, &temp.path().join("dist"), &versioned("0.2.0")).unwrap();

    let report = pkg::inspect(&outcome.archive_path, false).unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["metadata"]["version"], "0.2.0");
    assert_eq!(json["checksum_entries"], 2);
    assert!(json["signature"].is_null());
}
