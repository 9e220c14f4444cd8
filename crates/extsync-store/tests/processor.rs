//! End-to-end tests for the extract → identify → reconcile pass.

use std::io::{Cursor, Write};
use std::path::Path;

use extsync_store::{Processor, MANIFEST_FILE};
use zip::write::SimpleFileOptions;

/// Build an in-memory package archive carrying a `package.json` descriptor.
fn package_bytes(name: &str, publisher: &str, version: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let descriptor = format!(
        r#"{{"name": "{name}", "publisher": "{publisher}", "version": "{version}"}}"#
    );
    writer
        .start_file("extension/package.json", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(descriptor.as_bytes()).unwrap();
    writer
        .start_file("extension/main.js", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"module.exports = {};").unwrap();
    writer.finish().unwrap().into_inner()
}

fn write_package(path: &Path, name: &str, publisher: &str, version: &str) {
    std::fs::write(path, package_bytes(name, publisher, version)).unwrap();
}

/// Build a bundle zip embedding the given (entry name, bytes) pairs.
fn write_bundle(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

fn manifest_text(target: &Path) -> String {
    std::fs::read_to_string(target.join(MANIFEST_FILE)).unwrap()
}

#[test]
fn new_packages_are_installed_and_recorded() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    write_package(&source.path().join("alpha.vsix"), "alpha", "acme", "1.0.0");

    let stats = Processor::new(source.path(), target.path()).unwrap().run().unwrap();

    assert_eq!(stats.added.len(), 1);
    assert!(stats.updated.is_empty());
    assert!(stats.unchanged.is_empty());
    assert_eq!(stats.added[0].install_path, "acme.alpha");

    assert!(target.path().join("alpha.vsix").exists());
    let manifest = manifest_text(target.path());
    let line = manifest.lines().next().unwrap();
    let fields: Vec<&str> = line.splitn(5, ':').collect();
    assert_eq!(fields[0].len(), 64);
    assert_eq!(fields[1], "acme.alpha");
    assert_eq!(fields[2], "1.0.0");
    assert_eq!(fields[3], "vsix");
    assert_eq!(fields[4], "alpha.vsix");
}

#[test]
fn bundles_are_extracted_skipping_platform_noise() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();

    let alpha = package_bytes("alpha", "acme", "1.0.0");
    let beta = package_bytes("beta", "acme", "2.1.0");
    write_bundle(
        &source.path().join("build_pipeline12_job34_branch-main.zip"),
        &[
            ("out/alpha.vsix", alpha.as_slice()),
            ("out/nested/beta.carts", beta.as_slice()),
            ("__MACOSX/._alpha.vsix", b"resource fork".as_slice()),
            ("out/readme.txt", b"notes".as_slice()),
        ],
    );

    let stats = Processor::new(source.path(), target.path()).unwrap().run().unwrap();

    assert_eq!(stats.added.len(), 2);
    assert_eq!(stats.found_files.get("zip"), Some(&1));
    assert_eq!(
        stats
            .extracted_files
            .get("build_pipeline12_job34_branch-main.zip"),
        Some(&2)
    );
    assert!(target.path().join("alpha.vsix").exists());
    assert!(target.path().join("beta.carts").exists());

    let manifest = manifest_text(target.path());
    assert!(manifest.contains(":carts:beta.carts"));
    assert!(manifest.contains(":vsix:alpha.vsix"));
}

#[test]
fn version_bump_supersedes_the_old_file() {
    let source_v1 = tempfile::tempdir().unwrap();
    let source_v2 = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();

    write_package(&source_v1.path().join("alpha-1.0.vsix"), "alpha", "acme", "1.0.0");
    Processor::new(source_v1.path(), target.path()).unwrap().run().unwrap();

    write_package(&source_v2.path().join("alpha-1.1.vsix"), "alpha", "acme", "1.1.0");
    let stats = Processor::new(source_v2.path(), target.path()).unwrap().run().unwrap();

    assert_eq!(stats.updated.len(), 1);
    assert!(stats.added.is_empty());
    let (old, new) = &stats.updated[0];
    assert_eq!(old.version, "1.0.0");
    assert_eq!(new.version, "1.1.0");

    assert!(!target.path().join("alpha-1.0.vsix").exists());
    assert!(target.path().join("alpha-1.1.vsix").exists());

    let manifest = manifest_text(target.path());
    let lines: Vec<&str> = manifest.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("acme.alpha:1.1.0"));
}

#[test]
fn rerunning_the_same_source_is_a_fixed_point() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    write_package(&source.path().join("alpha.vsix"), "alpha", "acme", "1.0.0");
    write_package(&source.path().join("beta.carts"), "beta", "acme", "0.3.0");

    let first = Processor::new(source.path(), target.path()).unwrap().run().unwrap();
    assert_eq!(first.added.len(), 2);
    let manifest_after_first = manifest_text(target.path());

    let second = Processor::new(source.path(), target.path()).unwrap().run().unwrap();
    assert!(second.added.is_empty());
    assert!(second.updated.is_empty());
    assert_eq!(second.unchanged.len(), 2);

    assert_eq!(manifest_text(target.path()), manifest_after_first);
    assert!(target.path().join("alpha.vsix").exists());
    assert!(target.path().join("beta.carts").exists());
}

#[test]
fn empty_source_leaves_prior_state_untouched() {
    let seed = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    write_package(&seed.path().join("alpha.vsix"), "alpha", "acme", "1.0.0");
    Processor::new(seed.path(), target.path()).unwrap().run().unwrap();
    let before = manifest_text(target.path());

    let empty = tempfile::tempdir().unwrap();
    let stats = Processor::new(empty.path(), target.path()).unwrap().run().unwrap();

    assert!(stats.added.is_empty());
    assert!(stats.updated.is_empty());
    assert!(stats.unchanged.is_empty());
    assert_eq!(manifest_text(target.path()), before);
}

#[test]
fn candidates_without_a_descriptor_are_skipped() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();

    write_package(&source.path().join("good.vsix"), "good", "acme", "1.0.0");
    // A zip with no package.json entry.
    write_bundle(&source.path().join("bare.vsix"), &[("readme.md", b"hi".as_slice())]);
    // Not a zip at all.
    std::fs::write(source.path().join("broken.carts"), b"not a zip").unwrap();

    let stats = Processor::new(source.path(), target.path()).unwrap().run().unwrap();

    assert_eq!(stats.added.len(), 1);
    assert_eq!(stats.added[0].install_path, "acme.good");
    assert!(!target.path().join("bare.vsix").exists());
    assert!(!target.path().join("broken.carts").exists());
}

#[test]
fn duplicate_identity_within_a_run_keeps_one_record() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    write_package(&source.path().join("one.vsix"), "alpha", "acme", "1.0.0");
    write_package(&source.path().join("two.vsix"), "alpha", "acme", "1.1.0");

    let stats = Processor::new(source.path(), target.path()).unwrap().run().unwrap();

    assert_eq!(stats.added.len(), 1);
    let manifest = manifest_text(target.path());
    let identity_lines = manifest
        .lines()
        .filter(|l| l.contains(":acme.alpha:"))
        .count();
    assert_eq!(identity_lines, 1);
}

#[test]
fn provenance_from_conventional_filenames_reaches_the_record() {
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    write_package(
        &source.path().join("alpha_pipeline7_job9_branch-main.vsix"),
        "alpha",
        "acme",
        "1.0.0",
    );

    let stats = Processor::new(source.path(), target.path()).unwrap().run().unwrap();

    let artifact = stats.added[0].artifact.as_ref().unwrap();
    assert_eq!(artifact.pipeline_id, 7);
    assert_eq!(artifact.job_id, 9);
    assert_eq!(artifact.branch, "main");
}
