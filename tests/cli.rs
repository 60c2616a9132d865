// tests/cli.rs
//
// Runs the ferrous-lastz binary against a stand-in lastz script.

#![cfg(unix)]

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const BINARY: &str = env!("CARGO_BIN_EXE_ferrous-lastz");

// Stand-in for lastz: prints a banner for -v, copies the target to stdout,
// and complains on stderr when the target mentions "poison".
const FAKE_LASTZ: &str = r#"#!/bin/sh
if [ "$1" = "-v" ]; then
    echo "lastz -- fake build"
    echo "version 1.04.15 released 20220322"
    exit 0
fi
if grep -q poison "$1"; then
    echo "error: bad seed" >&2
    exit 0
fi
cat "$1"
"#;

fn write_fake_lastz(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join("lastz");
    fs::write(&path, FAKE_LASTZ)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn create_fasta_file(dir: &Path, name: &str, content: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content.as_bytes())?;
    Ok(path)
}

fn align(dir: &Path, reference: &Path, extra: &[&str]) -> io::Result<Output> {
    let lastz = write_fake_lastz(dir)?;
    let reads = create_fasta_file(dir, "reads.fa", ">read1\nACGT\n")?;
    let tmp = dir.join("tmp");
    fs::create_dir_all(&tmp)?;

    Command::new(BINARY)
        .arg("align")
        .arg("--input1")
        .arg(reference)
        .arg("--input2")
        .arg(&reads)
        .arg("--output")
        .arg(dir.join("merged.out"))
        .arg("--lastz")
        .arg(&lastz)
        .arg("--tmp-dir")
        .arg(&tmp)
        .args(["--threads", "2", "--throttle-ms", "0"])
        .args(extra)
        .output()
}

fn temp_files_left(dir: &Path) -> usize {
    fs::read_dir(dir.join("tmp"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[test]
fn test_align_merges_one_output_per_record() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let reference = create_fasta_file(
        dir.path(),
        "ref.fa",
        ">chr1\nAAAA\n>chr2\nCCCC\n>chr3\nGGGG\n",
    )?;

    let output = align(
        dir.path(),
        &reference,
        &["--ref-sequences", "3", "--merge-order", "submission"],
    )?;
    assert!(output.status.success(), "align failed: {output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("version 1.04.15"));

    let merged = fs::read_to_string(dir.path().join("merged.out"))?;
    assert_eq!(merged, ">chr1\nAAAA\n>chr2\nCCCC\n>chr3\nGGGG\n");
    assert_eq!(temp_files_left(dir.path()), 0);
    Ok(())
}

#[test]
fn test_align_fails_on_diagnostic_output() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let reference = create_fasta_file(
        dir.path(),
        "ref.fa",
        ">chr1\nAAAA\n>chr2 poison\nCCCC\n>chr3\nGGGG\n>chr4\nTTTT\n",
    )?;

    let output = align(dir.path(), &reference, &["--ref-sequences", "4"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: bad seed"), "stderr: {stderr}");
    assert_eq!(temp_files_left(dir.path()), 0);
    Ok(())
}

#[test]
fn test_align_requires_reference_metadata() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let reference = create_fasta_file(dir.path(), "ref.fa", ">chr1\nAAAA\n")?;

    let output = align(dir.path(), &reference, &["--ref-sequences", "0"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing metadata"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn test_align_rejects_sequence_count_mismatch() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let reference = create_fasta_file(dir.path(), "ref.fa", ">chr1\nAAAA\n>chr2\nCCCC\n")?;

    let output = align(dir.path(), &reference, &["--ref-sequences", "5"])?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("expected 5 work items"), "stderr: {stderr}");
    assert_eq!(temp_files_left(dir.path()), 0);
    Ok(())
}

#[test]
fn test_version_subcommand() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let lastz = write_fake_lastz(dir.path())?;

    let output = Command::new(BINARY)
        .arg("version")
        .arg("--lastz")
        .arg(&lastz)
        .output()?;
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "version 1.04.15 released 20220322"
    );

    let missing = Command::new(BINARY)
        .args(["version", "--lastz", "/nonexistent/lastz"])
        .output()?;
    assert_eq!(
        String::from_utf8_lossy(&missing.stdout).trim(),
        "Could not determine Lastz version"
    );
    Ok(())
}
