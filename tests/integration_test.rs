use assert_cmd::Command;
use assert_cmd::cargo;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::Server;
use predicates::prelude::*;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use tar::Builder;
use tempfile::tempdir;
use zip::ZipWriter;
use zip::write::FileOptions;

fn create_tar_gz(path: &Path, files: &[(&str, &str)]) {
    let mut tar_builder = Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_path(name).unwrap();
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder.append(&header, content.as_bytes()).unwrap();
    }
    let tar = tar_builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap();
}

fn create_wheel(path: &Path) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options: FileOptions<()> = FileOptions::default();
    let files = [
        ("spam/__init__.py", ""),
        (
            "spam-1.0.dist-info/METADATA",
            concat!(
                "Metadata-Version: 2.1\n",
                "Name: spam\n",
                "Version: 1.0\n",
                "Summary: Spam in a can\n",
                "License: BSD\n",
                "Classifier: License :: OSI Approved :: MIT License\n",
                "Requires-Dist: six (>=1.10)\n",
                "Requires-Dist: pywin32 ; sys_platform == \"win32\"\n",
                "\n",
                "Spam is a library for frying eggs in the morning.\n",
            ),
        ),
        ("spam-1.0.dist-info/RECORD", "spam/__init__.py,,\n"),
    ];
    for (name, content) in files {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_end_to_end_wheel_offline() {
    let dir = tempdir().unwrap();
    let wheel = dir.path().join("spam-1.0-py3-none-any.whl");
    create_wheel(&wheel);

    Command::new(cargo::cargo_bin!("distmeta"))
        .arg(&wheel)
        .args(["--no-registry", "--no-venv"])
        .assert()
        .success()
        .stdout(predicates::str::contains(r#""target_name": "python3-spam""#))
        .stdout(predicates::str::contains(r#""name": "python3-six""#))
        .stdout(predicates::str::contains(r#""summary": "Spam in a can""#))
        .stdout(predicates::str::contains(r#""license": "BSD""#))
        .stdout(predicates::str::contains("pywin32").not());
}

#[test]
fn test_end_to_end_wheel_with_registry() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/pypi/spam/1.0/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "info": {
                    "summary": "Spam from the registry",
                    "home_page": "https://spam.example",
                    "classifiers": ["License :: OSI Approved :: MIT License"]
                },
                "urls": [{
                    "packagetype": "sdist",
                    "url": "https://files.example/spam-1.0.tar.gz",
                    "digests": {"sha256": "0123abcd"}
                }]
            }"#,
        )
        .create();

    let dir = tempdir().unwrap();
    let wheel = dir.path().join("spam-1.0-py3-none-any.whl");
    create_wheel(&wheel);

    Command::new(cargo::cargo_bin!("distmeta"))
        .arg(&wheel)
        .args(["--no-venv", "--registry-url", &server.url()])
        .assert()
        .success()
        .stdout(predicates::str::contains(r#""checksum": "0123abcd""#))
        .stdout(predicates::str::contains(r#""home_page": "https://spam.example""#))
        .stdout(predicates::str::contains(r#""summary": "Spam from the registry""#))
        .stdout(predicates::str::contains(r#""license": "MIT""#));
}

#[test]
fn test_registry_outage_is_not_fatal() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/pypi/spam/1.0/json")
        .with_status(404)
        .create();

    let dir = tempdir().unwrap();
    let wheel = dir.path().join("spam-1.0-py3-none-any.whl");
    create_wheel(&wheel);

    Command::new(cargo::cargo_bin!("distmeta"))
        .arg(&wheel)
        .args(["--no-venv", "--registry-url", &server.url()])
        .assert()
        .success()
        .stdout(predicates::str::contains(r#""checksum": "TODO:""#));
}

#[test]
fn test_missing_setup_py_exit_code() {
    let dir = tempdir().unwrap();
    let sdist = dir.path().join("spam-1.0.tar.gz");
    create_tar_gz(&sdist, &[("spam-1.0/README.rst", "Spam")]);

    Command::new(cargo::cargo_bin!("distmeta"))
        .arg(&sdist)
        .args(["--no-registry", "--no-venv"])
        .assert()
        .code(3)
        .stderr(predicates::str::contains("setup.py not found"));
}

#[test]
fn test_unsupported_archive_exit_code() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("spam-1.0.rpm");
    std::fs::write(&file, "").unwrap();

    Command::new(cargo::cargo_bin!("distmeta"))
        .arg(&file)
        .args(["--name", "spam", "--pkg-version", "1.0", "--no-registry", "--no-venv"])
        .assert()
        .code(2);
}
