use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use indoc::{formatdoc, indoc};
use insta::assert_snapshot;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use whey_metadata::Config;

use super::*;
use crate::registry::BuilderRole;
use crate::source_dist::write_source_dist;
use crate::wheel::{wheel_info, write_wheel};

const TIMESTAMP: i64 = 1_580_000_000;

/// A minimal buildable project: `[project]` table plus `spam/__init__.py`.
fn make_project(dir: &Path, payload: &str) {
    fs_err::write(
        dir.join("pyproject.toml"),
        formatdoc! {r#"
            [project]
            name = "spam"
            version = "1.0"
            {payload}
        "#},
    )
    .unwrap();
    fs_err::create_dir_all(dir.join("spam")).unwrap();
    fs_err::write(dir.join("spam/__init__.py"), "print('hello world')\n").unwrap();
}

fn build_wheel_at(dir: &Path, out: &Path) -> String {
    let config = Config::load(dir).unwrap();
    let filename = write_wheel(
        dir,
        out,
        &config,
        ArchiveTimestamp::from_seconds(TIMESTAMP),
    )
    .unwrap();
    filename.to_string()
}

fn build_sdist_at(dir: &Path, out: &Path) -> String {
    let config = Config::load(dir).unwrap();
    let filename = write_source_dist(
        dir,
        out,
        &config,
        ArchiveTimestamp::from_seconds(TIMESTAMP),
    )
    .unwrap();
    filename.to_string()
}

fn zip_names(wheel: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(fs_err::File::open(wheel).unwrap()).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

fn zip_file(wheel: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(fs_err::File::open(wheel).unwrap()).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    contents
}

fn tar_names(sdist: &Path) -> Vec<String> {
    let decoder = flate2::read::GzDecoder::new(fs_err::File::open(sdist).unwrap());
    let mut archive = tar::Archive::new(decoder);
    let mut names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[test]
fn test_wheel_info() {
    assert_snapshot!(wheel_info(), @r"
    Wheel-Version: 1.0
    Generator: whey 0.1.0
    Root-Is-Purelib: true
    Tag: py3-none-any
    ");
}

#[test]
fn test_record() {
    let record = vec![RecordEntry {
        path: "spam/__init__.py".to_string(),
        hash: "ifhpblOjAGGsXDgM5kLUTXLegKiizDQNnp662ASDd4Y".to_string(),
        size: 20,
    }];

    let mut writer = Vec::new();
    write_record(&mut writer, "spam-1.0.dist-info", record).unwrap();
    assert_snapshot!(String::from_utf8(writer).unwrap(), @r"
    spam/__init__.py,sha256=ifhpblOjAGGsXDgM5kLUTXLegKiizDQNnp662ASDd4Y,20
    spam-1.0.dist-info/RECORD,,
    ");
}

/// Boundary scenario: the minimum viable metadata still produces a complete wheel.
#[test]
fn minimum_metadata() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");
    let out = TempDir::new().unwrap();

    let filename = build_wheel_at(project.path(), out.path());
    assert_eq!(filename, "spam-1.0-py3-none-any.whl");

    let wheel = out.path().join(&filename);
    assert_snapshot!(zip_names(&wheel).join("\n"), @r"
    spam-1.0.dist-info/
    spam-1.0.dist-info/METADATA
    spam-1.0.dist-info/RECORD
    spam-1.0.dist-info/WHEEL
    spam/
    spam/__init__.py
    ");

    assert_snapshot!(zip_file(&wheel, "spam-1.0.dist-info/METADATA"), @r"
    Metadata-Version: 2.2
    Name: spam
    Version: 1.0
    ");
    assert_snapshot!(zip_file(&wheel, "spam-1.0.dist-info/WHEEL"), @r"
    Wheel-Version: 1.0
    Generator: whey 0.1.0
    Root-Is-Purelib: true
    Tag: py3-none-any
    ");
}

/// Every non-RECORD row in RECORD must name a file in the archive with a matching
/// SHA-256 and size; RECORD's own row carries neither.
#[test]
fn record_round_trip() {
    let project = TempDir::new().unwrap();
    make_project(
        project.path(),
        indoc! {r#"
            [project.scripts]
            spam = "spam:main"
        "#},
    );
    let out = TempDir::new().unwrap();

    let filename = build_wheel_at(project.path(), out.path());
    let wheel = out.path().join(&filename);
    let record = zip_file(&wheel, "spam-1.0.dist-info/RECORD");

    let mut rows = 0;
    for line in record.lines() {
        let (path, rest) = line.split_once(',').unwrap();
        if path == "spam-1.0.dist-info/RECORD" {
            assert_eq!(rest, ",");
            continue;
        }
        let (hash, size) = rest.split_once(',').unwrap();
        let contents = zip_file(&wheel, path);
        let digest = URL_SAFE_NO_PAD.encode(Sha256::new().chain_update(&contents).finalize());
        assert_eq!(hash, format!("sha256={digest}"), "{path}");
        assert_eq!(size, contents.len().to_string(), "{path}");
        rows += 1;
    }
    // METADATA, WHEEL, entry_points.txt and the module itself.
    assert_eq!(rows, 4);
    assert!(record.contains("entry_points.txt"));
}

/// The sdist always carries `PKG-INFO` and `pyproject.toml` under the versioned top
/// level.
#[test]
fn sdist_layout() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");
    let out = TempDir::new().unwrap();

    let filename = build_sdist_at(project.path(), out.path());
    assert_eq!(filename, "spam-1.0.tar.gz");

    assert_snapshot!(tar_names(&out.path().join(&filename)).join("\n"), @r"
    spam-1.0/PKG-INFO
    spam-1.0/pyproject.toml
    spam-1.0/spam/
    spam-1.0/spam/__init__.py
    ");
}

/// Boundary scenario: `include` composes with a later `recursive-exclude`.
#[test]
fn manifest_compose() {
    let project = TempDir::new().unwrap();
    make_project(
        project.path(),
        indoc! {r#"
            [tool.whey]
            additional-files = [
                "include spam/data/*.txt",
                "recursive-exclude spam/data tmp_*",
            ]
        "#},
    );
    fs_err::create_dir_all(project.path().join("spam/data")).unwrap();
    for name in ["a.txt", "b.txt", "tmp_x.txt"] {
        fs_err::write(project.path().join("spam/data").join(name), name).unwrap();
    }

    let config = Config::load(project.path()).unwrap();
    let files = select_files(project.path(), &config.whey).unwrap();
    let paths: Vec<&str> = files
        .iter()
        .map(|entry| entry.archive_path.as_str())
        .collect();
    assert_eq!(
        paths,
        ["spam/__init__.py", "spam/data/a.txt", "spam/data/b.txt"]
    );
}

/// Boundary scenario: type-hint markers and stubs survive even a catch-all exclude.
#[test]
fn py_typed_retention() {
    let project = TempDir::new().unwrap();
    make_project(
        project.path(),
        indoc! {r#"
            [tool.whey]
            additional-files = ["recursive-exclude spam *"]
        "#},
    );
    fs_err::write(project.path().join("spam/py.typed"), "").unwrap();
    fs_err::write(project.path().join("spam/foo.pyi"), "def foo() -> int: ...\n").unwrap();

    let config = Config::load(project.path()).unwrap();
    let files = select_files(project.path(), &config.whey).unwrap();
    let paths: Vec<&str> = files
        .iter()
        .map(|entry| entry.archive_path.as_str())
        .collect();
    assert_eq!(paths, ["spam/foo.pyi", "spam/py.typed"]);
}

/// An include directive that matches nothing is a configuration error.
#[test]
fn include_matches_nothing() {
    let project = TempDir::new().unwrap();
    make_project(
        project.path(),
        indoc! {r#"
            [tool.whey]
            additional-files = ["include docs/*.rst"]
        "#},
    );

    let config = Config::load(project.path()).unwrap();
    let err = select_files(project.path(), &config.whey).unwrap_err();
    assert_snapshot!(
        err.to_string(),
        @"`include docs/*.rst` in `tool.whey.additional-files` matched no files"
    );
}

/// Default excludes drop bytecode caches from the seed walk.
#[test]
fn default_excludes() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");
    fs_err::create_dir_all(project.path().join("spam/__pycache__")).unwrap();
    fs_err::write(project.path().join("spam/__pycache__/x.pyc"), "x").unwrap();
    fs_err::write(project.path().join("spam/stale.pyc"), "x").unwrap();
    fs_err::write(project.path().join("spam/editor.py~"), "x").unwrap();

    let config = Config::load(project.path()).unwrap();
    let files = select_files(project.path(), &config.whey).unwrap();
    let paths: Vec<&str> = files
        .iter()
        .map(|entry| entry.archive_path.as_str())
        .collect();
    assert_eq!(paths, ["spam/__init__.py"]);
}

/// An src layout strips the source directory from wheel paths but keeps it in the
/// sdist.
#[test]
fn src_layout() {
    let project = TempDir::new().unwrap();
    fs_err::write(
        project.path().join("pyproject.toml"),
        indoc! {r#"
            [project]
            name = "spam"
            version = "1.0"

            [tool.whey]
            source-dir = "src"
        "#},
    )
    .unwrap();
    fs_err::create_dir_all(project.path().join("src/spam")).unwrap();
    fs_err::write(project.path().join("src/spam/__init__.py"), "").unwrap();

    let out = TempDir::new().unwrap();
    let wheel = out.path().join(build_wheel_at(project.path(), out.path()));
    assert!(zip_names(&wheel).contains(&"spam/__init__.py".to_string()));

    let sdist = out.path().join(build_sdist_at(project.path(), out.path()));
    assert!(tar_names(&sdist).contains(&"spam-1.0/src/spam/__init__.py".to_string()));
}

/// Boundary scenario: the editable wheel redirects instead of embedding the package.
#[test]
fn editable_wheel() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");
    let out = TempDir::new().unwrap();

    let filename = crate::editable::build_editable(&BuildRequest::new(
        project.path(),
        out.path(),
    ))
    .unwrap();
    assert_eq!(filename, "spam-1.0-py3-none-any.whl");

    let wheel = out.path().join(&filename);
    let names = zip_names(&wheel);
    assert!(names.contains(&"spam.pth".to_string()));
    assert!(!names.iter().any(|name| name == "spam/__init__.py"));

    let pth = zip_file(&wheel, "spam.pth");
    let expected = std::path::absolute(project.path()).unwrap();
    assert_eq!(pth.trim_end(), expected.to_str().unwrap());

    // The redirector and the dist-info files are all RECORD covers.
    let record = zip_file(&wheel, "spam-1.0.dist-info/RECORD");
    for line in record.lines() {
        let path = line.split(',').next().unwrap();
        assert!(
            path == "spam.pth" || path.starts_with("spam-1.0.dist-info/"),
            "{path}"
        );
    }
}

/// Two builds over identical inputs with an identical timestamp are byte-identical,
/// regardless of filesystem mtimes.
#[test]
fn determinism() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");

    let out1 = TempDir::new().unwrap();
    let wheel1 = build_wheel_at(project.path(), out1.path());
    let sdist1 = build_sdist_at(project.path(), out1.path());

    // Touch a file to check that filesystem modification times don't leak through.
    fs_err::write(project.path().join("spam/__init__.py"), "print('hello world')\n").unwrap();

    let out2 = TempDir::new().unwrap();
    let wheel2 = build_wheel_at(project.path(), out2.path());
    let sdist2 = build_sdist_at(project.path(), out2.path());

    assert_eq!(wheel1, wheel2);
    assert_eq!(
        fs_err::read(out1.path().join(&wheel1)).unwrap(),
        fs_err::read(out2.path().join(&wheel2)).unwrap()
    );
    assert_eq!(
        fs_err::read(out1.path().join(&sdist1)).unwrap(),
        fs_err::read(out2.path().join(&sdist2)).unwrap()
    );
}

/// Snapshot all files from the prepare metadata hook, then verify the RECORD hashes.
#[test]
fn test_prepare_metadata() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");
    let metadata_dir = TempDir::new().unwrap();

    let dist_info = prepare_metadata_for_build_wheel(project.path(), metadata_dir.path()).unwrap();
    assert_eq!(dist_info, "spam-1.0.dist-info");

    let mut files: Vec<String> = walkdir::WalkDir::new(metadata_dir.path())
        .into_iter()
        .map(|entry| {
            crate::file_selection::portable_path(
                entry.unwrap().path(),
                metadata_dir.path(),
            )
            .unwrap()
        })
        .filter(|path| !path.is_empty())
        .collect();
    files.sort();
    assert_snapshot!(files.join("\n"), @r"
    spam-1.0.dist-info
    spam-1.0.dist-info/METADATA
    spam-1.0.dist-info/RECORD
    spam-1.0.dist-info/WHEEL
    ");

    let record =
        fs_err::read_to_string(metadata_dir.path().join("spam-1.0.dist-info/RECORD")).unwrap();
    for line in record.lines() {
        let mut columns = line.split(',');
        let path = columns.next().unwrap();
        let hash = columns.next().unwrap();
        if path == "spam-1.0.dist-info/RECORD" {
            assert_eq!(hash, "");
            continue;
        }
        let contents = fs_err::read(metadata_dir.path().join(path)).unwrap();
        let digest = URL_SAFE_NO_PAD.encode(Sha256::new().chain_update(&contents).finalize());
        assert_eq!(hash, format!("sha256={digest}"), "{path}");
    }
}

/// A wheel build after prepare-metadata cross-checks the metadata directory.
#[test]
fn inconsistent_metadata_directory() {
    let project = TempDir::new().unwrap();
    make_project(project.path(), "");
    let metadata_dir = TempDir::new().unwrap();
    prepare_metadata_for_build_wheel(project.path(), metadata_dir.path()).unwrap();

    // Changing the project between the two steps must be detected.
    fs_err::write(
        project.path().join("pyproject.toml"),
        indoc! {r#"
            [project]
            name = "spam"
            version = "1.0"
            description = "Changed between prepare and build"
        "#},
    )
    .unwrap();

    let out = TempDir::new().unwrap();
    let err = BuilderRegistry::default()
        .build(
            BuilderRole::Wheel,
            &BuildRequest::new(project.path(), out.path())
                .with_metadata_directory(Some(metadata_dir.path())),
        )
        .unwrap_err();
    assert_snapshot!(
        err.to_string(),
        @"Inconsistent metadata between prepare and build step: `METADATA`"
    );
}

/// A failed build leaves no partial archive in the output directory.
#[test]
fn no_partial_output() {
    let project = TempDir::new().unwrap();
    make_project(
        project.path(),
        indoc! {r#"
            [tool.whey]
            additional-files = ["include missing/*.dat"]
        "#},
    );
    let out = TempDir::new().unwrap();

    let config = Config::load(project.path()).unwrap();
    write_wheel(
        project.path(),
        out.path(),
        &config,
        ArchiveTimestamp::from_seconds(TIMESTAMP),
    )
    .unwrap_err();

    let leftovers: Vec<_> = fs_err::read_dir(out.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}
