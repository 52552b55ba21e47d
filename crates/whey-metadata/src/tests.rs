use std::iter;
use std::path::Path;

use indoc::{formatdoc, indoc};
use insta::assert_snapshot;
use tempfile::TempDir;

use crate::core_metadata::entry_points_txt;
use crate::{Config, CoreMetadata};

fn extend_project(payload: &str) -> String {
    formatdoc! {r#"
        [project]
        name = "hello-world"
        version = "0.1.0"
        {payload}
    "#
    }
}

fn format_err(err: impl std::error::Error) -> String {
    let mut formatted = err.to_string();
    for source in iter::successors(err.source(), |&err| err.source()) {
        formatted += &format!("\n  Caused by: {source}");
    }
    formatted
}

/// A configuration that doesn't read any files can use a non-existing root.
fn config_from(contents: &str) -> Result<Config, crate::Error> {
    Config::from_toml(contents, Path::new("/do/not/read"))
}

#[test]
fn valid() {
    let temp_dir = TempDir::new().unwrap();

    fs_err::write(
        temp_dir.path().join("README.md"),
        indoc! {r"
            # Foo

            This is the foo library.
        "},
    )
    .unwrap();
    fs_err::write(temp_dir.path().join("LICENSE"), "Permission is granted …\n").unwrap();

    let contents = indoc! {r#"
        [project]
        name = "hello-world"
        version = "0.1.0"
        description = "A Python package"
        readme = "README.md"
        requires-python = ">=3.8"
        license = { file = "LICENSE" }
        authors = [{ name = "Ferris the crab", email = "ferris@rustacean.net" }]
        maintainers = [{ name = "Konsti" }]
        keywords = ["demo", "example", "package"]
        classifiers = [
            "Development Status :: 6 - Mature",
            "Programming Language :: Python",
        ]
        dependencies = ["flask>=3,<4", "sqlalchemy[asyncio]>=2.0.35,<3"]

        [project.optional-dependencies]
        postgres = ["psycopg>=3.2.2,<4"]
        mysql = ["pymysql>=1.1.1,<2"]

        [project.urls]
        "Homepage" = "https://github.com/whey-rs/whey"
        "Repository" = "https://whey.rs"

        [project.scripts]
        foo = "foo.cli:__main__"

        [project.gui-scripts]
        foo-gui = "foo.gui"

        [project.entry-points.bar_group]
        foo-bar = "foo:bar"

        [tool.whey]
        license-key = "MIT"
        platforms = ["Linux"]
    "#};

    let config = Config::from_toml(contents, temp_dir.path()).unwrap();
    let metadata = CoreMetadata::from_project(&config.project, &config.whey);

    assert_snapshot!(metadata.core_metadata_format(), @r###"
    Metadata-Version: 2.2
    Name: hello-world
    Version: 0.1.0
    Platform: Linux
    Summary: A Python package
    Keywords: demo,example,package
    Home-page: https://github.com/whey-rs/whey
    Author-email: Ferris the crab <ferris@rustacean.net>
    License: MIT
    Classifier: Development Status :: 6 - Mature
    Classifier: Programming Language :: Python
    Requires-Dist: flask>=3,<4
    Requires-Dist: sqlalchemy[asyncio]>=2.0.35,<3
    Requires-Dist: psycopg>=3.2.2,<4; extra == "postgres"
    Requires-Dist: pymysql>=1.1.1,<2; extra == "mysql"
    Maintainer: Konsti
    Requires-Python: >=3.8
    Project-URL: Repository, https://whey.rs
    Provides-Extra: postgres
    Provides-Extra: mysql
    Description-Content-Type: text/markdown

    # Foo

    This is the foo library.
    "###);

    assert_snapshot!(entry_points_txt(&config.project).unwrap().unwrap(), @r###"
    [console_scripts]
    foo = foo.cli:__main__

    [gui_scripts]
    foo-gui = foo.gui

    [bar_group]
    foo-bar = foo:bar

    "###);
}

#[test]
fn minimal() {
    let config = config_from(&extend_project("")).unwrap();
    let metadata = CoreMetadata::from_project(&config.project, &config.whey);

    assert_snapshot!(metadata.core_metadata_format(), @r###"
    Metadata-Version: 2.2
    Name: hello-world
    Version: 0.1.0
    "###);
}

/// Every declared field must be recoverable from the emitted document.
#[test]
fn metadata_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    fs_err::write(
        temp_dir.path().join("README.md"),
        "# Foo\n\nThis is the foo library.\n",
    )
    .unwrap();

    let contents = extend_project(indoc! {r#"
        description = "A Python package"
        readme = "README.md"
        requires-python = ">=3.8"
        keywords = ["demo", "example"]
        classifiers = ["Development Status :: 6 - Mature"]
        dependencies = ["flask>=3,<4"]

        [project.optional-dependencies]
        postgres = ["psycopg>=3.2.2,<4"]

        [project.urls]
        "Homepage" = "https://github.com/whey-rs/whey"
        "Repository" = "https://whey.rs"
    "#});

    let config = Config::from_toml(&contents, temp_dir.path()).unwrap();
    let metadata = CoreMetadata::from_project(&config.project, &config.whey);
    let parsed = CoreMetadata::parse(&metadata.core_metadata_format()).unwrap();
    assert_eq!(metadata, parsed);
}

#[test]
fn dynamic_classifiers() {
    let contents = indoc! {r#"
        [project]
        name = "spam"
        version = "2020.0.0"
        dynamic = ["classifiers"]

        [tool.whey]
        license-key = "MIT"
        python-versions = ["3.8", "3.9"]
        platforms = ["Linux"]
    "#};

    let config = config_from(contents).unwrap();
    let metadata = CoreMetadata::from_project(&config.project, &config.whey);

    assert_snapshot!(metadata.core_metadata_format(), @r###"
    Metadata-Version: 2.2
    Name: spam
    Version: 2020.0.0
    Platform: Linux
    License: MIT
    Classifier: License :: OSI Approved :: MIT License
    Classifier: Operating System :: POSIX :: Linux
    Classifier: Programming Language :: Python :: 3 :: Only
    Classifier: Programming Language :: Python :: 3.8
    Classifier: Programming Language :: Python :: 3.9
    Dynamic: classifiers
    "###);
}

#[test]
fn dynamic_requires_python() {
    let contents = indoc! {r#"
        [project]
        name = "spam"
        version = "2020.0.0"
        dynamic = ["requires-python"]

        [tool.whey]
        python-versions = ["3.7", "3.8"]
    "#};

    let config = config_from(contents).unwrap();
    assert_eq!(
        config.project.requires_python.as_ref().unwrap().to_string(),
        ">=3.7"
    );
    let metadata = CoreMetadata::from_project(&config.project, &config.whey);
    assert!(metadata
        .core_metadata_format()
        .contains("Requires-Python: >=3.7"));
}

#[test]
fn dynamic_dependencies_are_empty() {
    let contents = indoc! {r#"
        [project]
        name = "spam"
        version = "2020.0.0"
        dynamic = ["dependencies"]
    "#};

    let config = config_from(contents).unwrap();
    assert!(config.project.dependencies.is_empty());
}

#[test]
fn dynamic_and_declared() {
    let contents = extend_project(indoc! {r#"
        classifiers = ["Development Status :: 6 - Mature"]
        dynamic = ["classifiers"]
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: `classifiers` was listed in `project.dynamic` but a value was given
    "###);
}

#[test]
fn dynamic_version_rejected() {
    let contents = extend_project(indoc! {r#"
        dynamic = ["version"]
    "#});

    let err = config_from(&contents).unwrap_err();
    assert!(
        format_err(err).contains("unknown variant `version`"),
        "the dynamic gate must reject `version`"
    );
}

#[test]
fn unknown_project_key() {
    let contents = extend_project(indoc! {r#"
        homepage = "https://whey.rs"
    "#});

    let err = config_from(&contents).unwrap_err();
    assert!(format_err(err).contains("unknown field `homepage`"));
}

#[test]
fn multiline_description() {
    let contents = extend_project(indoc! {r#"
        description = "Hi :)\nThis is my project"
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: `project.description` must be a single line
    "###);
}

#[test]
fn readme_file_and_text() {
    let contents = extend_project(indoc! {r##"
        readme = { file = "README.md", text = "# Foo", content-type = "text/markdown" }
    "##});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: The `project.readme.file` and `project.readme.text` keys are mutually exclusive; remove one of the two.
    "###);
}

#[test]
fn readme_text_without_content_type() {
    let contents = extend_project(indoc! {r##"
        readme = { text = "# Foo" }
    "##});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: The `project.readme.content-type` key must be provided when `project.readme.text` is given.
    "###);
}

#[test]
fn readme_unknown_extension() {
    let contents = extend_project(indoc! {r#"
        readme = "README.xyz"
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: Unknown readme extension `xyz`, can't determine the content type. Use a supported extension (`.md`, `.rst`, `.txt`) or set `project.readme.content-type`.
    "###);
}

#[test]
fn license_file_and_text() {
    let contents = extend_project(indoc! {r#"
        license = { file = "LICENSE", text = "MIT" }
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: The `project.license.file` and `project.license.text` keys are mutually exclusive; remove one of the two.
    "###);
}

#[test]
fn license_empty_table() {
    let contents = extend_project(indoc! {r"
        license = { }
    "});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: The `project.license` table must contain one of `file` or `text`.
    "###);
}

#[test]
fn contact_name_with_commas() {
    let contents = extend_project(indoc! {r#"
        authors = [{ name = "Davis-Foster, Dominic" }]
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: The `project.authors[0].name` key cannot contain commas
    "###);
}

#[test]
fn unknown_classifier() {
    let contents = extend_project(indoc! {r#"
        classifiers = ["Made :: Up :: Classifier"]
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: Unknown trove classifier in `project.classifiers`: `Made :: Up :: Classifier`
    "###);
}

#[test]
fn invalid_extra_name() {
    let contents = extend_project(indoc! {r#"
        [project.optional-dependencies]
        "bad extra!" = []
    "#});

    let err = config_from(&contents).unwrap_err();
    assert!(format_err(err).contains("Not a valid package or extra name"));
}

#[test]
fn reserved_entry_point_group() {
    let contents = extend_project(indoc! {r#"
        [project.entry-points.console_scripts]
        foo = "bar"
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: Use `project.scripts` instead of `project.entry-points.console_scripts`
    "###);
}

#[test]
fn invalid_entry_point_group() {
    let contents = extend_project(indoc! {r#"
        [project.entry-points."a@b"]
        foo = "bar"
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: Entry point groups must consist of letters and numbers separated by dots, invalid group: `a@b`
    "###);
}

#[test]
fn python_2_rejected() {
    let contents = extend_project(indoc! {r#"
        [tool.whey]
        python-versions = ["2.7"]
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: Invalid value for `tool.whey.python-versions[0]`: whey only supports Python 3-only projects
    "###);
}

#[test]
fn package_defaults_to_underscored_name() {
    let config = config_from(&extend_project("")).unwrap();
    assert_eq!(config.whey.package, "hello_world");
    assert_eq!(config.whey.source_dir, Path::new("."));
}

#[test]
fn package_in_namespace() {
    let contents = extend_project(indoc! {r#"
        [tool.whey]
        package = "hello/world"
    "#});

    let config = config_from(&contents).unwrap();
    assert_eq!(config.whey.package, "hello/world");
}

#[test]
fn package_not_an_identifier() {
    let contents = extend_project(indoc! {r#"
        [tool.whey]
        package = "spam-bar"
    "#});

    let err = config_from(&contents).unwrap_err();
    assert_snapshot!(format_err(err), @r###"
    Invalid pyproject.toml
      Caused by: Invalid value for `tool.whey.package`: Invalid character `-` at position 5 for identifier `spam-bar`, expected an underscore or an alphanumeric character
    "###);
}

#[test]
fn missing_readme_file() {
    let contents = extend_project(indoc! {r#"
        readme = "README.md"
    "#});

    let err = config_from(&contents).unwrap_err();
    // Simplified for windows compatibility.
    assert!(err.to_string().replace('\\', "/").contains("README.md"));
}
