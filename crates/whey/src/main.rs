//! Command line front-end: build sdists, wheels and binary distributions for the
//! project in the current (or given) directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use whey_build_backend::{BuildRequest, BuilderRegistry, BuilderRole};
use whey_metadata::{check_readme_enabled, AcceptAll, Config, ReadmeValidator};

#[derive(Parser)]
#[command(name = "whey", version, about = "Build a wheel for the given project.")]
struct Cli {
    /// The path to the project to build.
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Build a source distribution.
    #[arg(short = 's', long)]
    sdist: bool,

    /// Build a wheel.
    #[arg(short = 'w', long)]
    wheel: bool,

    /// Build a binary distribution.
    #[arg(short = 'b', long)]
    binary: bool,

    /// The output directory.
    #[arg(short = 'o', long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Show the builders which will be used, and exit.
    #[arg(short = 'S', long)]
    show_builders: bool,

    /// Enable verbose output.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show the complete error context on failure.
    #[arg(short = 'T', long, env = "WHEY_TRACEBACK")]
    traceback: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // `RUST_LOG` wins; `-v` raises the default level to debug.
    let default_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli.traceback {
                eprintln!("error: {err:?}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let project_dir = find_project_dir(&cli.project)?;
    let out_dir = cli
        .out_dir
        .clone()
        .unwrap_or_else(|| project_dir.join("dist"));

    let registry = BuilderRegistry::default();
    let config = Config::load(&project_dir).with_context(|| {
        format!("Failed to load {}", project_dir.join("pyproject.toml").display())
    })?;

    // With no artifact selected, build an sdist and a wheel.
    let (sdist, wheel) = if cli.sdist || cli.wheel || cli.binary {
        (cli.sdist, cli.wheel)
    } else {
        (true, true)
    };

    let mut roles = Vec::new();
    if wheel {
        roles.push(BuilderRole::Wheel);
    }
    if sdist {
        roles.push(BuilderRole::Sdist);
    }
    if cli.binary {
        roles.push(BuilderRole::Binary);
    }

    if cli.show_builders || cli.verbose {
        for role in &roles {
            let (name, _) = registry.resolve(*role, &config)?;
            println!("Using {name} to build the {role}");
        }
    }
    if cli.show_builders {
        return Ok(());
    }

    if let Some(readme) = &config.project.readme {
        if check_readme_enabled() {
            if let Err(diagnostics) = AcceptAll.validate(readme) {
                for diagnostic in &diagnostics {
                    tracing::warn!("readme: {}", diagnostic.message);
                }
                anyhow::bail!("The readme failed validation");
            }
        }
    }

    println!("Building {}", project_dir.display());
    for role in roles {
        let filename = registry.build(role, &BuildRequest::new(&project_dir, &out_dir))?;
        match role {
            BuilderRole::Sdist => {
                println!(
                    "Source distribution created at {}",
                    out_dir.join(filename).display()
                );
            }
            _ => println!("Wheel created at {}", out_dir.join(filename).display()),
        }
    }

    Ok(())
}

/// Walk up the tree until a `pyproject.toml` file is found.
fn find_project_dir(start: &Path) -> Result<PathBuf> {
    let start = fs_err::canonicalize(start)?;
    let mut current = start.as_path();
    loop {
        if current.join("pyproject.toml").is_file() {
            return Ok(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => anyhow::bail!(
                "No `pyproject.toml` found in `{}` or any parent directory",
                start.display()
            ),
        }
    }
}
