use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use distmeta::config::Settings;
use distmeta::naming::DistroNameConvertor;
use distmeta::platform::Platform;
use distmeta::registry::{PyPiClient, RegistryClient};
use distmeta::sandbox::{SandboxMode, SubprocessRunner};
use distmeta::{Collaborators, ExtractError, ExtractRequest, extract, guess_name_version};
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// distmeta - Python distribution metadata resolver
///
/// Reads a source distribution or wheel, runs its build descriptor in a
/// sandbox when needed, enriches the result from PyPI and a throwaway
/// virtualenv, and prints the resolved record as JSON.
///
/// Examples:
///   distmeta spam-1.0.tar.gz
///   distmeta --no-venv spam-1.0-py3-none-any.whl
#[derive(Parser, Debug)]
#[command(author, version = env!("DISTMETA_VERSION"), about)]
struct Cli {
    /// Archive to inspect (.tar.gz, .tgz, .zip or .whl)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Package name (guessed from the file name by default)
    #[arg(long, short = 'n')]
    name: Option<String>,

    /// Package version (guessed from the file name by default)
    #[arg(long = "pkg-version", value_name = "VERSION")]
    pkg_version: Option<String>,

    /// Distribution package name, instead of the python<version>-<name> convention
    #[arg(long = "target-name", value_name = "NAME")]
    target_name: Option<String>,

    /// Do not query the package registry
    #[arg(long = "no-registry")]
    no_registry: bool,

    /// Do not install into a throwaway virtualenv
    #[arg(long = "no-venv")]
    no_venv: bool,

    /// Base Python major version
    #[arg(long = "python-version", value_name = "VERSION")]
    python_version: Option<String>,

    /// Registry base URL (defaults to https://pypi.org; also via DISTMETA_PYPI_URL)
    #[arg(long = "registry-url", value_name = "URL")]
    registry_url: Option<String>,

    /// Python interpreter (defaults to python3; also via DISTMETA_PYTHON)
    #[arg(long = "python", value_name = "PATH")]
    python: Option<String>,

    /// Timeout in seconds for each subprocess or network call
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Run setup.py with the caller's environment instead of a cleared one
    #[arg(long = "inherit-env")]
    inherit_env: bool,

    /// More output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(python) = &self.python {
            settings.python_interpreter = python.clone();
        }
        if let Some(url) = &self.registry_url {
            settings.registry_url = url.clone();
        }
        if let Some(secs) = self.timeout {
            settings.timeout_secs = secs;
        }
        settings
    }

    fn name_and_version(&self) -> Result<(String, String)> {
        if let (Some(name), Some(version)) = (&self.name, &self.pkg_version) {
            return Ok((name.clone(), version.clone()));
        }
        let (name, version) = guess_name_version(&self.file).with_context(|| {
            format!(
                "Cannot guess name and version from {:?}, pass --name and --pkg-version",
                self.file
            )
        })?;
        Ok((
            self.name.clone().unwrap_or(name),
            self.pkg_version.clone().unwrap_or(version),
        ))
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings();
    let (name, version) = cli.name_and_version()?;
    debug!("Resolving {} {} from {:?}", name, version, cli.file);

    let registry: Option<Arc<dyn RegistryClient>> = if cli.no_registry {
        None
    } else {
        Some(Arc::new(PyPiClient::new(
            settings.http_client()?,
            &settings.registry_url,
        )))
    };
    let mode = if cli.inherit_env {
        SandboxMode::Inherited
    } else {
        SandboxMode::Isolated
    };
    let python_version = cli
        .python_version
        .clone()
        .unwrap_or_else(|| settings.default_python_version.clone());

    let deps = Collaborators {
        convertor: Arc::new(DistroNameConvertor),
        registry,
        runner: Arc::new(SubprocessRunner::from_settings(&settings, mode)),
        settings,
        platform: Platform::detect(),
    };
    let request = ExtractRequest {
        target_name: cli.target_name,
        enable_registry_overlay: !cli.no_registry,
        enable_env_overlay: !cli.no_venv,
        ..ExtractRequest::new(cli.file, name, version, python_version)
    };

    let record = extract(request, deps).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ExtractError>() {
            Some(fatal) => {
                eprintln!("Error: {} stage failed: {}", fatal.stage(), fatal);
                ExitCode::from(fatal.exit_code())
            }
            None => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}
