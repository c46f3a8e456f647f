use catalog::artifacts::ArtifactError;
use catalog::errors::{ErrorKind, LookupError, PublishError};
use catalog::publisher::{BuildReport, DownloadData};
use catalog::types::Channel;
use catalog::{Catalog, CatalogError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod observability;

use config::{Config, ConfigError};
use observability::ObservabilityError;

#[derive(Parser)]
#[command(name = "archivist", version, about = "Publish builds and resolve their downloads")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "archivist.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new build and print it as JSON
    Publish(PublishArgs),
    /// Fetch a download into the cache and print where it is
    Resolve {
        project: String,
        version: String,
        build: u32,
        file: String,
        /// Also copy the artifact to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Mark a build as promoted
    Promote {
        project: String,
        version: String,
        build: u32,
        /// Clear the flag instead of setting it
        #[arg(long)]
        unset: bool,
    },
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// Read the whole build report from a JSON file
    #[arg(long, conflicts_with_all = ["project", "family", "version", "build", "commit"])]
    report: Option<PathBuf>,

    #[arg(long, required_unless_present = "report")]
    project: Option<String>,
    /// Display name used if the project is created, defaults to the project
    #[arg(long)]
    project_name: Option<String>,
    /// `owner/name` repository used if the project is created
    #[arg(long)]
    repository: Option<String>,
    #[arg(long, required_unless_present = "report")]
    family: Option<String>,
    #[arg(long, required_unless_present = "report")]
    version: Option<String>,
    #[arg(long, required_unless_present = "report")]
    build: Option<u32>,
    #[arg(long, required_unless_present = "report")]
    commit: Option<String>,
    #[arg(long)]
    channel: Option<Channel>,
    /// Attached file as `<id>:<file name>:<sha256>`, may be repeated
    #[arg(long = "download", value_parser = parse_download)]
    downloads: Vec<DownloadData>,
}

fn parse_download(value: &str) -> Result<DownloadData, String> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(name), Some(sha256))
            if !id.is_empty() && !name.is_empty() && !sha256.is_empty() =>
        {
            Ok(DownloadData {
                id: id.into(),
                name: name.into(),
                sha256: sha256.into(),
            })
        }
        _ => Err(format!("expected <id>:<file name>:<sha256>, got '{value}'")),
    }
}

impl PublishArgs {
    fn into_report(self) -> Result<BuildReport, CliError> {
        if let Some(path) = self.report {
            let data = std::fs::read(&path)?;
            return Ok(serde_json::from_slice(&data)?);
        }

        let project = self.project.ok_or(CliError::MissingArgument("project"))?;
        Ok(BuildReport {
            project_name: self.project_name.unwrap_or_else(|| project.clone()),
            project,
            repository: self.repository,
            family: self.family.ok_or(CliError::MissingArgument("family"))?,
            version: self.version.ok_or(CliError::MissingArgument("version"))?,
            build: self.build.ok_or(CliError::MissingArgument("build"))?,
            commit: self.commit.ok_or(CliError::MissingArgument("commit"))?,
            channel: self.channel,
            downloads: self.downloads,
        })
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("missing argument: --{0}")]
    MissingArgument(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        let kind = match self {
            CliError::Publish(e) => e.kind(),
            CliError::Lookup(e) => e.kind(),
            CliError::Artifact(e) => e.kind(),
            CliError::MissingArgument(_) | CliError::Json(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        };
        match kind {
            ErrorKind::Internal => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::InvalidInput => 3,
            ErrorKind::Upstream => 4,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::from_file(&cli.config)?;
    let _guard = observability::init(&config.common)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(cli.command, config))
}

async fn run_async(command: Command, config: Config) -> Result<(), CliError> {
    let catalog = Catalog::new(&config.catalog)?;

    match command {
        Command::Publish(args) => {
            let build = catalog.publish(args.into_report()?).await?;
            println!("{}", serde_json::to_string_pretty(&build)?);
        }
        Command::Resolve {
            project,
            version,
            build,
            file,
            output,
        } => {
            let target = catalog
                .find_download(&project, &version, build, &file)
                .await?;
            let resolved = catalog.resolve(&target).await?;
            if let Some(output) = output {
                tokio::fs::copy(&resolved.path, &output).await?;
            }
            let summary = serde_json::json!({
                "path": resolved.path,
                "size": resolved.len,
                "last_modified": resolved.last_modified,
                "sha256": target.download.sha256,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Promote {
            project,
            version,
            build,
            unset,
        } => {
            let build = catalog.promote(&project, &version, build, !unset).await?;
            println!("{}", serde_json::to_string_pretty(&build)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn publish_from_arguments() {
        let cli = Cli::try_parse_from([
            "archivist",
            "publish",
            "--project",
            "paper",
            "--family",
            "1.21",
            "--version",
            "1.21.4",
            "--build",
            "12",
            "--commit",
            "abcd",
            "--channel",
            "experimental",
            "--download",
            "application:paper-1.21.4-12.jar:ffff",
        ])
        .unwrap();
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        let report = args.into_report().unwrap();

        assert_eq!(report.project_name, "paper");
        assert_eq!(report.build, 12);
        assert_eq!(report.channel, Some(Channel::Experimental));
        assert_eq!(
            report.downloads,
            [DownloadData {
                id: "application".into(),
                name: "paper-1.21.4-12.jar".into(),
                sha256: "ffff".into(),
            }]
        );
    }

    #[test]
    fn publish_from_report_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"project": "paper", "project_name": "Paper", "family": "1.21",
                "version": "1.21.4", "build": 3, "commit": "abcd", "downloads": []}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "archivist",
            "publish",
            "--report",
            tmp.path().to_str().unwrap(),
        ])
        .unwrap();
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        let report = args.into_report().unwrap();
        assert_eq!(report.project_name, "Paper");
        assert_eq!(report.build, 3);
    }

    #[test]
    fn publish_requires_report_or_fields() {
        assert!(Cli::try_parse_from(["archivist", "publish", "--project", "paper"]).is_err());
        assert!(
            Cli::try_parse_from(["archivist", "publish", "--report", "r.json", "--build", "1"])
                .is_err()
        );
    }

    #[test]
    fn download_argument() {
        assert!(parse_download("application:app.jar").is_err());
        assert!(parse_download(":app.jar:ffff").is_err());
        assert_eq!(parse_download("a:b:c:d").unwrap().sha256, "c:d");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(CliError::Lookup(LookupError::BuildNotFound).exit_code(), 2);
        assert_eq!(CliError::MissingArgument("build").exit_code(), 3);
        assert_eq!(
            CliError::Artifact(ArtifactError::Unavailable { failures: vec![] }).exit_code(),
            4
        );
    }
}
