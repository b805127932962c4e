//! Schema Store CLI
//!
//! Inspect and populate a schema store or remote registry.

use anyhow::Context;
use clap::{Parser, Subcommand};
use schema_store::{Settings, Subject, SubjectConfig, SubjectDirectory};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-store")]
#[command(about = "Manage subjects and schemas in a schema store")]
struct Cli {
    /// Settings file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store connection string or registry URL (overrides settings)
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List subjects
    Subjects,

    /// Create a subject
    Create {
        subject: String,
        /// Validator names stored in the subject config
        #[arg(long, value_delimiter = ',')]
        validators: Vec<String>,
    },

    /// Register a schema file under a subject
    Register {
        subject: String,
        file: PathBuf,
        /// Only register if this id is still the latest ("none" for an empty subject)
        #[arg(long)]
        if_latest: Option<String>,
    },

    /// Find an entry by id or by schema content
    Lookup {
        subject: String,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        id: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the latest entry of a subject
    Latest { subject: String },

    /// Show every entry of a subject, oldest first
    Entries { subject: String },

    /// Check the backend is reachable
    Check,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let mut settings = Settings::load_from(config_path.as_deref())?;
    if let Some(url) = cli.url {
        settings.backend.url = url;
    }
    // one-shot commands only touch the subject they name
    settings.directory.preload_subjects = false;

    let directory = SubjectDirectory::from_settings(&settings).await?;

    match cli.command {
        Commands::Subjects => {
            for name in directory.subject_names().await? {
                println!("{}", name);
            }
        }

        Commands::Create { subject, validators } => {
            let config = if validators.is_empty() {
                SubjectConfig::new()
            } else {
                SubjectConfig::with_validators(validators)
            };
            let handle = directory.register_subject(&subject, &config).await?;
            println!("{}", handle.name());
            print!("{}", handle.config().await?.to_properties());
        }

        Commands::Register { subject, file, if_latest } => {
            let schema = read_schema(&file)?;
            let handle = directory
                .get_or_create_subject(&subject, &SubjectConfig::new())
                .await?;

            let entry = match if_latest {
                None => Some(handle.register(&schema).await?),
                Some(expected) => {
                    let expected = if expected == "none" {
                        None
                    } else {
                        Some(
                            handle
                                .lookup_by_id(&expected)
                                .await?
                                .with_context(|| format!("no entry {} in {}", expected, subject))?,
                        )
                    };
                    handle.register_if_latest(&schema, expected.as_ref()).await?
                }
            };

            match entry {
                Some(entry) => println!("{}", entry.id()),
                None => {
                    eprintln!("Not registered: latest of {} has moved", subject);
                    std::process::exit(2);
                }
            }
        }

        Commands::Lookup { subject, id, file } => {
            let handle = directory
                .lookup_subject(&subject)
                .await?
                .with_context(|| format!("subject {} not found", subject))?;

            let entry = match (id, file) {
                (Some(id), _) => handle.lookup_by_id(&id).await?,
                (None, Some(file)) => handle.lookup_by_schema(&read_schema(&file)?).await?,
                (None, None) => None,
            };
            match entry {
                Some(entry) => println!("{}", entry),
                None => {
                    eprintln!("Not found");
                    std::process::exit(1);
                }
            }
        }

        Commands::Latest { subject } => {
            let handle = directory
                .lookup_subject(&subject)
                .await?
                .with_context(|| format!("subject {} not found", subject))?;
            match handle.latest().await? {
                Some(entry) => println!("{}", entry),
                None => println!("(no versions)"),
            }
        }

        Commands::Entries { subject } => {
            let handle = directory
                .lookup_subject(&subject)
                .await?
                .with_context(|| format!("subject {} not found", subject))?;
            for entry in handle.all_entries().await? {
                println!("{}", entry);
            }
        }

        Commands::Check => {
            directory.backend().health_check().await?;
            println!("✅ {} is reachable", settings.backend.url);
        }
    }

    Ok(())
}

fn read_schema(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
