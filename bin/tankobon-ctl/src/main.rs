//! Tankobon CTL - Operator command line interface
//!
//! Runs catalog, list and review operations directly against the local
//! storage root. Ids are trusted as given.

mod services;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use services::Services;
use std::path::{Path, PathBuf};
use tankobon_common::{
    Adaptation, ChapterNumber, Config, ContentId, ContentItem, ListName, Locale, Team, TeamId,
    User, UserId,
};
use tankobon_ingest::ChapterUpload;
use tankobon_store::DocumentStore;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tankobon-ctl")]
#[command(about = "Tankobon operator CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/tankobon/tankobon.toml")]
    config: PathBuf,

    /// Storage root directory
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Public base URL for page and preview links
    #[arg(long)]
    public_host: Option<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a chapter archive
    Ingest {
        content: String,
        team: String,
        volume: u32,
        chapter: String,
        /// Chapter title
        #[arg(short, long)]
        name: String,
        /// Zip archive of page images
        #[arg(short, long)]
        archive: PathBuf,
        /// Anime adaptation season
        #[arg(long, requires = "series")]
        season: Option<u32>,
        /// Anime adaptation series
        #[arg(long, requires = "season")]
        series: Option<u32>,
    },
    /// Print the page URLs of a chapter
    Chapter {
        content: String,
        team: String,
        volume: u32,
        chapter: String,
    },
    /// List the chapters of a volume
    Chapters {
        content: String,
        team: String,
        volume: u32,
    },
    /// List the volumes and translators of a content item
    Volumes { content: String },
    /// List operations
    Lists {
        #[command(subcommand)]
        action: ListCommands,
    },
    /// Audit a user's lists against the list index
    Reconcile {
        user: String,
        /// Rewrite the user's lists to match the index
        #[arg(long)]
        repair: bool,
    },
    /// Review operations
    Reviews {
        #[command(subcommand)]
        action: ReviewCommands,
    },
    /// Create catalog entries for local testing
    Seed {
        #[command(subcommand)]
        action: SeedCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ListCommands {
    /// Put a content item into a list, moving it from any other
    Move {
        user: String,
        content: String,
        /// reading, abandoned or planned
        list: String,
    },
    /// Take a content item out of its list
    Remove { user: String, content: String },
    /// Show one page of a list
    Show {
        user: String,
        list: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        count: Option<usize>,
        /// Include names, descriptions and preview URLs
        #[arg(long)]
        extended: bool,
        #[arg(long, default_value = "en")]
        locale: String,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewCommands {
    /// Show the oldest reviews of a content item
    List {
        content: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Review a content item
    Submit {
        content: String,
        user: String,
        score: u8,
    },
    /// Withdraw a review
    Retract { content: String, user: String },
}

#[derive(Subcommand, Debug)]
enum SeedCommands {
    /// Create a content item
    Content {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "en")]
        locale: String,
    },
    /// Create a team
    Team {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: String,
    },
    /// Create a user
    User {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

/// File, then `TANKOBON__*` environment, then command line flags
fn load_config(args: &Args) -> Result<Config> {
    let mut config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.as_path()).required(false))
        .add_source(
            config::Environment::with_prefix("TANKOBON")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ingest.allowed_extensions"),
        )
        .build()
        .with_context(|| format!("loading configuration from {}", args.config.display()))?
        .try_deserialize()?;

    if let Some(root) = &args.storage_root {
        config.storage.root.clone_from(root);
    }
    if let Some(host) = &args.public_host {
        config.public.host.clone_from(host);
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }

    config.validate()?;
    Ok(config)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Copy the archive into the temp area; the processor owns the copy
async fn stage_upload(services: &Services, archive: &Path) -> Result<PathBuf> {
    let artifact = services.layout.temp_upload_path();
    tokio::fs::copy(archive, &artifact)
        .await
        .with_context(|| format!("staging {}", archive.display()))?;
    debug!("Staged {} as {}", archive.display(), artifact.display());
    Ok(artifact)
}

async fn run(services: &Services, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest {
            content,
            team,
            volume,
            chapter,
            name,
            archive,
            season,
            series,
        } => {
            let chapter: ChapterNumber = chapter.parse()?;
            let artifact = stage_upload(services, &archive).await?;
            let upload = ChapterUpload {
                content: ContentId::new(content),
                team: TeamId::new(team),
                volume,
                chapter,
                name,
                adaptation: season
                    .zip(series)
                    .map(|(season, series)| Adaptation { season, series }),
                artifact,
            };
            print_json(&services.ingest.ingest(upload).await?)
        }
        Commands::Chapter {
            content,
            team,
            volume,
            chapter,
        } => {
            let content = ContentId::new(content);
            let view = services
                .reader
                .chapter(&content, &TeamId::new(team), volume, chapter.parse()?)
                .await?;
            services.views.record_view(&content);
            print_json(&view)
        }
        Commands::Chapters {
            content,
            team,
            volume,
        } => print_json(
            &services
                .reader
                .chapters(&ContentId::new(content), &TeamId::new(team), volume)
                .await?,
        ),
        Commands::Volumes { content } => {
            let content = ContentId::new(content);
            let volumes = services.reader.volumes(&content).await?;
            let translators = services.reader.translators(&content).await?;
            print_json(&serde_json::json!({
                "volumes": volumes,
                "translators": translators,
            }))
        }
        Commands::Lists { action } => run_lists(services, action).await,
        Commands::Reconcile { user, repair } => {
            let user = UserId::new(user);
            let report = if repair {
                services.reconciler.repair(&user).await?
            } else {
                services.reconciler.audit(&user).await?
            };
            print_json(&report)
        }
        Commands::Reviews { action } => run_reviews(services, action).await,
        Commands::Seed { action } => run_seed(services, action).await,
    }
}

async fn run_lists(services: &Services, action: ListCommands) -> Result<()> {
    match action {
        ListCommands::Move {
            user,
            content,
            list,
        } => {
            let list: ListName = list.parse()?;
            services
                .lists
                .move_to_list(&UserId::new(user), &ContentId::new(content), list)
                .await?;
            print_json(&serde_json::json!({ "list": list }))
        }
        ListCommands::Remove { user, content } => {
            let list = services
                .lists
                .remove_from_lists(&UserId::new(user), &ContentId::new(content))
                .await?;
            print_json(&serde_json::json!({ "removed_from": list }))
        }
        ListCommands::Show {
            user,
            list,
            offset,
            count,
            extended,
            locale,
        } => {
            let (user, list) = (UserId::new(user), list.parse::<ListName>()?);
            if extended {
                let locale: Locale = locale.parse()?;
                print_json(
                    &services
                        .lists
                        .list_extended(&user, list, offset, count, locale)
                        .await?,
                )
            } else {
                print_json(&services.lists.list(&user, list, offset, count).await?)
            }
        }
    }
}

async fn run_reviews(services: &Services, action: ReviewCommands) -> Result<()> {
    match action {
        ReviewCommands::List { content, limit } => print_json(
            &services
                .reviews
                .reviews()
                .list_reviews(&ContentId::new(content), limit)
                .await?,
        ),
        ReviewCommands::Submit {
            content,
            user,
            score,
        } => print_json(
            &services
                .reviews
                .submit(&ContentId::new(content), &UserId::new(user), score)
                .await?,
        ),
        ReviewCommands::Retract { content, user } => print_json(
            &services
                .reviews
                .retract(&ContentId::new(content), &UserId::new(user))
                .await?,
        ),
    }
}

async fn run_seed(services: &Services, action: SeedCommands) -> Result<()> {
    match action {
        SeedCommands::Content {
            id,
            name,
            description,
            locale,
        } => {
            let item = ContentItem::new(ContentId::new(id), locale.parse()?, name, description);
            services.docs.insert(&item).await?;
            info!("Created content item {}", item.id);
        }
        SeedCommands::Team { id, name, owner } => {
            let team = Team::new(TeamId::new(id), name, UserId::new(owner));
            services.docs.insert(&team).await?;
            info!("Created team {}", team.id);
        }
        SeedCommands::User { id, name, email } => {
            let user = User::new(UserId::new(id), name, email);
            services.docs.insert(&user).await?;
            info!("Created user {}", user.id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let services = Services::open(&config)?;
    let result = run(&services, args.command).await;
    services.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("storage");
        let args = parse(&[
            "tankobon-ctl",
            "--config",
            dir.path().join("missing.toml").to_str().unwrap(),
            "--storage-root",
            root.to_str().unwrap(),
            "--log-level",
            "debug",
            "volumes",
            "c1",
        ]);

        let config = load_config(&args).unwrap();
        assert_eq!(config.storage.root, root);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.lists.default_page_size, 10);
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tankobon.toml");
        std::fs::write(
            &path,
            "[public]\nhost = \"https://cdn.example.org\"\n\n[cache]\nresolver_ttl_secs = 30\n",
        )
        .unwrap();

        let args = parse(&["tankobon-ctl", "--config", path.to_str().unwrap(), "volumes", "c1"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.public.host, "https://cdn.example.org");
        assert_eq!(config.cache.resolver_ttl_secs, 30);
        assert_eq!(config.cache.review_idle_ttl_secs, 60);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tankobon.toml");
        std::fs::write(&path, "[cache]\nsweep_interval_secs = 0\n").unwrap();

        let args = parse(&["tankobon-ctl", "--config", path.to_str().unwrap(), "volumes", "c1"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_adaptation_needs_both_flags() {
        let result = Args::try_parse_from([
            "tankobon-ctl",
            "ingest",
            "c1",
            "t1",
            "1",
            "1",
            "--name",
            "One",
            "--archive",
            "ch1.zip",
            "--season",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_seed_ingest_and_read() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().join("storage");
        let services = Services::open(&config).unwrap();

        run_seed(
            &services,
            SeedCommands::Content {
                id: "c1".to_string(),
                name: "Name".to_string(),
                description: String::new(),
                locale: "en".to_string(),
            },
        )
        .await
        .unwrap();
        run_seed(
            &services,
            SeedCommands::Team {
                id: "t1".to_string(),
                name: "Scanlators".to_string(),
                owner: "u1".to_string(),
            },
        )
        .await
        .unwrap();

        let archive = dir.path().join("ch1.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        let err = run(
            &services,
            Commands::Ingest {
                content: "c1".to_string(),
                team: "t1".to_string(),
                volume: 1,
                chapter: "1".to_string(),
                name: "One".to_string(),
                archive,
                season: None,
                series: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("invalid archive"));

        // The staged copy is discarded on rejection
        let staged = std::fs::read_dir(services.layout.temp_dir()).unwrap().count();
        assert_eq!(staged, 0);
        services.shutdown().await;
    }
}
