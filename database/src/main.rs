#![forbid(unsafe_code)]

use std::path::PathBuf;

use brunan_core::{
    db::{Db, IndexManager},
    env,
    init_logging,
    migrations::{DEFAULT_BACKUP_PATH, remove_non_movies, titles_to_map},
    services::UserService
};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "brunan-database", about = "Database maintenance for brunan")]
struct Cli {
    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand)]
enum Command {
    /// Create the index set
    Indexes {
        /// Drop and recreate indexes that already exist
        #[arg(long)]
        reset: bool
    },
    /// Drop every index except _id_
    DeleteIndexes,
    /// Create the admin user from SUPERUSER_* variables
    Superuser,
    /// One-off data migrations
    Migrate {
        #[command(subcommand)]
        migration: Migration
    }
}

#[derive(Subcommand)]
enum Migration {
    /// Convert array shaped group titles into maps keyed by title id
    TitlesToMap,
    /// Back up, then delete, every title that is not a movie
    RemoveNonMovies {
        #[arg(long, default_value = DEFAULT_BACKUP_PATH)]
        backup: PathBuf
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or(default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    init_logging();

    let cli = Cli::parse();

    let env = env();

    let db = Db::connect(&env.mongo_url, &env.mongo_db, true).await?;

    info!(database = db.name(), "connected");

    match cli.command {
        Command::Indexes { reset } => {
            let report = IndexManager::new(db).create(reset).await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::DeleteIndexes => {
            let dropped = IndexManager::new(db).delete_all().await?;

            info!(count = dropped.len(), "indexes dropped");
            println!("{}", serde_json::to_string_pretty(&dropped)?);
        }
        Command::Superuser => {
            let username = var_or("SUPERUSER_USERNAME", "admin");
            let password = var_or("SUPERUSER_PASSWORD", "admin");
            let email = std::env::var("SUPERUSER_EMAIL")
                .ok()
                .filter(|email| !email.is_empty());

            match UserService::new(db)
                .create_superuser(&username, email.as_deref(), &password)
                .await?
            {
                Some(user) => info!(user_id = %user.id, username, "superuser created"),
                None => info!(username, "superuser already exists")
            }
        }
        Command::Migrate { migration } => match migration {
            Migration::TitlesToMap => {
                let report = titles_to_map(&db).await?;

                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Migration::RemoveNonMovies { backup } => {
                let report = remove_non_movies(&db, &backup).await?;

                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    Ok(())
}
