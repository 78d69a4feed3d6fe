//! feedkit - command-line client for the feed backend.

mod app;
mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use feed_config_and_utils::{init_logging, Config, Paths, DEFAULT_LOG_LEVEL};

/// Feed client command-line interface.
#[derive(Parser)]
#[command(name = "feedkit")]
#[command(about = "Browse and write to the feed from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "FEEDKIT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to $FEEDKIT_HOME or ~/.feedkit
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

/// Account used for commands that need a session.
#[derive(Args, Debug, Clone, Default)]
pub struct Credentials {
    #[arg(long, env = "FEEDKIT_EMAIL")]
    pub email: Option<String>,

    #[arg(long, env = "FEEDKIT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the companion service
    Health,
    /// Sign in with email and password
    SignIn {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Create an account
    SignUp {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the signed-in user's server-side profile
    Profile {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Page through a collection, newest first
    Feed {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long, default_value = "posts")]
        collection: String,
        #[arg(long)]
        page_size: Option<usize>,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Show one post
    Post {
        id: String,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Publish a post
    Publish {
        title: String,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Print a document every time it changes
    Watch {
        path: String,
        #[command(flatten)]
        credentials: Credentials,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = Paths::resolve(cli.base_dir)?;
    init_logging(
        cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
        Some(paths.log_file()),
    );

    let config = Config::load(&paths)?;
    let app = app::App::build(config)?;

    match cli.command {
        Commands::Health => commands::health(&app).await,
        Commands::SignIn { credentials } => commands::sign_in(&app, &credentials).await,
        Commands::SignUp {
            credentials,
            username,
            name,
        } => commands::sign_up(&app, &credentials, username, name).await,
        Commands::Profile { credentials } => commands::profile(&app, &credentials).await,
        Commands::Feed {
            credentials,
            collection,
            page_size,
            pages,
        } => commands::feed(&app, &credentials, &collection, page_size, pages).await,
        Commands::Post { id, credentials } => commands::post(&app, &credentials, &id).await,
        Commands::Publish { title, credentials } => {
            commands::publish(&app, &credentials, &title).await
        }
        Commands::Watch {
            path,
            credentials,
            seconds,
        } => commands::watch(&app, &credentials, &path, seconds).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_feed() {
        let cli = Cli::try_parse_from([
            "feedkit",
            "--log-level",
            "debug",
            "feed",
            "--page-size",
            "4",
            "--pages",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Feed {
                collection,
                page_size,
                pages,
                ..
            } => {
                assert_eq!(collection, "posts");
                assert_eq!(page_size, Some(4));
                assert_eq!(pages, 2);
            }
            _ => panic!("expected feed"),
        }
    }

    #[test]
    fn test_cli_parses_watch_defaults() {
        let cli = Cli::try_parse_from(["feedkit", "watch", "users/u1"]).unwrap();
        match cli.command {
            Commands::Watch { path, seconds, .. } => {
                assert_eq!(path, "users/u1");
                assert_eq!(seconds, 30);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_base_dir_is_global() {
        let cli = Cli::try_parse_from(["feedkit", "health", "--base-dir", "/tmp/fk"]).unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/fk")));
    }
}
