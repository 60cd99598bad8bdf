//! CLI entry and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shiori_core::config;
use shiori_core::session::{Navigator, SessionClient, SessionCookies, SessionSettings};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(name = "shiori")]
#[command(version)]
#[command(about = "Shiori travel booklet API client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter (e.g. warn, debug, shiori_core=trace)
    #[arg(long, global = true, env = "SHIORI_LOG", default_value = "warn")]
    log_level: String,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Send an authenticated request to an API endpoint
    Request {
        /// Endpoint path (e.g. /api/itineraries)
        endpoint: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Extra header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Manage itineraries
    Itineraries {
        #[command(subcommand)]
        command: ItineraryCommands,
    },

    /// Sign in and save the session cookies
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password (read from stdin when omitted)
        #[arg(long, env = "SHIORI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Show the signed-in user
    Whoami,

    /// End the current session
    Logout,

    /// Show where the web front end routes a path
    Route {
        /// Requested path (e.g. /)
        path: String,

        /// Treat the request as carrying a session cookie
        #[arg(long)]
        session: bool,

        /// User-Agent of the request
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ItineraryCommands {
    /// List itineraries
    List,
    /// Show one itinerary
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Delete an itinerary
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Create a default config file
    Init,
    /// Set the API base URL
    SetBaseUrl {
        #[arg(value_name = "URL")]
        url: String,
    },
}

/// Terminal stand-in for browser navigation: redirects become a sign-in hint.
struct TerminalNavigator {
    base_url: String,
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        "/".to_string()
    }

    fn redirect(&self, path: &str) {
        eprintln!("Session expired. Sign in again at {}{path}", self.base_url);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Session client whose cookies are loaded from and saved to `SHIORI_HOME`.
struct Session {
    client: SessionClient,
    cookies: Arc<SessionCookies>,
    cookies_path: PathBuf,
}

impl Session {
    fn open(config: &config::Config) -> Result<Self> {
        let settings = SessionSettings::from_config(config).context("resolve API settings")?;
        tracing::debug!(base_url = %settings.base_url, "using API");

        let cookies_path = config::paths::cookies_path();
        let cookies = Arc::new(SessionCookies::load(&cookies_path)?);
        let navigator = Arc::new(TerminalNavigator {
            base_url: settings.base_url.clone(),
        });
        let client = SessionClient::with_cookies(settings, navigator, Arc::clone(&cookies))
            .context("build HTTP client")?;

        Ok(Self {
            client,
            cookies,
            cookies_path,
        })
    }

    /// Saves the cookies (a refresh may have rotated them even when the
    /// command failed), then hands back the command's result.
    fn close(self, result: Result<()>) -> Result<()> {
        let saved = self.cookies.save(&self.cookies_path);
        result?;
        saved
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    match cli.command {
        Commands::Request {
            endpoint,
            method,
            headers,
            data,
        } => {
            let session = Session::open(&config)?;
            let result =
                commands::request::run(&session.client, &endpoint, &method, &headers, data).await;
            session.close(result)
        }

        Commands::Itineraries { command } => {
            let session = Session::open(&config)?;
            let client = &session.client;
            let result = match command {
                ItineraryCommands::List => commands::itineraries::list(client).await,
                ItineraryCommands::Show { id } => commands::itineraries::show(client, &id).await,
                ItineraryCommands::Delete { id } => {
                    commands::itineraries::delete(client, &id).await
                }
            };
            session.close(result)
        }

        Commands::Login { email, password } => {
            let session = Session::open(&config)?;
            let result = commands::auth::login(&session.client, &email, password).await;
            session.close(result)
        }
        Commands::Whoami => {
            let session = Session::open(&config)?;
            let result = commands::auth::whoami(&session.client).await;
            session.close(result)
        }
        Commands::Logout => {
            let session = Session::open(&config)?;
            let result = commands::auth::logout(&session.client).await;
            session.close(result)
        }

        Commands::Route {
            path,
            session,
            user_agent,
        } => {
            commands::route::run(&config, &path, session, user_agent.as_deref());
            Ok(())
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetBaseUrl { url } => commands::config::set_base_url(&url),
        },
    }
}
