use anyhow::Result;
use clap::{Parser, Subcommand};
use dashboard::{
    api::ApiClient,
    config::{socket_url, Config},
    session::{FileStore, Session},
};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

mod commands;
mod watch;

use commands::{AlertCommand, GrievanceArgs, ProfileCommand, UserCommand};

/// GramAlert Plus from the terminal.
#[derive(Debug, Parser)]
#[command(name = "gramalert", version, about, long_about = None)]
struct Cli {
    /// Overrides GRAMALERT_API_URL; the socket url is derived from it.
    #[arg(long, global = true)]
    api_url: Option<Url>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and remember the session.
    Login {
        username: String,
        /// Read from stdin when omitted.
        #[arg(long, env = "GRAMALERT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session.
    Logout,
    /// Create a villager account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Show who is signed in.
    Whoami,
    /// Open the dashboard for your role and follow live updates.
    Watch,
    /// Submit a new grievance.
    Submit(GrievanceArgs),
    /// Edit one of your grievances.
    Edit {
        id: i64,
        #[command(flatten)]
        grievance: GrievanceArgs,
    },
    /// Village alerts (admin).
    #[command(subcommand)]
    Alert(AlertCommand),
    /// User management (admin).
    #[command(subcommand)]
    Users(UserCommand),
    /// Your own account.
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(api_url) = cli.api_url {
        config.ws_url = socket_url(&api_url)?;
        config.api_url = api_url;
    }

    let session = Session::new(FileStore::new(&config.session_dir));
    session.init()?;
    let api = ApiClient::new(config.api_url.clone(), session.clone());

    match cli.command {
        Command::Login { username, password } => {
            commands::login(&api, &session, &username, password).await
        }
        Command::Logout => commands::logout(&session),
        Command::Register {
            username,
            email,
            password,
        } => commands::register(&api, username, email, password).await,
        Command::Whoami => commands::whoami(&session),
        Command::Watch => watch::execute(&config, api).await,
        Command::Submit(grievance) => commands::submit(&api, grievance).await,
        Command::Edit { id, grievance } => commands::edit(&api, id, grievance).await,
        Command::Alert(command) => commands::alert(&api, command).await,
        Command::Users(command) => commands::users(&api, command).await,
        Command::Profile(command) => commands::profile(&api, &session, command).await,
    }
}
