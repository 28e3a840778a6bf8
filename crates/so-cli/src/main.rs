mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use so_core::config::Config;

/// socially CLI -- sign in, edit your profile and chat from the terminal.
#[derive(Parser)]
#[command(name = "so", version, about)]
struct Cli {
    /// Config file to use instead of ~/.socially/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who is signed in (default when no subcommand is given).
    Whoami {
        /// Print the stored user record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sign in with email and password.
    Login {
        email: String,
        /// Password; read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and sign in.
    Signup {
        /// Display name for the new account.
        name: String,
        email: String,
        /// Password; read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign in with Google.
    Google,

    /// Send a password reset link.
    Forgot { email: String },

    /// Sign out. The saved profile is kept.
    Logout,

    /// Show or edit the local profile.
    Profile {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },

    /// Join the live chat. Type a line to send it, `/quit` to leave.
    Chat {
        /// Open a one-to-one conversation with this user id instead of the
        /// default conversation.
        #[arg(long)]
        peer: Option<String>,
    },

    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Print the saved profile.
    Show,
    /// Update fields of the profile; unspecified fields keep their value.
    Set {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Comma-separated interest tags.
        #[arg(long)]
        interests: Option<String>,
        /// Image file to use as avatar.
        #[arg(long, conflicts_with = "clear_avatar")]
        avatar: Option<PathBuf>,
        /// Remove the avatar.
        #[arg(long)]
        clear_avatar: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file location.
    Path,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config commands run before (and without) loading the config
    let command = match cli.command {
        Some(Commands::Config { action }) => {
            let path = cli.config.unwrap_or_else(Config::default_path);
            return match action {
                ConfigAction::Show => commands::config::show(&path),
                ConfigAction::Path => {
                    println!("{}", path.display());
                    Ok(())
                }
                ConfigAction::Init { force } => commands::config::init(&path, force),
            };
        }
        other => other,
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    so_telemetry::logging::init_from_config(&config.general);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(command, config))
}

async fn run(command: Option<Commands>, config: Config) -> anyhow::Result<()> {
    let ui = commands::open(config)?;

    match command {
        None => commands::auth::whoami(&ui, false)?,
        Some(Commands::Whoami { json }) => commands::auth::whoami(&ui, json)?,
        Some(Commands::Login { email, password }) => {
            commands::auth::login(&ui, &email, password).await?;
        }
        Some(Commands::Signup {
            name,
            email,
            password,
        }) => {
            commands::auth::signup(&ui, &name, &email, password).await?;
        }
        Some(Commands::Google) => commands::auth::google(&ui).await?,
        Some(Commands::Forgot { email }) => commands::auth::forgot(&ui, &email).await?,
        Some(Commands::Logout) => commands::auth::logout(&ui).await?,
        Some(Commands::Profile { action }) => match action {
            None | Some(ProfileAction::Show) => commands::profile::show(&ui),
            Some(ProfileAction::Set {
                name,
                bio,
                interests,
                avatar,
                clear_avatar,
            }) => {
                let edits = commands::profile::ProfileEdits {
                    name,
                    bio,
                    interests,
                    avatar,
                    clear_avatar,
                };
                commands::profile::set(&ui, edits)?;
            }
        },
        Some(Commands::Chat { peer }) => commands::chat::run(&ui, peer.as_deref()).await?,
        Some(Commands::Config { .. }) => {}
    }

    Ok(())
}
