//! Herald CLI - Lightweight announcement-group client
//!
//! A terminal client for the Herald announcement service.

mod api;
mod auth;
mod broadcast;
mod config;
mod device;
mod models;
mod push;
mod sync;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "herald-cli")]
#[command(about = "Lightweight CLI client for the Herald announcement service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a session token
    Login {
        /// User id the token belongs to
        #[arg(long)]
        uid: String,

        /// Account email
        #[arg(long)]
        email: String,

        /// Bearer token for the document store
        #[arg(long)]
        token: String,

        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<u64>,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show current session and device state
    Status,

    /// Create an organization (you become its owner)
    Create {
        /// Organization name (unique at creation time)
        name: String,

        /// Join code members must present
        #[arg(short, long)]
        code: String,

        /// Avatar index
        #[arg(short, long, default_value = "0")]
        avatar: i64,
    },

    /// Join an organization by name and code
    Join {
        name: String,

        #[arg(short, long)]
        code: String,
    },

    /// Leave an organization
    Leave {
        /// Organization ID (from `orgs` output)
        org_id: String,
    },

    /// List owned and joined organizations
    Orgs,

    /// List an organization's members
    Members {
        /// Organization ID (from `orgs` output)
        org_id: String,
    },

    /// Remove a member (owner only)
    RemoveMember {
        /// Organization ID
        org_id: String,

        /// Member user id to remove
        uid: String,
    },

    /// Update an organization's avatar index
    Avatar {
        /// Organization ID
        org_id: String,

        index: i64,
    },

    /// Mark the latest announcement as seen
    Seen {
        /// Organization ID
        org_id: String,
    },

    /// Get/set the remembered default tab
    Screen {
        /// New selection: owned, joined, none
        #[arg(short, long)]
        set: Option<String>,
    },

    /// Send an announcement (owner only)
    Send {
        /// Organization ID (from `orgs` output)
        #[arg(short, long)]
        to: String,

        /// Announcement content
        message: String,
    },

    /// Follow live organization and message-log changes
    Watch {
        /// Organization ID whose message log to follow
        #[arg(long)]
        org: Option<String>,
    },

    /// Receive push notifications for this device
    Inbox,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            uid,
            email,
            token,
            expires_in,
        } => {
            auth::login(&uid, &email, &token, expires_in)?;
        }
        Commands::Logout => {
            auth::logout()?;
        }
        Commands::Status => {
            auth::status()?;
        }
        Commands::Create { name, code, avatar } => {
            let client = api::StoreClient::new()?;
            let org = api::create_organization(&client, &name, &code, avatar).await?;
            println!("Created {} (ID: {}).", org.name, org.id);
        }
        Commands::Join { name, code } => {
            let client = api::StoreClient::new()?;
            let org = api::join_organization(&client, &name, &code).await?;
            println!("Joined {} (ID: {}).", org.name, org.id);
        }
        Commands::Leave { org_id } => {
            let client = api::StoreClient::new()?;
            api::leave_organization(&client, &org_id).await?;
            println!("Left organization.");
        }
        Commands::Orgs => {
            api::list_organizations().await?;
        }
        Commands::Members { org_id } => {
            api::show_members(&org_id).await?;
        }
        Commands::RemoveMember { org_id, uid } => {
            let client = api::StoreClient::new()?;
            api::remove_member(&client, &org_id, &uid).await?;
            println!("Member removed.");
        }
        Commands::Avatar { org_id, index } => {
            let client = api::StoreClient::new()?;
            api::set_avatar(&client, &org_id, index).await?;
            println!("Avatar updated.");
        }
        Commands::Seen { org_id } => {
            let client = api::StoreClient::new()?;
            api::mark_seen(&client, &org_id).await?;
            println!("Marked as seen.");
        }
        Commands::Screen { set } => match set {
            Some(value) => {
                let screen = models::SelectedScreen::parse(&value);
                let client = api::StoreClient::new()?;
                api::set_selected_screen(&client, screen).await?;
                println!("Default tab set to {}.", screen.as_str());
            }
            None => {
                let client = api::StoreClient::new()?;
                let uid = client.uid().to_string();
                let user = api::fetch_user(&client, &uid).await?;
                println!("Default tab: {}", user.selected_screen.as_str());
            }
        },
        Commands::Send { to, message } => {
            tracing::info!("Sending announcement...");
            broadcast::send_announcement(&to, &message).await?;
        }
        Commands::Watch { org } => {
            sync::run_watch(org).await?;
        }
        Commands::Inbox => {
            push::inbox::run_inbox().await?;
        }
    }

    Ok(())
}
