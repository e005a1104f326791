use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use leadcrm::config::{CONFIG_FILE, CrmConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "leadcrm")]
#[command(version, about = "Multi-tenant lead CRM server")]
pub struct Cli {
    /// Configuration file; missing files fall back to defaults
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// SQLite database path. Overrides crm.toml and CRM_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (CORS permissive for a local front-end)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and its tables
    InitDb,
    /// Create a user account from the command line
    CreateUser {
        username: String,

        #[arg(long)]
        email: String,

        /// Password for the new account
        #[arg(long, env = "CRM_NEW_USER_PASSWORD")]
        password: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        last_name: String,

        /// Make the account an organisor owning its own organisation
        #[arg(long)]
        organisor: bool,

        #[arg(long)]
        superuser: bool,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default crm.toml
    Init,
}

impl Cli {
    /// Defaults, then the config file, then the environment, then flags.
    fn resolve_config(&self) -> Result<CrmConfig> {
        let mut config = CrmConfig::resolve(&self.config)?;
        if let Some(path) = &self.db_path {
            config.database.path = path.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = cli.resolve_config()?;
    let _log_guard = leadcrm::logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve { host, port, dev } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.dev_mode |= dev;
            cmd::cmd_serve(config).await?;
        }
        Commands::InitDb => cmd::cmd_init_db(&config)?,
        Commands::CreateUser {
            username,
            email,
            password,
            first_name,
            last_name,
            organisor,
            superuser,
        } => {
            let account = cmd::NewAccount {
                username,
                email,
                password,
                first_name,
                last_name,
                organisor,
                superuser,
            };
            cmd::cmd_create_user(&config, account)?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command)?,
    }

    Ok(())
}
