//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tollgate::config::GateConfig;
use tollgate::{Lamports, ServerSecret};

/// Payment-bound content gate.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long, env = "TOLLGATE_LOG_JSON")]
    pub log_json: bool,

    /// Hex-encoded server secret.
    #[arg(long, env = "TOLLGATE_SERVER_SECRET", hide_env_values = true)]
    pub server_secret: Option<String>,

    /// Override the price, in SOL.
    #[arg(long, env = "TOLLGATE_PRICE")]
    pub price: Option<Lamports>,

    /// Override the payee address.
    #[arg(long, env = "TOLLGATE_RECIPIENT")]
    pub recipient: Option<String>,

    /// Override the ledger RPC endpoint.
    #[arg(long, env = "TOLLGATE_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Override the content directory.
    #[arg(long, env = "TOLLGATE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Seal a file for the buyer of a transaction signature.
    Seal {
        /// Id to publish under.
        content_id: String,
        /// File holding the premium text.
        file: PathBuf,
        /// Signature of the buyer's payment.
        #[arg(long)]
        signature: String,
    },

    /// Print the free preview of a piece of content.
    Preview {
        /// Content id.
        content_id: String,
    },

    /// Verify a payment and print the unlocked content.
    Unlock {
        /// Content id.
        content_id: String,
        /// Payment transaction signature.
        #[arg(long)]
        signature: String,
        /// Account that sent the payment.
        #[arg(long)]
        sender: String,
        /// Write the content here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check a payment without unlocking anything.
    Verify {
        /// Payment transaction signature.
        #[arg(long)]
        signature: String,
        /// Account that sent the payment.
        #[arg(long)]
        sender: String,
        /// Content the payment is for.
        #[arg(long, default_value = "verify")]
        content_id: String,
    },

    /// Write a starter configuration file.
    InitConfig {
        /// Destination path.
        path: PathBuf,
        /// Price in SOL.
        #[arg(long, default_value = "0.001")]
        price: Lamports,
        /// Payee address.
        #[arg(long)]
        recipient: String,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Load the config file and apply command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded, no price or payee is
    /// known, or the secret is not valid hex.
    pub fn load_config(&self) -> color_eyre::Result<GateConfig> {
        let mut config = if let Some(ref path) = self.config {
            GateConfig::from_file(path)?
        } else {
            let price = self
                .price
                .ok_or_else(|| color_eyre::eyre::eyre!("--price or --config is required"))?;
            let recipient = self
                .recipient
                .clone()
                .ok_or_else(|| color_eyre::eyre::eyre!("--recipient or --config is required"))?;
            GateConfig::new(price, recipient)
        };

        if let Some(price) = self.price {
            config.payment.required_amount = price;
        }
        if let Some(ref recipient) = self.recipient {
            config.payment.recipient_address.clone_from(recipient);
        }
        if let Some(ref rpc_url) = self.rpc_url {
            config.oracle.rpc_url.clone_from(rpc_url);
        }
        if let Some(ref store_dir) = self.store_dir {
            config.content.store_dir.clone_from(store_dir);
        }
        if let Some(ref secret) = self.server_secret {
            config.server_secret = Some(ServerSecret::from_hex(secret)?);
        }
        config.log_level.clone_from(&self.log_level);

        Ok(config)
    }
}
