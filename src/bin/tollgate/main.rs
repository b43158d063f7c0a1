//! tollgate CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::bail;
use std::io::Write;
use tollgate::config::GateConfig;
use tollgate::payment::validate_address;
use tollgate::{ContentGate, PaymentRequiredBody, PaymentVerdict};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let (plain, json) = if cli.log_json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };
    tracing_subscriber::registry()
        .with(plain)
        .with(json)
        .with(filter)
        .init();

    info!("tollgate v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig {
        ref path,
        price,
        ref recipient,
        force,
    } = cli.command
    {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        validate_address(recipient)?;
        let config = GateConfig::new(price, recipient.clone());
        config.to_file(path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let mut config = cli.load_config()?;
    config.load_secret_from_env()?;
    let gate = ContentGate::builder(config).build()?;

    match cli.command {
        Command::Seal {
            content_id,
            file,
            signature,
        } => {
            let plaintext = std::fs::read_to_string(&file)?;
            gate.publish(&content_id, &plaintext, &signature)?;
            println!("Sealed {content_id}");
        }
        Command::Preview { content_id } => {
            println!("{}", gate.preview(&content_id)?);
        }
        Command::Unlock {
            content_id,
            signature,
            sender,
            output,
        } => match gate.unlock(&signature, &content_id, &sender).await {
            Ok(plaintext) => match output {
                Some(path) => {
                    std::fs::write(&path, &plaintext)?;
                    println!("Wrote {}", path.display());
                }
                None => std::io::stdout().write_all(&plaintext)?,
            },
            Err(e) => {
                if e.status_code() == 402 {
                    let body = PaymentRequiredBody::new(format!(
                        "{}. {}",
                        e.public_message(),
                        gate.redactor().payment_instructions()
                    ));
                    eprintln!("{}", serde_json::to_string_pretty(&body)?);
                }
                bail!("unlock failed ({}): {}", e.status_code(), e.public_message());
            }
        },
        Command::Verify {
            signature,
            sender,
            content_id,
        } => match gate.verify_payment(&signature, &content_id, &sender).await {
            PaymentVerdict::Verified(record) => {
                println!(
                    "verified: {} SOL from {} to {}",
                    record.amount, record.sender, record.recipient
                );
            }
            PaymentVerdict::Rejected { reason, .. } => {
                bail!("rejected: {reason}");
            }
        },
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
