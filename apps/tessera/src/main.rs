//! # Tessera - Tamper-Evident Record Vault
//!
//! The main binary for the Tessera vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                apps/tessera (THE BINARY)              │
//! │                                                       │
//! │   ┌─────────────┐          ┌──────────────────────┐   │
//! │   │    CLI      │          │   Config (toml)      │   │
//! │   │   (clap)    │          │   policy seeding     │   │
//! │   └──────┬──────┘          └──────────┬───────────┘   │
//! │          └──────────────┬─────────────┘               │
//! │                         ▼                             │
//! │                 ┌───────────────┐                     │
//! │                 │ tessera-core  │                     │
//! │                 │  (THE VAULT)  │                     │
//! │                 └───────────────┘                     │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! tessera init
//! tessera put -f report.pdf
//! tessera append -o acme -t evidence -a alice -p '{"doc":"report.pdf"}'
//! tessera verify-chain -o acme
//! ```

use clap::Parser;
use tessera::{cli, config::Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // A broken config still gets logged in the requested format.
    let config = Config::load(cli.config.as_deref());
    let file_format = config
        .as_ref()
        .ok()
        .and_then(|c| c.log_format.clone());
    init_tracing(file_format, cli.verbose);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.wants_banner() {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the subscriber. `TESSERA_LOG_FORMAT=json` wins over the config
/// file; `RUST_LOG` wins over `--verbose`.
fn init_tracing(file_format: Option<String>, verbose: bool) {
    let log_format = std::env::var("TESSERA_LOG_FORMAT")
        .ok()
        .or(file_format)
        .unwrap_or_else(|| "text".to_string());

    let default_filter = if verbose {
        "tessera=debug,tessera_core=debug"
    } else {
        "tessera=info,tessera_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the Tessera startup banner.
fn print_banner() {
    println!(
        r#"
  ╔╦╗╔═╗╔═╗╔═╗╔═╗╦═╗╔═╗
   ║ ║╣ ╚═╗╚═╗║╣ ╠╦╝╠═╣
   ╩ ╚═╝╚═╝╚═╝╚═╝╩╚═╩ ╩

  Tamper-Evident Record Vault v{}

  Canonical • Content-Addressed • Hash-Chained
"#,
        env!("CARGO_PKG_VERSION")
    );
}
