//! # Tessera CLI Module
//!
//! This module implements the CLI interface for Tessera.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new vault
//! - `status` - Show row counts and chain heads
//! - `put` / `get` / `verify` / `rm` / `objects` - Object store
//! - `export` / `import` / `canonicalize` - Frame codec
//! - `append` / `events` / `verify-chain` - Audit ledger
//! - `policy load` / `policy list` - Policies from `tessera.toml`
//! - `approvals` / `review` - Tool approval queue
//! - `usage` - Model usage as seen by admission
//! - `compact` - Compact the vault file

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tessera_core::{ApprovalStatus, EventType, ReviewDecision, TesseraError};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tessera - Tamper-Evident Record Vault
///
/// Content-addressed objects, hash-chained audit events and the policies
/// that gate tool and model calls, in one embedded database file.
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the vault database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to the config file (default: tessera.toml, or $TESSERA_CONFIG)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty vault
    Init {
        /// Initialize even if the database file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show vault status
    Status,

    /// Store a file as a content-addressed object
    Put {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Read an object's bytes
    Get {
        /// Object id (64 lowercase hex characters)
        id: String,

        /// Write the bytes here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Refuse to return bytes that no longer match their id
        #[arg(long)]
        verify: bool,
    },

    /// Check that an object's bytes still hash to its id
    Verify {
        /// Object id
        id: String,
    },

    /// Delete an object, leaving a tombstone
    Rm {
        /// Object id
        id: String,
    },

    /// List stored objects
    Objects,

    /// Encode a record (JSON) as a canonical frame
    Export {
        /// Record JSON file (`{"type": "FACT", ...}`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a frame into record JSON
    Import {
        /// Frame file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the canonical form of a frame
    Canonicalize {
        /// Frame file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Append an event to an org's audit chain
    Append {
        /// Organization id
        #[arg(short, long)]
        org: String,

        /// Event type (request, evidence, tool, model, phi, response,
        /// error, auth, config, policy)
        #[arg(short = 't', long)]
        event_type: EventType,

        /// Acting user or service
        #[arg(short, long)]
        actor: String,

        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Run id to correlate events of one agent run
        #[arg(short, long)]
        run_id: Option<String>,
    },

    /// List an org's audit events in chain order
    Events {
        /// Organization id
        #[arg(short, long)]
        org: String,
    },

    /// Recompute audit chains from genesis
    VerifyChain {
        /// Organization id (default: every org)
        #[arg(short, long)]
        org: Option<String>,
    },

    /// Manage tool and model policies
    Policy {
        #[command(subcommand)]
        action: PolicyCommand,
    },

    /// List tool approvals of an org
    Approvals {
        /// Organization id
        #[arg(short, long)]
        org: String,

        /// Only approvals with this status (pending, approved, denied)
        #[arg(short, long)]
        status: Option<ApprovalStatus>,
    },

    /// Approve or deny a pending tool approval
    Review {
        /// Approval id
        id: u64,

        /// Reviewer identity
        #[arg(short, long)]
        reviewer: String,

        /// Reviewer roles (comma-separated)
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,

        /// Decision
        #[arg(short, long, value_enum)]
        decision: Decision,
    },

    /// Show a model's usage as seen by admission
    Usage {
        /// Organization id
        #[arg(short, long)]
        org: String,

        /// Model provider
        #[arg(short, long)]
        provider: String,

        /// Model name
        #[arg(short, long)]
        model: String,
    },

    /// Compact the vault file
    Compact,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Write the config file's policies into the vault
    Load {
        /// Actor recorded on the `config` audit events
        #[arg(short, long, default_value = "tessera-cli")]
        actor: String,
    },

    /// List the policies stored for an org
    List {
        /// Organization id
        #[arg(short, long)]
        org: String,
    },
}

/// Reviewer verdict as typed on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

impl From<Decision> for ReviewDecision {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approve => ReviewDecision::Approve,
            Decision::Deny => ReviewDecision::Deny,
        }
    }
}

impl Cli {
    /// Whether the banner may be printed. Commands whose stdout is data
    /// never get one.
    #[must_use]
    pub fn wants_banner(&self) -> bool {
        if self.quiet || self.json_mode {
            return false;
        }
        !matches!(
            self.command,
            Some(
                Commands::Get { .. }
                    | Commands::Export { .. }
                    | Commands::Import { .. }
                    | Commands::Canonicalize { .. }
            )
        )
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, config: &Config) -> Result<(), TesseraError> {
    let db_path = config.database_path(cli.database.as_deref());
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&db_path, force),
        Some(Commands::Status) | None => cmd_status(&db_path, json_mode),
        Some(Commands::Put { file }) => cmd_put(&db_path, json_mode, &file),
        Some(Commands::Get { id, output, verify }) => {
            cmd_get(&db_path, &id, output.as_deref(), verify)
        }
        Some(Commands::Verify { id }) => cmd_verify(&db_path, json_mode, &id),
        Some(Commands::Rm { id }) => cmd_rm(&db_path, json_mode, &id),
        Some(Commands::Objects) => cmd_objects(&db_path, json_mode),
        Some(Commands::Export { input, output }) => cmd_export(&input, output.as_deref()),
        Some(Commands::Import { input, output }) => cmd_import(&input, output.as_deref()),
        Some(Commands::Canonicalize { input }) => cmd_canonicalize(&input),
        Some(Commands::Append {
            org,
            event_type,
            actor,
            payload,
            run_id,
        }) => cmd_append(
            &db_path,
            json_mode,
            &org,
            event_type,
            &actor,
            &payload,
            run_id.as_deref(),
        ),
        Some(Commands::Events { org }) => cmd_events(&db_path, json_mode, &org),
        Some(Commands::VerifyChain { org }) => {
            cmd_verify_chain(&db_path, json_mode, org.as_deref())
        }
        Some(Commands::Policy { action }) => match action {
            PolicyCommand::Load { actor } => cmd_policy_load(&db_path, json_mode, config, &actor),
            PolicyCommand::List { org } => cmd_policy_list(&db_path, json_mode, &org),
        },
        Some(Commands::Approvals { org, status }) => {
            cmd_approvals(&db_path, json_mode, &org, status)
        }
        Some(Commands::Review {
            id,
            reviewer,
            roles,
            decision,
        }) => cmd_review(&db_path, json_mode, id, &reviewer, &roles, decision.into()),
        Some(Commands::Usage {
            org,
            provider,
            model,
        }) => cmd_usage(&db_path, json_mode, &org, &provider, &model),
        Some(Commands::Compact) => cmd_compact(&db_path),
    }
}
