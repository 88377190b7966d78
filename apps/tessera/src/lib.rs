//! # Tessera
//!
//! Command-line front end for the Tessera vault.
//!
//! - `cli`: clap commands over objects, ledger and policies
//! - `config`: `tessera.toml` loading and policy seeding

pub mod cli;
pub mod config;
