// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

//! vault2cert - certificates from the Vault PKI secrets engine
//!
//! One run issues one certificate and delivers it in up to three ways:
//!
//! - printed to standard output (the default)
//! - written as `<common-name>.crt`, `.key` and `.ca` into a directory
//! - packaged with its private key into a JKS keystore
//!
//! ```ignore
//! let cli = vault2cert::cli::parse();
//! let config = vault2cert::Config::from_env(&cli)?;
//! let client = vault2cert_vault::PkiClient::new(config.vault.clone())?;
//! vault2cert::run(&config, &client, &mut std::io::stdout()).await?;
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod keystore;
pub mod output;
pub mod password;
pub mod tracing;

pub use app::run;
pub use config::{Config, JksTarget};
pub use errors::{Error, Result, exit_code_for};
