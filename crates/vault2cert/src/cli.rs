//! Command line interface for vault2cert.
//!
//! Flags that also have an environment fallback are kept as `Option` here;
//! the fallback is applied by [`Config::resolve`](crate::config::Config::resolve).

use crate::tracing::{LogLevel, TracingConfig, TracingFormat};
use clap::Parser;
use std::path::PathBuf;

/// Command line flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "vault2cert")]
#[command(about = "Utility to retrieve an SSL certificate from HashiCorp Vault")]
#[command(
    long_about = "Request a certificate from the Vault PKI secrets engine and store it either \
                  as PEM files or in a JKS keystore. Without --write-to the certificate is \
                  printed to standard output."
)]
#[command(version)]
pub struct Cli {
    /// PKI secrets engine mount path.
    #[arg(long, help = "Path of the PKI mount [env: VAULT_PKI_MOUNT] [default: pki]")]
    pub mount: Option<String>,

    /// Common name of the requested certificate.
    #[arg(
        long = "common-name",
        help = "Certificate common name, e.g. something.example.com"
    )]
    pub common_name: Option<String>,

    /// Vault role the certificate is issued under.
    #[arg(long, help = "Vault role used to issue the certificate [env: VAULT_PKI_ROLE]")]
    pub role: Option<String>,

    /// Keystore file to write.
    #[arg(
        long,
        value_name = "PATH",
        help = "Write the key and certificate to a JKS keystore"
    )]
    pub jks: Option<PathBuf>,

    /// Store and key password for `--jks`.
    #[arg(
        long = "jkspassword",
        value_name = "PASSWORD",
        help = "Password for the JKS keystore; generated and printed when omitted"
    )]
    pub jks_password: Option<String>,

    /// Output directory for the PEM files.
    #[arg(
        long = "write-to",
        value_name = "DIR",
        help = "Directory where <common-name>.crt, .key and .ca are written"
    )]
    pub write_to: Option<PathBuf>,

    /// Append the issuing CA to the keystore chain.
    #[arg(long, help = "Append the issuing CA to the keystore certificate chain")]
    pub include_ca: bool,

    /// Extra DNS names.
    #[arg(
        long = "alt-names",
        value_delimiter = ',',
        value_name = "NAMES",
        help = "Additional DNS subject alternative names, comma separated"
    )]
    pub alt_names: Vec<String>,

    /// IP addresses for the certificate.
    #[arg(
        long = "ip-sans",
        value_delimiter = ',',
        value_name = "IPS",
        help = "IP subject alternative names, comma separated"
    )]
    pub ip_sans: Vec<String>,

    /// Requested lifetime.
    #[arg(
        long,
        help = "Requested certificate lifetime, e.g. 72h; the role default applies otherwise"
    )]
    pub ttl: Option<String>,

    /// Logging verbosity level.
    #[arg(
        short = 'l',
        long,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Layout of log lines on stderr.
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Shorthand for `--log-format json`.
    #[arg(long, help = "Output logs in JSON format")]
    pub json: bool,
}

impl Cli {
    /// Tracing settings selected by `--level`, `--log-format` and `--json`
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            format: if self.json {
                TracingFormat::Json
            } else {
                self.log_format
            },
            level: self.level.into(),
        }
    }
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
