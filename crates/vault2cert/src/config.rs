//! Resolution of flags, environment and defaults into one [`Config`].
//!
//! Precedence for every setting: explicit flag, then environment variable,
//! then built-in default. Empty environment values count as unset, and so
//! does an empty `--mount` or `--jkspassword`.

use crate::cli::Cli;
use crate::errors::{Error, Result};
use crate::password::{PASSWORD_LENGTH, generate_password};
use secrecy::SecretString;
use std::path::PathBuf;
use tracing::{debug, warn};
use vault2cert_vault::{IssueRequest, VaultSettings};

/// PKI mount path
pub const ENV_PKI_MOUNT: &str = "VAULT_PKI_MOUNT";
/// Role used for issuance
pub const ENV_PKI_ROLE: &str = "VAULT_PKI_ROLE";
/// Vault server address
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
/// Vault token
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";
/// Edge-proxy access token
pub const ENV_CLOUDFLARE_TOKEN: &str = "CLOUDFLARE_TOKEN";

/// Address used when `VAULT_ADDR` is unset
pub const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";
/// Token used when `VAULT_TOKEN` is unset (dev-mode root token)
pub const DEFAULT_VAULT_TOKEN: &str = "root";
/// Mount used when neither `--mount` nor `VAULT_PKI_MOUNT` is given
pub const DEFAULT_PKI_MOUNT: &str = "pki";

/// Where and how to write the keystore
#[derive(Debug, Clone)]
pub struct JksTarget {
    /// Destination file
    pub path: PathBuf,
    /// Store and key password
    pub password: SecretString,
    /// The password was generated and must be shown to the operator
    pub password_generated: bool,
    /// Append the issuing CA to the chain
    pub include_ca: bool,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// Server connection
    pub vault: VaultSettings,
    /// What to ask for
    pub request: IssueRequest,
    /// Directory for `.crt`/`.key`/`.ca` files; stdout when `None`
    pub write_to: Option<PathBuf>,
    /// Keystore output, if requested
    pub jks: Option<JksTarget>,
}

impl Config {
    /// Resolve against the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] if the common name or role is empty.
    pub fn from_env(cli: &Cli) -> Result<Self> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] if the common name or role is empty.
    pub fn resolve<F>(cli: &Cli, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.is_empty());

        let common_name = cli.common_name.clone().unwrap_or_default();
        if common_name.is_empty() {
            return Err(Error::missing_argument("common name", "common-name", None));
        }

        let role = cli
            .role
            .clone()
            .or_else(|| lookup(ENV_PKI_ROLE))
            .unwrap_or_default();
        if role.is_empty() {
            return Err(Error::missing_argument("role", "role", Some(ENV_PKI_ROLE)));
        }

        let mount = cli
            .mount
            .clone()
            .filter(|mount| !mount.is_empty())
            .or_else(|| lookup(ENV_PKI_MOUNT))
            .unwrap_or_else(|| DEFAULT_PKI_MOUNT.to_string());

        let address = lookup(ENV_VAULT_ADDR).unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string());
        let token = lookup(ENV_VAULT_TOKEN).unwrap_or_else(|| {
            warn!("{ENV_VAULT_TOKEN} is not set, falling back to the dev-mode root token");
            DEFAULT_VAULT_TOKEN.to_string()
        });
        let mut vault = VaultSettings::new(address, SecretString::from(token));
        if let Some(access_token) = lookup(ENV_CLOUDFLARE_TOKEN) {
            debug!("Attaching edge-proxy access token");
            vault = vault.with_access_token(SecretString::from(access_token));
        }

        let mut request = IssueRequest::new(mount, role, common_name);
        request.alt_names.clone_from(&cli.alt_names);
        request.ip_sans.clone_from(&cli.ip_sans);
        request.ttl.clone_from(&cli.ttl);

        let jks = cli.jks.clone().map(|path| {
            let supplied = cli.jks_password.clone().filter(|p| !p.is_empty());
            let password_generated = supplied.is_none();
            let password = supplied.map_or_else(
                || generate_password(PASSWORD_LENGTH),
                SecretString::from,
            );
            JksTarget {
                path,
                password,
                password_generated,
                include_ca: cli.include_ca,
            }
        });
        if jks.is_none() && cli.include_ca {
            warn!("--include-ca has no effect without --jks");
        }

        debug!(
            address = %vault.address,
            mount = %request.mount,
            role = %request.role,
            common_name = %request.common_name,
            "Configuration resolved"
        );

        Ok(Self {
            vault,
            request,
            write_to: cli.write_to.clone(),
            jks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["vault2cert"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_without_env() {
        let config = Config::resolve(
            &cli(&["--common-name", "example.com", "--role", "web"]),
            env_of(&[]),
        )
        .unwrap();

        assert_eq!(config.vault.address, DEFAULT_VAULT_ADDR);
        assert_eq!(config.vault.token.expose_secret(), DEFAULT_VAULT_TOKEN);
        assert!(config.vault.access_token.is_none());
        assert_eq!(config.vault.request_timeout.as_secs(), 30);
        assert_eq!(config.request.mount, DEFAULT_PKI_MOUNT);
        assert_eq!(config.request.role, "web");
        assert_eq!(config.request.common_name, "example.com");
        assert!(config.write_to.is_none());
        assert!(config.jks.is_none());
    }

    #[test]
    fn test_env_fallbacks() {
        let config = Config::resolve(
            &cli(&["--common-name", "example.com"]),
            env_of(&[
                (ENV_PKI_MOUNT, "pki_int"),
                (ENV_PKI_ROLE, "internal"),
                (ENV_VAULT_ADDR, "https://vault.example.com:8200"),
                (ENV_VAULT_TOKEN, "s.abcdef"),
                (ENV_CLOUDFLARE_TOKEN, "cf-token"),
            ]),
        )
        .unwrap();

        assert_eq!(config.request.mount, "pki_int");
        assert_eq!(config.request.role, "internal");
        assert_eq!(config.vault.address, "https://vault.example.com:8200");
        assert_eq!(config.vault.token.expose_secret(), "s.abcdef");
        assert_eq!(
            config.vault.access_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("cf-token".to_string())
        );
    }

    #[test]
    fn test_flags_override_env() {
        let config = Config::resolve(
            &cli(&[
                "--common-name",
                "example.com",
                "--role",
                "flag-role",
                "--mount",
                "flag-mount",
            ]),
            env_of(&[(ENV_PKI_MOUNT, "env-mount"), (ENV_PKI_ROLE, "env-role")]),
        )
        .unwrap();

        assert_eq!(config.request.mount, "flag-mount");
        assert_eq!(config.request.role, "flag-role");
    }

    #[test]
    fn test_empty_env_values_are_unset() {
        let config = Config::resolve(
            &cli(&["--common-name", "example.com", "--role", "web"]),
            env_of(&[
                (ENV_PKI_MOUNT, ""),
                (ENV_VAULT_ADDR, ""),
                (ENV_CLOUDFLARE_TOKEN, ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.request.mount, DEFAULT_PKI_MOUNT);
        assert_eq!(config.vault.address, DEFAULT_VAULT_ADDR);
        assert!(config.vault.access_token.is_none());
    }

    #[test]
    fn test_empty_mount_flag_falls_back() {
        let config = Config::resolve(
            &cli(&["--common-name", "example.com", "--role", "web", "--mount", ""]),
            env_of(&[]),
        )
        .unwrap();
        assert_eq!(config.request.mount, DEFAULT_PKI_MOUNT);

        let config = Config::resolve(
            &cli(&["--common-name", "example.com", "--role", "web", "--mount", ""]),
            env_of(&[(ENV_PKI_MOUNT, "pki_int")]),
        )
        .unwrap();
        assert_eq!(config.request.mount, "pki_int");
    }

    #[test]
    fn test_missing_common_name() {
        let err = Config::resolve(&cli(&["--role", "web"]), env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument {
                argument: "common name",
                ..
            }
        ));

        let err = Config::resolve(&cli(&["--common-name", "", "--role", "web"]), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, Error::MissingArgument { .. }));
    }

    #[test]
    fn test_missing_role() {
        let err =
            Config::resolve(&cli(&["--common-name", "example.com"]), env_of(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingArgument { argument: "role", .. }));
    }

    #[test]
    fn test_explicit_empty_role_beats_env() {
        let err = Config::resolve(
            &cli(&["--common-name", "example.com", "--role", ""]),
            env_of(&[(ENV_PKI_ROLE, "web")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingArgument { argument: "role", .. }));
    }

    #[test]
    fn test_common_name_checked_before_role() {
        let err = Config::resolve(&cli(&[]), env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument {
                argument: "common name",
                ..
            }
        ));
    }

    #[test]
    fn test_jks_password_generated_when_missing() {
        let config = Config::resolve(
            &cli(&["--common-name", "example.com", "--role", "web", "--jks", "ks.jks"]),
            env_of(&[]),
        )
        .unwrap();

        let jks = config.jks.unwrap();
        assert!(jks.password_generated);
        assert_eq!(jks.path, PathBuf::from("ks.jks"));
        let password = jks.password.expose_secret();
        assert_eq!(password.len(), PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_jks_password_supplied() {
        let config = Config::resolve(
            &cli(&[
                "--common-name",
                "example.com",
                "--role",
                "web",
                "--jks",
                "ks.jks",
                "--jkspassword",
                "changeit",
                "--include-ca",
            ]),
            env_of(&[]),
        )
        .unwrap();

        let jks = config.jks.unwrap();
        assert!(!jks.password_generated);
        assert!(jks.include_ca);
        assert_eq!(jks.password.expose_secret(), "changeit");
    }

    #[test]
    fn test_no_password_without_jks() {
        let config = Config::resolve(
            &cli(&[
                "--common-name",
                "example.com",
                "--role",
                "web",
                "--jkspassword",
                "changeit",
            ]),
            env_of(&[]),
        )
        .unwrap();
        assert!(config.jks.is_none());
    }

    #[test]
    fn test_issue_options_are_forwarded() {
        let config = Config::resolve(
            &cli(&[
                "--common-name",
                "example.com",
                "--role",
                "web",
                "--alt-names",
                "www.example.com",
                "--ip-sans",
                "10.1.2.3",
                "--ttl",
                "1h",
                "--write-to",
                "/tmp/out",
            ]),
            env_of(&[]),
        )
        .unwrap();

        assert_eq!(config.request.alt_names, vec!["www.example.com"]);
        assert_eq!(config.request.ip_sans, vec!["10.1.2.3"]);
        assert_eq!(config.request.ttl.as_deref(), Some("1h"));
        assert_eq!(config.write_to, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        temp_env::with_vars(
            [
                (ENV_PKI_ROLE, Some("from-process")),
                (ENV_VAULT_ADDR, Some("http://vault.internal:8200")),
                (ENV_PKI_MOUNT, None),
                (ENV_VAULT_TOKEN, None),
                (ENV_CLOUDFLARE_TOKEN, None),
            ],
            || {
                let config = Config::from_env(&cli(&["--common-name", "example.com"])).unwrap();
                assert_eq!(config.request.role, "from-process");
                assert_eq!(config.request.mount, DEFAULT_PKI_MOUNT);
                assert_eq!(config.vault.address, "http://vault.internal:8200");
            },
        );
    }
}
