//! One end-to-end run: issue, then write the requested outputs.

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::keystore::{KeystoreInput, write_to_jks};
use crate::output::{emit_certificate, write_bundle};
use secrecy::ExposeSecret;
use std::io::Write;
use tracing::{info, instrument};
use vault2cert_vault::CertificateIssuer;
use zeroize::Zeroizing;

/// Issue a certificate and deliver it.
///
/// A generated keystore password is printed before the request is made.
/// Without a `write_to` directory the leaf certificate goes to `stdout`,
/// even when a keystore is also requested.
///
/// # Errors
///
/// Returns the first failure; outputs already written are left in place.
#[instrument(
    name = "run",
    skip_all,
    fields(common_name = %config.request.common_name, role = %config.request.role)
)]
pub async fn run<I, W>(config: &Config, issuer: &I, stdout: &mut W) -> Result<()>
where
    I: CertificateIssuer + ?Sized,
    W: Write,
{
    if let Some(jks) = config.jks.as_ref().filter(|jks| jks.password_generated) {
        writeln!(stdout, "JKS password: {}", jks.password.expose_secret())
            .map_err(|e| Error::io("write", "<stdout>", e))?;
    }

    let issued = issuer.issue(&config.request).await?;

    match &config.write_to {
        None => emit_certificate(stdout, &issued)?,
        Some(dir) => {
            write_bundle(dir, &config.request.common_name, &issued)?;
        }
    }

    if let Some(jks) = &config.jks {
        let mut password = Zeroizing::new(jks.password.expose_secret().as_bytes().to_vec());
        write_to_jks(
            &KeystoreInput::from_issued(&issued, jks.include_ca),
            &jks.path,
            &mut password,
        )?;
    }

    info!(serial_number = %issued.serial_number, "Done");
    Ok(())
}
