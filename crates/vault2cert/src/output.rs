//! PEM output: standard output or `<common-name>.{crt,key,ca}` files.

use crate::errors::{Error, Result};
use secrecy::ExposeSecret;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vault2cert_vault::IssuedCertificate;

/// Print the leaf certificate followed by a newline.
///
/// # Errors
///
/// Returns [`Error::Io`] if `out` cannot be written.
pub fn emit_certificate<W: Write>(out: &mut W, issued: &IssuedCertificate) -> Result<()> {
    writeln!(out, "{}", issued.certificate)
        .and_then(|()| out.flush())
        .map_err(|e| Error::io("write", "<stdout>", e))
}

/// Files produced by [`write_bundle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    /// `<cn>.crt`
    pub certificate: PathBuf,
    /// `<cn>.key`
    pub private_key: PathBuf,
    /// `<cn>.ca`
    pub issuing_ca: PathBuf,
}

impl BundlePaths {
    /// Paths for `common_name` inside `dir`
    #[must_use]
    pub fn new(dir: &Path, common_name: &str) -> Self {
        Self {
            certificate: dir.join(format!("{common_name}.crt")),
            private_key: dir.join(format!("{common_name}.key")),
            issuing_ca: dir.join(format!("{common_name}.ca")),
        }
    }
}

/// Write certificate, key and issuing CA into `dir`.
///
/// Files are written in that order and existing files are overwritten. A
/// failure part way through leaves the files already written in place.
///
/// # Errors
///
/// Returns [`Error::Io`] naming the file that could not be created or written.
pub fn write_bundle(
    dir: &Path,
    common_name: &str,
    issued: &IssuedCertificate,
) -> Result<BundlePaths> {
    let paths = BundlePaths::new(dir, common_name);

    write_pem(&paths.certificate, &issued.certificate, false)?;
    write_pem(&paths.private_key, issued.private_key.expose_secret(), true)?;
    write_pem(&paths.issuing_ca, &issued.issuing_ca, false)?;

    info!(
        directory = %dir.display(),
        common_name,
        "Certificate bundle written"
    );
    Ok(paths)
}

fn write_pem(path: &Path, contents: &str, private: bool) -> Result<()> {
    let file = create(path, private).map_err(|e| Error::io("create", path, e))?;
    if private {
        // The creation mode only applies to new files
        restrict_permissions(&file).map_err(|e| Error::io("set permissions on", path, e))?;
    }

    let mut writer = BufWriter::new(file);
    writer
        .write_all(contents.as_bytes())
        .and_then(|()| writer.write_all(b"\n"))
        .and_then(|()| writer.flush())
        .map_err(|e| Error::io("write", path, e))?;

    debug!(path = %path.display(), "Wrote PEM file");
    Ok(())
}

fn create(path: &Path, private: bool) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn restrict_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}
