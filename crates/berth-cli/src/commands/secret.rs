//! Secret commands - manage the project key and encrypted values files

use berth_core::secrets::{SECRET_KEY_ENV, SECRET_KEY_FILE, encrypt_document};
use berth_core::{AesGcmBackend, SecretInput, SecretStore};
use console::style;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CliError, Result};

/// Write a new key to `<dir>/.berth_secret_key`, or print it
pub fn generate_key(dir: &Path, force: bool, print: bool) -> Result<()> {
    let key = AesGcmBackend::generate_key();
    if print {
        println!("{}", key);
        return Ok(());
    }

    let path = dir.join(SECRET_KEY_FILE);
    if path.exists() && !force {
        return Err(CliError::usage_with_help(
            format!("{} already exists", path.display()),
            "use --force to replace it (existing secrets become unreadable)",
        ));
    }

    fs::write(&path, format!("{}\n", key))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    eprintln!(
        "{} Wrote secret key to {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    eprintln!(
        "{}",
        style(format!(
            "Keep it out of version control; in CI, pass it through {}.",
            SECRET_KEY_ENV
        ))
        .dim()
    );
    Ok(())
}

fn backend(dir: &Path, key: Option<&str>) -> Result<AesGcmBackend> {
    match key {
        Some(key) => AesGcmBackend::from_hex_key(key)
            .map_err(|e| CliError::secret(format!("invalid secret key: {}", e))),
        None => Ok(AesGcmBackend::from_project(dir)?),
    }
}

/// Encrypt every value of a plain YAML file
pub fn encrypt(dir: &Path, key: Option<&str>, file: &Path, output: Option<&Path>) -> Result<()> {
    let backend = backend(dir, key)?;
    let plain = fs::read_to_string(file)?;
    let encrypted = encrypt_document(&plain, &backend)?;

    match output {
        Some(path) => fs::write(path, encrypted)?,
        None => print!("{}", encrypted),
    }
    Ok(())
}

/// Decrypt an encrypted values file and print it as plain YAML
pub async fn decrypt(dir: &Path, key: Option<&str>, file: &Path) -> Result<()> {
    let store = SecretStore::new(dir).with_backend(Arc::new(backend(dir, key)?));
    let document = store.load(&[SecretInput::File(file.to_path_buf())]).await?;
    print!("{}", document.to_values()?.to_yaml()?);
    Ok(())
}
