//! Credential files.
//!
//! A file holds one credential, `{"type": "...", "data": {...}}`, or a JSON
//! array of them. Values are read into memory for a single command and never
//! printed.

use std::path::Path;

use serde::Deserialize;
use toolgate_core::Credential;

use crate::error::CliError;

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialFile {
    One(Credential),
    Many(Vec<Credential>),
}

fn read(path: &Path) -> Result<CredentialFile, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| {
        CliError::Arguments(format!("Invalid credential file {}: {e}", path.display()))
    })
}

/// Load a file that must hold exactly one credential.
pub fn load_credential(path: &Path) -> Result<Credential, CliError> {
    match read(path)? {
        CredentialFile::One(credential) => Ok(credential),
        CredentialFile::Many(mut list) if list.len() == 1 => Ok(list.remove(0)),
        CredentialFile::Many(list) => Err(CliError::Arguments(format!(
            "Expected one credential in {}, found {}",
            path.display(),
            list.len()
        ))),
    }
}

/// Load every credential in a file.
pub fn load_credentials(path: &Path) -> Result<Vec<Credential>, CliError> {
    Ok(match read(path)? {
        CredentialFile::One(credential) => vec![credential],
        CredentialFile::Many(list) => list,
    })
}
