//! `validate-credential`: injector pre-flight check.

use std::path::Path;

use crate::bootstrap::CliContext;
use crate::credentials::load_credential;
use crate::error::CliError;

pub fn execute(ctx: &CliContext, credential_type: &str, file: &Path) -> Result<(), CliError> {
    let credential = load_credential(file)?;

    let mut problems = Vec::new();
    if credential.credential_type != credential_type {
        problems.push(format!(
            "File holds a '{}' credential, expected '{credential_type}'",
            credential.credential_type
        ));
    }
    problems.extend(ctx.gateway().injector().validate(credential_type, &credential.data));

    if problems.is_empty() {
        println!("Credential '{credential_type}' looks usable.");
        return Ok(());
    }

    for problem in &problems {
        println!("  - {problem}");
    }
    Err(CliError::Config(format!(
        "{} problem(s) with '{credential_type}' credential",
        problems.len()
    )))
}
