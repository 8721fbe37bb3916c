//! Signature verification and clearsigning through GnuPG.

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use bckit_domain::{extract_signed_payload, ClearsignError};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("`{tool}` was not found; install it or point {env} at it")]
    ToolNotFound { tool: &'static str, env: &'static str },
    #[error("failed to run gpg: {0}")]
    Io(#[from] io::Error),
    #[error("gpg {operation} failed: {stderr}")]
    Failed {
        operation: &'static str,
        stderr: String,
    },
    #[error("signature verification failed: {0}")]
    Invalid(String),
    #[error(transparent)]
    Envelope(#[from] ClearsignError),
}

/// Trust store used to check and produce cleartext signatures.
pub trait Keyring: Send + Sync {
    /// Add a public key to the set of trusted signers.
    fn import_key(&self, path: &Path) -> Result<(), SignatureError>;

    /// Verify a cleartext-signed document and return its signed payload.
    fn verify(&self, signed: &str) -> Result<String, SignatureError>;

    /// Produce a cleartext-signed document for `payload`.
    fn clearsign(&self, payload: &str) -> Result<String, SignatureError>;
}

/// Shells out to `gpg`.
#[derive(Debug, Clone, Default)]
pub struct GpgKeyring {
    program: Option<PathBuf>,
    home: Option<PathBuf>,
    signing_key: Option<String>,
}

impl GpgKeyring {
    pub fn new(program: Option<PathBuf>, home: Option<PathBuf>, signing_key: Option<String>) -> Self {
        Self {
            program,
            home,
            signing_key,
        }
    }

    fn program(&self) -> Result<PathBuf, SignatureError> {
        if let Some(program) = &self.program {
            return Ok(program.clone());
        }
        which::which("gpg")
            .or_else(|_| which::which("gpg2"))
            .map_err(|_| SignatureError::ToolNotFound {
                tool: "gpg",
                env: "BCKIT_GPG",
            })
    }

    fn run<I, S>(&self, operation: &'static str, args: I) -> Result<Output, SignatureError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(self.program()?);
        cmd.arg("--batch").arg("--no-tty").args(args);
        if let Some(home) = &self.home {
            cmd.env("GNUPGHOME", home);
        }
        debug!(operation, "running gpg");
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(SignatureError::Failed {
                operation,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn scratch(contents: &str) -> Result<NamedTempFile, SignatureError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

impl Keyring for GpgKeyring {
    fn import_key(&self, path: &Path) -> Result<(), SignatureError> {
        self.run("import", [OsStr::new("--import"), path.as_os_str()])?;
        Ok(())
    }

    fn verify(&self, signed: &str) -> Result<String, SignatureError> {
        let payload = extract_signed_payload(signed)?;
        let file = Self::scratch(signed)?;
        match self.run("verify", [OsStr::new("--verify"), file.path().as_os_str()]) {
            Ok(_) => Ok(payload),
            Err(SignatureError::Failed { stderr, .. }) => Err(SignatureError::Invalid(stderr)),
            Err(err) => Err(err),
        }
    }

    fn clearsign(&self, payload: &str) -> Result<String, SignatureError> {
        let file = Self::scratch(payload)?;
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--yes"),
            OsStr::new("--armor"),
            OsStr::new("--output"),
            OsStr::new("-"),
        ];
        if let Some(key) = &self.signing_key {
            args.push(OsStr::new("--local-user"));
            args.push(OsStr::new(key));
        }
        args.push(OsStr::new("--clearsign"));
        args.push(file.path().as_os_str());
        let output = self.run("clearsign", args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_reported() {
        let keyring = GpgKeyring::new(
            Some(PathBuf::from("/definitely/not/gpg")),
            None,
            None,
        );
        let err = keyring
            .import_key(Path::new("/tmp/key.pub"))
            .expect_err("no gpg");
        assert!(matches!(err, SignatureError::Io(_)));
    }

    #[test]
    fn unsigned_documents_fail_before_running_gpg() {
        let keyring = GpgKeyring::new(Some(PathBuf::from("/definitely/not/gpg")), None, None);
        assert!(matches!(
            keyring.verify("{\"spec\": {}}"),
            Err(SignatureError::Envelope(ClearsignError::NotSigned))
        ));
    }
}
