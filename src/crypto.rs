//! Crypto backend interface
//!
//! The store never encrypts or decrypts anything itself; it hands bytes
//! to a backend and treats any non-success uniformly as a failure. The
//! shipped backend shells out to gpg, but anything implementing
//! [`CryptoBackend`] is substitutable.

use crate::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Narrow interface to an opaque encryption backend.
///
/// Implementations may be slow or blocking; callers must not assume any
/// caching or retry behavior.
pub trait CryptoBackend: Send + Sync {
    /// Encrypt plaintext for the given recipient identity
    fn encrypt(&self, plain: &[u8], recipient: &str) -> Result<Vec<u8>>;

    /// Decrypt ciphertext produced by `encrypt`
    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>>;
}

/// Backend that pipes bytes through the gpg command-line tool
pub struct GpgBackend {
    program: String,
}

impl GpgBackend {
    pub fn new() -> Self {
        GpgBackend {
            program: "gpg2".to_string(),
        }
    }

    /// Use a different gpg-compatible executable
    pub fn with_program(program: impl Into<String>) -> Self {
        GpgBackend {
            program: program.into(),
        }
    }

    /// Run the program with the given args, feeding `input` on stdin and
    /// returning stdout. Any spawn/pipe/exit-status problem is a
    /// `CryptoFailure`.
    fn run(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CryptoFailure(format!("Failed to spawn {}: {}", self.program, e)))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| Error::CryptoFailure("Failed to open stdin pipe".to_string()))?;
            stdin
                .write_all(input)
                .map_err(|e| Error::CryptoFailure(format!("Failed to write to {}: {}", self.program, e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::CryptoFailure(format!("Failed to wait for {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::CryptoFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}

impl Default for GpgBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoBackend for GpgBackend {
    fn encrypt(&self, plain: &[u8], recipient: &str) -> Result<Vec<u8>> {
        self.run(
            &[
                "--quiet", "--yes", "--batch", "--encrypt", "--recipient", recipient, "--output",
                "-",
            ],
            plain,
        )
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>> {
        self.run(&["--quiet", "--yes", "--batch", "--decrypt"], cipher)
    }
}

/// Reversible mock backend for tests. The "ciphertext" is a header line
/// followed by the xor-masked payload, so cipher length never equals
/// plaintext length.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    const HEADER: &[u8] = b"SEALFS-MOCK\n";
    const MASK: u8 = 0x5a;

    pub struct MockBackend;

    impl CryptoBackend for MockBackend {
        fn encrypt(&self, plain: &[u8], _recipient: &str) -> Result<Vec<u8>> {
            let mut out = HEADER.to_vec();
            out.extend(plain.iter().map(|b| b ^ MASK));
            Ok(out)
        }

        fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>> {
            let payload = cipher
                .strip_prefix(HEADER)
                .ok_or_else(|| Error::CryptoFailure("Bad mock header".to_string()))?;
            Ok(payload.iter().map(|b| b ^ MASK).collect())
        }
    }

    /// Backend whose every operation fails
    pub struct FailingBackend;

    impl CryptoBackend for FailingBackend {
        fn encrypt(&self, _plain: &[u8], _recipient: &str) -> Result<Vec<u8>> {
            Err(Error::CryptoFailure("Encrypt refused".to_string()))
        }

        fn decrypt(&self, _cipher: &[u8]) -> Result<Vec<u8>> {
            Err(Error::CryptoFailure("Decrypt refused".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBackend;
    use super::*;

    #[test]
    fn test_mock_roundtrip() {
        let backend = MockBackend;
        let cipher = backend.encrypt(b"hello", "someone").unwrap();

        assert_ne!(cipher.len(), 5);
        assert_eq!(backend.decrypt(&cipher).unwrap(), b"hello");
    }

    #[test]
    fn test_mock_rejects_garbage() {
        let backend = MockBackend;
        assert!(matches!(
            backend.decrypt(b"not a mock blob"),
            Err(Error::CryptoFailure(_))
        ));
    }

    #[test]
    fn test_missing_program_is_crypto_failure() {
        let backend = GpgBackend::with_program("sealfs-no-such-binary");
        let err = backend.encrypt(b"data", "someone").unwrap_err();
        assert!(matches!(err, Error::CryptoFailure(_)));
    }
}
