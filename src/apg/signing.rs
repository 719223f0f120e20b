// src/apg/signing.rs
//! Detached archive signatures
//!
//! Two backends sit behind [`PackageSigner`]:
//! - `sq`: OpenPGP via the Sequoia command-line tool
//! - `ed25519`: in-process, writes a JSON signature document
//!
//! The secret key comes from an environment variable or a key file and is
//! only ever held in zeroizing buffers. When `sq` needs the key on disk it
//! gets a private temporary file that is overwritten and unlinked when the
//! guard drops, on success and failure alike. Key material never reaches a
//! log line or an error message.

use crate::config::{SigningBackend, SigningSection};
use crate::error::{Error, Result, Stage};
use crate::kitchen::runner::{CommandRunner, CommandSpec};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Result of signing one archive
#[derive(Debug, Clone)]
pub struct SignatureArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub backend: SigningBackend,
    pub key_id: Option<String>,
}

/// `<archive>.sig`
pub fn signature_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

pub trait PackageSigner: Send + Sync {
    fn backend(&self) -> SigningBackend;

    /// Write `<archive>.sig`; the archive itself is never modified
    fn sign(&self, archive: &Path, runner: &CommandRunner) -> Result<SignatureArtifact>;
}

/// Build the signer the configuration asks for; `None` when signing is off
pub fn signer_from_config(config: &SigningSection) -> Option<Box<dyn PackageSigner>> {
    if !config.enabled {
        return None;
    }
    let source = KeySource::from_config(config);
    Some(match config.backend {
        SigningBackend::Sq => Box::new(SqSigner {
            program: config.sq_program.clone(),
            source,
            key_id: config.key_id.clone(),
        }),
        SigningBackend::Ed25519 => Box::new(Ed25519Signer {
            source,
            key_id: config.key_id.clone(),
        }),
    })
}

/// Where the secret key is read from
#[derive(Debug, Clone)]
pub struct KeySource {
    pub env_var: String,
    pub file: Option<PathBuf>,
}

impl KeySource {
    pub fn from_config(config: &SigningSection) -> Self {
        Self {
            env_var: config.key_env.clone(),
            file: config.key_file.clone(),
        }
    }

    /// Load the key; the environment variable wins over the file
    pub fn load(&self) -> Result<SecretKey> {
        if let Some(value) = std::env::var_os(&self.env_var) {
            use std::os::unix::ffi::OsStringExt;
            let bytes = Zeroizing::new(value.into_vec());
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Err(Error::Signing(format!("${} is empty", self.env_var)));
            }
            debug!("Signing key taken from ${}", self.env_var);
            return Ok(SecretKey(bytes));
        }
        if let Some(path) = &self.file {
            let bytes = Zeroizing::new(fs::read(path).map_err(|e| {
                Error::Signing(format!("cannot read key file {}: {}", path.display(), e))
            })?);
            if bytes.is_empty() {
                return Err(Error::Signing(format!("key file {} is empty", path.display())));
            }
            debug!("Signing key taken from {}", path.display());
            return Ok(SecretKey(bytes));
        }
        Err(Error::Signing(format!(
            "no signing key: set ${} or signing.key_file",
            self.env_var
        )))
    }
}

/// Secret key bytes, wiped on drop
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Key written to a private file for an external tool
///
/// Dropping the guard overwrites the file with zeros and unlinks it.
struct EphemeralKeyFile {
    path: PathBuf,
    len: usize,
}

impl EphemeralKeyFile {
    fn create(path: PathBuf, key: &SecretKey) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| Error::Signing(format!("cannot create temporary key file: {}", e)))?;
        let guard = Self {
            path,
            len: key.expose().len(),
        };
        file.write_all(key.expose())
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::Signing(format!("cannot write temporary key file: {}", e)))?;
        Ok(guard)
    }
}

impl Drop for EphemeralKeyFile {
    fn drop(&mut self) {
        if let Ok(mut file) = OpenOptions::new().write(true).open(&self.path) {
            let _ = file.write_all(&vec![0u8; self.len]);
            let _ = file.sync_all();
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove temporary key file: {}", e);
        }
    }
}

/// Write the signature next to the archive, atomically
fn write_signature(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::Signing(format!("cannot create signature file: {}", e)))?;
    temp.write_all(bytes)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| Error::Signing(format!("cannot write signature: {}", e)))?;
    temp.persist(path)
        .map_err(|e| Error::Signing(format!("cannot move signature into place: {}", e)))?;
    Ok(())
}

/// OpenPGP signing through `sq sign --detached`
pub struct SqSigner {
    pub program: String,
    pub source: KeySource,
    pub key_id: Option<String>,
}

impl PackageSigner for SqSigner {
    fn backend(&self) -> SigningBackend {
        SigningBackend::Sq
    }

    fn sign(&self, archive: &Path, runner: &CommandRunner) -> Result<SignatureArtifact> {
        if !archive.is_file() {
            return Err(Error::Signing(format!("{} does not exist", archive.display())));
        }
        let key = self.source.load()?;

        let scratch = tempfile::Builder::new()
            .prefix("apger-sign-")
            .tempdir()
            .map_err(|e| Error::Signing(format!("cannot create scratch directory: {}", e)))?;
        let key_file = EphemeralKeyFile::create(scratch.path().join("signer.key"), &key)?;
        drop(key);
        let output = scratch.path().join("signature.asc");

        let spec = CommandSpec::new(&self.program)
            .args(["sign", "--detached", "--signer-file"])
            .arg(key_file.path.to_string_lossy())
            .arg("--output")
            .arg(output.to_string_lossy())
            .arg(archive.to_string_lossy());
        let result = runner.run(&spec, Stage::Signing)?;
        drop(key_file);

        if !result.success {
            return Err(Error::Signing(format!(
                "{} sign failed: {}",
                self.program,
                result.tail(5)
            )));
        }
        let bytes = fs::read(&output)
            .map_err(|e| Error::Signing(format!("{} produced no signature: {}", self.program, e)))?;

        let path = signature_path(archive);
        write_signature(&path, &bytes)?;
        info!("Signed {} with sq", archive.display());
        Ok(SignatureArtifact {
            path,
            bytes,
            backend: SigningBackend::Sq,
            key_id: self.key_id.clone(),
        })
    }
}

/// JSON signature document written by the ed25519 backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519SignatureDoc {
    pub algorithm: String,
    pub signature: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Private or public key file
#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    algorithm: String,
    key: String,
    #[serde(default)]
    key_id: Option<String>,
}

/// In-process Ed25519 signing
pub struct Ed25519Signer {
    pub source: KeySource,
    pub key_id: Option<String>,
}

impl Ed25519Signer {
    /// Accepts a TOML key file (`algorithm`/`key`/`key_id`) or a bare base64 seed
    fn signing_key(key: &SecretKey) -> Result<(SigningKey, Option<String>)> {
        let malformed = || Error::Signing("malformed ed25519 key".to_string());
        let text = std::str::from_utf8(key.expose()).map_err(|_| malformed())?;

        let (encoded, key_id) = match toml::from_str::<KeyFile>(text) {
            Ok(file) if file.algorithm == "ed25519" => (Zeroizing::new(file.key), file.key_id),
            Ok(_) => return Err(Error::Signing("key file is not an ed25519 key".into())),
            Err(_) => (Zeroizing::new(text.trim().to_string()), None),
        };
        let bytes = Zeroizing::new(BASE64.decode(encoded.as_bytes()).map_err(|_| malformed())?);
        let seed: Zeroizing<[u8; 32]> =
            Zeroizing::new(bytes.as_slice().try_into().map_err(|_| malformed())?);
        Ok((SigningKey::from_bytes(&seed), key_id))
    }
}

impl PackageSigner for Ed25519Signer {
    fn backend(&self) -> SigningBackend {
        SigningBackend::Ed25519
    }

    fn sign(&self, archive: &Path, runner: &CommandRunner) -> Result<SignatureArtifact> {
        let content = fs::read(archive)
            .map_err(|e| Error::Signing(format!("cannot read {}: {}", archive.display(), e)))?;
        let (signing_key, file_key_id) = Self::signing_key(&self.source.load()?)?;
        runner.deadline().check(Stage::Signing)?;

        let key_id = self.key_id.clone().or(file_key_id);
        let signature = signing_key.sign(&content);
        let doc = Ed25519SignatureDoc {
            algorithm: "ed25519".to_string(),
            signature: BASE64.encode(signature.to_bytes()),
            public_key: BASE64.encode(signing_key.verifying_key().as_bytes()),
            key_id: key_id.clone(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| Error::Signing(format!("cannot encode signature: {}", e)))?;

        let path = signature_path(archive);
        write_signature(&path, &bytes)?;
        info!("Signed {} with ed25519", archive.display());
        Ok(SignatureArtifact {
            path,
            bytes,
            backend: SigningBackend::Ed25519,
            key_id,
        })
    }
}

/// Check an ed25519 signature document against archive bytes
///
/// With `trusted_key` set, the embedded public key must match it.
pub fn verify_ed25519(content: &[u8], doc: &Ed25519SignatureDoc, trusted_key: Option<&str>) -> Result<()> {
    if doc.algorithm != "ed25519" {
        return Err(Error::Signing(format!("unsupported algorithm '{}'", doc.algorithm)));
    }
    if let Some(trusted) = trusted_key
        && trusted != doc.public_key
    {
        return Err(Error::Signing("signature made by an untrusted key".into()));
    }
    let key_bytes: [u8; 32] = BASE64
        .decode(&doc.public_key)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Signing("invalid public key".into()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::Signing(format!("invalid public key: {}", e)))?;
    let sig_bytes = BASE64
        .decode(&doc.signature)
        .map_err(|_| Error::Signing("invalid signature encoding".into()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| Error::Signing(format!("invalid signature: {}", e)))?;
    key.verify_strict(content, &signature)
        .map_err(|_| Error::Signing("signature does not match archive".into()))
}

/// Generate an ed25519 key pair and write both halves as TOML key files
///
/// The private file is created with mode 0600. Returns the base64 public key.
pub fn generate_keypair(private_path: &Path, public_path: &Path, key_id: Option<&str>) -> Result<String> {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key = BASE64.encode(signing_key.verifying_key().as_bytes());

    let private = Zeroizing::new(
        toml::to_string_pretty(&KeyFile {
            algorithm: "ed25519".into(),
            key: BASE64.encode(signing_key.to_bytes()),
            key_id: key_id.map(str::to_string),
        })
        .map_err(|e| Error::Signing(format!("cannot encode key: {}", e)))?,
    );
    let public = toml::to_string_pretty(&KeyFile {
        algorithm: "ed25519".into(),
        key: public_key.clone(),
        key_id: key_id.map(str::to_string),
    })
    .map_err(|e| Error::Signing(format!("cannot encode key: {}", e)))?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(private_path)
        .map_err(|e| {
            Error::Signing(format!("cannot create {}: {}", private_path.display(), e))
        })?;
    file.write_all(private.as_bytes())?;
    fs::write(public_path, public)?;
    Ok(public_key)
}

/// Read the `key` field of a public key file
pub fn load_public_key(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Signing(format!("cannot read {}: {}", path.display(), e)))?;
    let file: KeyFile = toml::from_str(&content)
        .map_err(|e| Error::Signing(format!("cannot parse {}: {}", path.display(), e)))?;
    Ok(file.key)
}
