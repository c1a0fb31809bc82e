//! Secret values: loading, decryption and merging
//!
//! Secret value files are YAML mappings whose leaves are encrypted strings.
//! [`SecretStore`] reads any number of them, decrypts every leaf through a
//! [`SecretBackend`] and merges the results left-to-right into a
//! [`SecretDocument`] that only ever lives in memory.
//!
//! The default backend is [`AesGcmBackend`]: AES-256-GCM with a hex key taken
//! from `BERTH_SECRET_KEY` or the project's `.berth_secret_key` file.
//! Encrypted values are `hex(nonce || ciphertext || tag)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::error::SecretError;
use crate::values::Values;

/// Environment variable holding the hex-encoded secret key
pub const SECRET_KEY_ENV: &str = "BERTH_SECRET_KEY";

/// Project-local file holding the hex-encoded secret key
pub const SECRET_KEY_FILE: &str = ".berth_secret_key";

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

// =============================================================================
// CIPHER
// =============================================================================

/// Failure to decrypt or encrypt a single value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("value is not hex encoded")]
    Encoding,

    #[error("value is too short to be encrypted data")]
    Truncated,

    #[error("authentication failed (wrong key or corrupted value)")]
    Authentication,

    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

/// Decryption backend for secret values
pub trait SecretBackend: Send + Sync {
    /// Decrypt one encoded value
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, CipherError>;
}

/// AES-256-GCM backend
#[derive(Clone)]
pub struct AesGcmBackend {
    cipher: Aes256Gcm,
}

impl fmt::Debug for AesGcmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmBackend").finish_non_exhaustive()
    }
}

impl AesGcmBackend {
    /// Create from a 64-character hex key
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|_| CipherError::InvalidKey("key is not hex encoded".to_string()))?;
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Load the project key from `BERTH_SECRET_KEY` or `.berth_secret_key`
    pub fn from_project(project_dir: &Path) -> Result<Self, SecretError> {
        Self::from_key_sources(std::env::var(SECRET_KEY_ENV).ok(), project_dir)
    }

    fn from_key_sources(env_key: Option<String>, project_dir: &Path) -> Result<Self, SecretError> {
        let key_file = project_dir.join(SECRET_KEY_FILE);

        let (key, origin) = match env_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => (key, SECRET_KEY_ENV.to_string()),
            None if key_file.is_file() => {
                let key = std::fs::read_to_string(&key_file).map_err(|e| {
                    SecretError::access(key_file.display().to_string(), e.to_string())
                })?;
                (key, key_file.display().to_string())
            }
            None => {
                return Err(SecretError::access(
                    project_dir.display().to_string(),
                    format!(
                        "no secret key found: set {} or create {}",
                        SECRET_KEY_ENV, SECRET_KEY_FILE
                    ),
                ));
            }
        };

        Self::from_hex_key(&key).map_err(|e| SecretError::access(origin, e.to_string()))
    }

    /// Generate a fresh random key, hex encoded
    pub fn generate_key() -> String {
        hex::encode(Aes256Gcm::generate_key(OsRng))
    }

    /// Encrypt a value with a random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Authentication)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }
}

impl SecretBackend for AesGcmBackend {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, CipherError> {
        let bytes = hex::decode(ciphertext.trim()).map_err(|_| CipherError::Encoding)?;
        if bytes.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }

        let (nonce, data) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), data)
            .map_err(|_| CipherError::Authentication)?;

        String::from_utf8(plaintext)
            .map(SecretString::from)
            .map_err(|_| CipherError::Utf8)
    }
}

// =============================================================================
// SECRET DOCUMENT
// =============================================================================

/// Decrypted secret values keyed by dotted path
///
/// `Debug` never prints values.
#[derive(Default)]
pub struct SecretDocument {
    entries: BTreeMap<String, SecretString>,
}

impl SecretDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value for the key
    ///
    /// Entries nested below the key and scalar entries above it are dropped,
    /// so the document always describes a single tree.
    pub fn insert(&mut self, key: impl Into<String>, value: SecretString) {
        let key = key.into();
        let nested = format!("{}.", key);
        self.entries.retain(|existing, _| {
            !existing.starts_with(&nested) && !is_parent_path(existing, &key)
        });
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.entries.get(key)
    }

    /// Merge another document on top of this one (its values win)
    ///
    /// Same result as deep-merging the two value trees.
    pub fn merge(&mut self, overlay: SecretDocument) {
        for (key, value) in overlay.entries {
            self.insert(key, value);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expose the document as a nested values tree
    ///
    /// This is the only place secret values leave their wrapper; callers must
    /// not log the result.
    pub fn to_values(&self) -> crate::error::Result<Values> {
        let mut values = Values::new();
        for (key, value) in &self.entries {
            values.set(key, JsonValue::String(value.expose_secret().to_string()))?;
        }
        Ok(values)
    }
}

/// `parent` is a strict dotted prefix of `key` (`a` of `a.b`)
fn is_parent_path(parent: &str, key: &str) -> bool {
    key.strip_prefix(parent).is_some_and(|rest| rest.starts_with('.'))
}

impl Clone for SecretDocument {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), SecretString::from(v.expose_secret())))
            .collect();
        Self { entries }
    }
}

impl fmt::Debug for SecretDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretDocument")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// SECRET STORE
// =============================================================================

/// One secret values input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretInput {
    /// Encrypted YAML file
    File(PathBuf),
    /// Encrypted YAML document given inline
    Inline(String),
}

impl SecretInput {
    fn origin(&self, index: usize) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline(_) => format!("<inline #{}>", index + 1),
        }
    }

    async fn read(&self, index: usize) -> Result<(String, String), SecretError> {
        let origin = self.origin(index);
        match self {
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|content| (origin.clone(), content))
                .map_err(|e| SecretError::access(origin, e.to_string())),
            Self::Inline(content) => Ok((origin, content.clone())),
        }
    }
}

/// Loads and merges secret values for one project
pub struct SecretStore {
    project_dir: PathBuf,
    backend: Option<Arc<dyn SecretBackend>>,
}

impl SecretStore {
    /// Store using the project's AES-GCM key, loaded on first use
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            backend: None,
        }
    }

    /// Use an explicit backend instead of the project key
    pub fn with_backend(mut self, backend: Arc<dyn SecretBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    fn backend(&self) -> Result<Arc<dyn SecretBackend>, SecretError> {
        match &self.backend {
            Some(backend) => Ok(Arc::clone(backend)),
            None => Ok(Arc::new(AesGcmBackend::from_project(&self.project_dir)?)),
        }
    }

    /// Load, decrypt and merge inputs left-to-right
    ///
    /// No key material is needed when there are no inputs.
    pub async fn load(&self, inputs: &[SecretInput]) -> Result<SecretDocument, SecretError> {
        if inputs.is_empty() {
            return Ok(SecretDocument::new());
        }

        let backend = self.backend()?;

        let sources = futures::future::try_join_all(
            inputs.iter().enumerate().map(|(index, input)| input.read(index)),
        )
        .await?;

        let mut document = SecretDocument::new();
        for (origin, content) in sources {
            let layer = decrypt_document(&origin, &content, backend.as_ref())?;
            tracing::debug!(origin = %origin, keys = layer.len(), "loaded secret values");
            document.merge(layer);
        }

        Ok(document)
    }
}

/// Parse one encrypted YAML document and decrypt its leaves
fn decrypt_document(
    origin: &str,
    content: &str,
    backend: &dyn SecretBackend,
) -> Result<SecretDocument, SecretError> {
    let tree: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| SecretError::parse(origin, e.to_string()))?;

    let mut leaves = Vec::new();
    match tree {
        serde_yaml::Value::Null => {}
        serde_yaml::Value::Mapping(map) => flatten(origin, "", &map, &mut leaves)?,
        _ => {
            return Err(SecretError::parse(origin, "document must be a mapping"));
        }
    }

    let mut document = SecretDocument::new();
    for (key, encrypted) in leaves {
        let value = if encrypted.is_empty() {
            SecretString::from(String::new())
        } else {
            backend
                .decrypt(&encrypted)
                .map_err(|e| SecretError::access(origin, format!("key '{}': {}", key, e)))?
        };
        document.insert(key, value);
    }

    Ok(document)
}

/// One path segment of a secret values document
///
/// Dotted keys are rejected: secret paths are addressed with dots.
fn key_segment(origin: &str, key: &serde_yaml::Value) -> Result<String, SecretError> {
    let key = match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return Err(SecretError::parse(origin, "mapping keys must be scalars")),
    };
    if key.is_empty() || key.contains('.') {
        return Err(SecretError::parse(
            origin,
            format!("invalid key '{}' (keys must be non-empty and contain no dots)", key),
        ));
    }
    Ok(key)
}

fn flatten(
    origin: &str,
    prefix: &str,
    map: &serde_yaml::Mapping,
    out: &mut Vec<(String, String)>,
) -> Result<(), SecretError> {
    for (key, value) in map {
        let key = key_segment(origin, key)?;
        let path = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            serde_yaml::Value::Mapping(nested) => flatten(origin, &path, nested, out)?,
            serde_yaml::Value::String(s) => out.push((path, s.clone())),
            serde_yaml::Value::Null => out.push((path, String::new())),
            _ => {
                return Err(SecretError::parse(
                    origin,
                    format!("key '{}' must hold an encrypted string", path),
                ));
            }
        }
    }
    Ok(())
}

const INPUT_ORIGIN: &str = "<input>";

/// Encrypt every leaf of a plain YAML values document
///
/// Used by `berth secret encrypt`; output keeps the input's structure.
pub fn encrypt_document(plain: &str, backend: &AesGcmBackend) -> crate::error::Result<String> {
    fn encrypt_tree(
        value: serde_yaml::Value,
        backend: &AesGcmBackend,
    ) -> crate::error::Result<serde_yaml::Value> {
        Ok(match value {
            serde_yaml::Value::Mapping(map) => {
                let mut out = serde_yaml::Mapping::with_capacity(map.len());
                for (k, v) in map {
                    key_segment(INPUT_ORIGIN, &k)?;
                    out.insert(k, encrypt_tree(v, backend)?);
                }
                serde_yaml::Value::Mapping(out)
            }
            serde_yaml::Value::Null => serde_yaml::Value::Null,
            serde_yaml::Value::String(s) => encrypt_leaf(&s, backend)?,
            serde_yaml::Value::Bool(b) => encrypt_leaf(&b.to_string(), backend)?,
            serde_yaml::Value::Number(n) => encrypt_leaf(&n.to_string(), backend)?,
            _ => {
                return Err(SecretError::parse(INPUT_ORIGIN, "lists cannot be encrypted").into());
            }
        })
    }

    fn encrypt_leaf(
        plain: &str,
        backend: &AesGcmBackend,
    ) -> crate::error::Result<serde_yaml::Value> {
        backend
            .encrypt(plain)
            .map(serde_yaml::Value::String)
            .map_err(|e| SecretError::access(INPUT_ORIGIN, e.to_string()).into())
    }

    let tree: serde_yaml::Value = serde_yaml::from_str(plain)?;
    if !matches!(tree, serde_yaml::Value::Mapping(_) | serde_yaml::Value::Null) {
        return Err(SecretError::parse(INPUT_ORIGIN, "document must be a mapping").into());
    }
    Ok(serde_yaml::to_string(&encrypt_tree(tree, backend)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn backend() -> AesGcmBackend {
        AesGcmBackend::from_hex_key(&"11".repeat(32)).unwrap()
    }

    fn encrypted_yaml(pairs: &[(&str, &str)]) -> String {
        let backend = backend();
        pairs
            .iter()
            .map(|(k, v)| format!("{}: {}\n", k, backend.encrypt(v).unwrap()))
            .collect()
    }

    fn store() -> SecretStore {
        SecretStore::new("/nonexistent").with_backend(Arc::new(backend()))
    }

    fn expose(doc: &SecretDocument, key: &str) -> String {
        doc.get(key).unwrap().expose_secret().to_string()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let backend = backend();
        let encrypted = backend.encrypt("hunter2").unwrap();
        assert_ne!(encrypted, "hunter2");
        assert_eq!(backend.decrypt(&encrypted).unwrap().expose_secret(), "hunter2");
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let encrypted = backend().encrypt("hunter2").unwrap();
        let other = AesGcmBackend::from_hex_key(&"22".repeat(32)).unwrap();
        assert_eq!(other.decrypt(&encrypted).unwrap_err(), CipherError::Authentication);
    }

    #[test]
    fn test_decrypt_garbage() {
        assert_eq!(backend().decrypt("zz").unwrap_err(), CipherError::Encoding);
        assert_eq!(backend().decrypt("0011").unwrap_err(), CipherError::Truncated);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(AesGcmBackend::from_hex_key("not-hex").is_err());
        assert!(AesGcmBackend::from_hex_key("0011").is_err());
        assert_eq!(AesGcmBackend::generate_key().len(), 64);
    }

    #[test]
    fn test_key_from_project_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SECRET_KEY_FILE), format!("{}\n", "11".repeat(32))).unwrap();

        let loaded = AesGcmBackend::from_key_sources(None, dir.path()).unwrap();
        let encrypted = backend().encrypt("value").unwrap();
        assert_eq!(loaded.decrypt(&encrypted).unwrap().expose_secret(), "value");
    }

    #[test]
    fn test_missing_key_is_access_error() {
        let dir = TempDir::new().unwrap();
        let err = AesGcmBackend::from_key_sources(None, dir.path()).unwrap_err();
        assert!(matches!(err, SecretError::Access { .. }));
    }

    #[test]
    fn test_debug_redacts_values() {
        let mut doc = SecretDocument::new();
        doc.insert("db.password", SecretString::from("hunter2"));
        let debug = format!("{:?}", doc);
        assert!(debug.contains("db.password"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_load_no_inputs_needs_no_key() {
        let doc = SecretStore::new("/nonexistent").load(&[]).await.unwrap();
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn test_load_nested_document() {
        let backend = backend();
        let yaml = format!(
            "db:\n  password: {}\n  user: {}\nempty: \"\"\n",
            backend.encrypt("hunter2").unwrap(),
            backend.encrypt("admin").unwrap()
        );

        let doc = store().load(&[SecretInput::Inline(yaml)]).await.unwrap();

        assert_eq!(expose(&doc, "db.password"), "hunter2");
        assert_eq!(expose(&doc, "db.user"), "admin");
        assert_eq!(expose(&doc, "empty"), "");

        let values = doc.to_values().unwrap();
        assert_eq!(values.get("db.password").unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_later_input_wins() {
        let first = SecretInput::Inline(encrypted_yaml(&[("token", "one"), ("only_first", "a")]));
        let second = SecretInput::Inline(encrypted_yaml(&[("token", "two")]));

        let doc = store().load(&[first, second]).await.unwrap();
        assert_eq!(expose(&doc, "token"), "two");
        assert_eq!(expose(&doc, "only_first"), "a");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret-values.yaml");
        std::fs::write(&path, encrypted_yaml(&[("apiKey", "k-123")])).unwrap();

        let doc = store().load(&[SecretInput::File(path)]).await.unwrap();
        assert_eq!(expose(&doc, "apiKey"), "k-123");
    }

    #[tokio::test]
    async fn test_missing_file_is_access_error() {
        let err = store()
            .load(&[SecretInput::File(PathBuf::from("/nonexistent/secret.yaml"))])
            .await
            .unwrap_err();
        assert!(
            matches!(err, SecretError::Access { ref origin, .. } if origin.contains("secret.yaml"))
        );
    }

    #[tokio::test]
    async fn test_undecryptable_value_is_access_error() {
        let err = store()
            .load(&[SecretInput::Inline("token: deadbeef\n".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Access { .. }));
    }

    #[tokio::test]
    async fn test_malformed_documents_are_parse_errors() {
        for bad in ["- a\n- b\n", "token: [1, 2]\n", "a.b: x\n", "key: {unclosed\n"] {
            let err = store()
                .load(&[SecretInput::Inline(bad.to_string())])
                .await
                .unwrap_err();
            assert!(matches!(err, SecretError::Parse { .. }), "{bad:?} gave {err:?}");
        }
    }

    #[test]
    fn test_encrypt_document_roundtrip() {
        let backend = backend();
        let encrypted =
            encrypt_document("db:\n  password: hunter2\nport: 5432\n", &backend).unwrap();
        assert!(!encrypted.contains("hunter2"));

        let doc = decrypt_document("<test>", &encrypted, &backend).unwrap();
        assert_eq!(expose(&doc, "db.password"), "hunter2");
        assert_eq!(expose(&doc, "port"), "5432");
    }

    #[tokio::test]
    async fn test_later_scalar_replaces_earlier_mapping() {
        let backend = backend();
        let first = format!("a:\n  b: {}\n", backend.encrypt("early").unwrap());
        let second = format!("a: {}\n", backend.encrypt("late").unwrap());

        let doc = store()
            .load(&[SecretInput::Inline(first), SecretInput::Inline(second)])
            .await
            .unwrap();

        assert!(doc.get("a.b").is_none());
        let values = doc.to_values().unwrap();
        assert_eq!(values.get("a").unwrap(), "late");
    }

    #[tokio::test]
    async fn test_later_mapping_replaces_earlier_scalar() {
        let backend = backend();
        let first = format!(
            "a: {}\nc:\n  d: {}\n  e: {}\n",
            backend.encrypt("early").unwrap(),
            backend.encrypt("kept").unwrap(),
            backend.encrypt("old").unwrap()
        );
        let second = format!(
            "a:\n  b: {}\nc:\n  e: {}\n",
            backend.encrypt("late").unwrap(),
            backend.encrypt("new").unwrap()
        );

        let doc = store()
            .load(&[SecretInput::Inline(first), SecretInput::Inline(second)])
            .await
            .unwrap();

        let values = doc.to_values().unwrap();
        assert_eq!(values.get("a.b").unwrap(), "late");
        assert_eq!(values.get("c.d").unwrap(), "kept");
        assert_eq!(values.get("c.e").unwrap(), "new");
    }

    #[test]
    fn test_encrypt_document_rejects_dotted_keys() {
        for bad in ["tls.crt: abc\n", "tls:\n  ca.crt: abc\n", "'': abc\n"] {
            let err = encrypt_document(bad, &backend()).unwrap_err();
            assert!(err.to_string().contains("invalid key"), "{bad:?} gave {err}");
        }
        assert!(encrypt_document("just a string\n", &backend()).is_err());
    }

    #[tokio::test]
    async fn test_encrypted_document_loads() {
        let plain = "tls:\n  crt: abc\n  key: def\nreplicas: 2\n";
        let encrypted = encrypt_document(plain, &backend()).unwrap();

        let doc = store().load(&[SecretInput::Inline(encrypted)]).await.unwrap();

        assert_eq!(expose(&doc, "tls.crt"), "abc");
        assert_eq!(expose(&doc, "tls.key"), "def");
        assert_eq!(expose(&doc, "replicas"), "2");
    }

    fn layer(entries: &[(String, String)]) -> SecretDocument {
        let mut doc = SecretDocument::new();
        for (k, v) in entries {
            doc.insert(k.clone(), SecretString::from(v.clone()));
        }
        doc
    }

    // Paths over a two-letter alphabet so that layers collide on prefixes
    fn entries() -> impl Strategy<Value = Vec<(String, String)>> {
        proptest::collection::vec(("[ab](\\.[ab]){0,2}", "[a-z0-9]{0,8}"), 0..8)
    }

    proptest! {
        #[test]
        fn prop_merge_matches_deep_merge(first in entries(), second in entries()) {
            let earlier = layer(&first);
            let later = layer(&second);

            let mut expected = earlier.to_values().unwrap();
            expected.merge(&later.to_values().unwrap());

            let mut merged = earlier.clone();
            merged.merge(later.clone());

            prop_assert_eq!(merged.to_values().unwrap(), expected);
            for key in later.keys() {
                prop_assert_eq!(
                    merged.get(key).unwrap().expose_secret(),
                    later.get(key).unwrap().expose_secret()
                );
            }
        }
    }
}
