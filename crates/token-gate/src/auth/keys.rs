//! Key-set document parsing and key resolution.

use crate::errors::GateError;
use serde::Deserialize;

/// JSON Web Key from a key-set document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", "OKP").
    pub kty: String,

    /// Key ID. Entries without one can never be selected.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is restricted to, if declared.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name (EC and OKP keys).
    #[serde(default)]
    pub crv: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

#[derive(Deserialize)]
struct KeySetDocument {
    keys: Vec<serde_json::Value>,
}

/// Parsed key set. Keys keep document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<Jwk>,
}

impl KeySet {
    /// Key set holding `keys` in the given order.
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Parse a raw key-set document.
    ///
    /// Entries that are not usable JWKs (not an object, no string `kty`,
    /// non-string members) are skipped with a warning so one bad entry
    /// cannot take the other keys down with it.
    ///
    /// # Errors
    ///
    /// Returns `GateError::MalformedKeySet` if the document is not a JSON
    /// object with a `keys` array.
    pub fn from_document(document: &[u8]) -> Result<Self, GateError> {
        let malformed = |e: String| {
            tracing::error!(target: "gate.auth.jwks", error = %e, "Failed to parse key set");
            GateError::MalformedKeySet(e)
        };

        let value: serde_json::Value =
            serde_json::from_slice(document).map_err(|e| malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(malformed("document is not a JSON object".to_string()));
        }
        let parsed: KeySetDocument =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

        let keys = parsed
            .keys
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Jwk>(entry) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    tracing::warn!(
                        target: "gate.auth.jwks",
                        index = index,
                        error = %e,
                        "Skipping unusable key-set entry"
                    );
                    None
                }
            })
            .collect();

        Ok(Self::new(keys))
    }

    /// Look up a key by the (untrusted) kid from a token header.
    ///
    /// The first entry with a matching kid wins.
    pub fn resolve(&self, kid: &str) -> Result<&Jwk, GateError> {
        self.keys
            .iter()
            .find(|key| key.kid.as_deref() == Some(kid))
            .ok_or_else(|| GateError::KeyNotFound(kid.to_string()))
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the document held no usable keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
