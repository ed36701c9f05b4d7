//! Signature verification.
//!
//! The algorithm family is pinned by the resolved key, never by the token
//! header alone. The signature is checked over the raw signing input, and
//! only then is the payload decoded into claims.

use crate::auth::claims::Claims;
use crate::auth::keys::Jwk;
use crate::errors::GateError;
use common::jwt::{decode_ed25519_public_key_jwk, decode_segment_json, TokenParts, UnverifiedHeader};
use jsonwebtoken::{crypto, Algorithm, DecodingKey};
use std::str::FromStr;

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Algorithms a key may verify, derived from its type and curve.
///
/// Symmetric (`oct`) keys and unknown key types verify nothing.
pub fn allowed_algorithms(jwk: &Jwk) -> &'static [Algorithm] {
    match (jwk.kty.as_str(), jwk.crv.as_deref()) {
        ("RSA", _) => RSA_ALGORITHMS,
        ("EC", Some("P-256")) => &[Algorithm::ES256],
        ("EC", Some("P-384")) => &[Algorithm::ES384],
        ("OKP", Some("Ed25519")) => &[Algorithm::EdDSA],
        _ => &[],
    }
}

/// Verify the token signature with `jwk` and return the decoded claims.
///
/// # Errors
///
/// - `GateError::InvalidSignature` if the key is not a signing key, the
///   header algorithm is outside the key's family or differs from the key's
///   declared `alg`, the key material is unusable, or the signature does
///   not verify
/// - `GateError::MalformedToken` if the verified payload is not a JSON
///   object with `sub` and `exp`
pub fn verify_signature(
    parts: &TokenParts<'_>,
    header: &UnverifiedHeader,
    jwk: &Jwk,
) -> Result<Claims, GateError> {
    if let Some(key_use) = jwk.key_use.as_deref() {
        if key_use != "sig" {
            return Err(GateError::InvalidSignature(format!(
                "key use '{}' is not 'sig'",
                key_use
            )));
        }
    }

    let algorithm = Algorithm::from_str(&header.alg).map_err(|_| {
        tracing::debug!(target: "gate.auth.verify", alg = %header.alg, "Unsupported token algorithm");
        GateError::InvalidSignature(format!("unsupported algorithm '{}'", header.alg))
    })?;

    if !allowed_algorithms(jwk).contains(&algorithm) {
        tracing::warn!(
            target: "gate.auth.verify",
            alg = %header.alg,
            kty = %jwk.kty,
            "Token algorithm not permitted for key type"
        );
        return Err(GateError::InvalidSignature(format!(
            "algorithm '{}' not permitted for key type '{}'",
            header.alg, jwk.kty
        )));
    }

    if let Some(key_alg) = jwk.alg.as_deref() {
        if key_alg != header.alg {
            return Err(GateError::InvalidSignature(format!(
                "token algorithm '{}' does not match key algorithm '{}'",
                header.alg, key_alg
            )));
        }
    }

    let decoding_key = decoding_key(jwk)?;

    let valid = crypto::verify(
        parts.signature,
        parts.signing_input.as_bytes(),
        &decoding_key,
        algorithm,
    )
    .map_err(|e| {
        tracing::debug!(target: "gate.auth.verify", error = %e, "Signature verification errored");
        GateError::InvalidSignature(e.to_string())
    })?;

    if !valid {
        tracing::debug!(target: "gate.auth.verify", kid = %header.kid, "Signature mismatch");
        return Err(GateError::InvalidSignature(
            "signature does not match".to_string(),
        ));
    }

    decode_segment_json::<Claims>(parts.payload).map_err(|_| {
        GateError::MalformedToken("payload is not a valid claims object".to_string())
    })
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, GateError> {
    let missing = |member: &str| {
        GateError::InvalidSignature(format!("{} key is missing '{}'", jwk.kty, member))
    };
    let unusable = |e: String| GateError::InvalidSignature(format!("unusable key material: {}", e));

    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            DecodingKey::from_rsa_components(n, e).map_err(|e| unusable(e.to_string()))
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            DecodingKey::from_ec_components(x, y).map_err(|e| unusable(e.to_string()))
        }
        "OKP" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let public_key = decode_ed25519_public_key_jwk(x).map_err(|e| unusable(e.to_string()))?;
            if public_key.len() != 32 {
                return Err(unusable(format!(
                    "Ed25519 key must be 32 bytes, got {}",
                    public_key.len()
                )));
            }
            Ok(DecodingKey::from_ed_der(&public_key))
        }
        other => Err(GateError::InvalidSignature(format!(
            "unsupported key type '{}'",
            other
        ))),
    }
}
