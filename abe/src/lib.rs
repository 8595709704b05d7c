//! Attribute-policy gated envelope encryption for medical record payloads.
//!
//! This is a policy-matching gate layered on AES-256-CBC, not a real
//! attribute-based encryption scheme: the symmetric key is stored in the
//! clear next to the ciphertext, and the policy is enforced by the
//! [`decrypt`] check alone. Callers that need the historical contract
//! (including that weakness) must not "harden" it here.

use std::collections::BTreeMap;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod policy;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

/// Errors from the envelope codec. A policy mismatch is NOT an error; it is
/// the `Ok(None)` outcome of [`decrypt`]. Errors mean the stored envelope
/// itself is unusable.
#[derive(Debug, Error)]
pub enum AbeError {
    #[error("malformed policy string: {0:?}")]
    MalformedPolicy(String),
    #[error("encryption key is not a valid 256-bit hex string")]
    InvalidKey,
    #[error("ciphertext is not a valid base64 IV-prefixed blob")]
    InvalidCiphertext,
    #[error("ciphertext failed to decrypt")]
    DecryptFailed,
    #[error("payload serialization failed: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// The persisted shape of an encrypted record payload.
///
/// `encrypted_data` is base64(IV || AES-256-CBC/PKCS7 ciphertext) of the
/// JSON payload. `encrypted_key` is the hex of the raw key, stored
/// unprotected. `policy` is the AND-only conjunction produced by
/// [`policy::generate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub encrypted_data: String,
    pub encrypted_key: String,
    pub policy: String,
}

/// Encrypt `payload` under a fresh random key, bound to `attributes`.
///
/// Every attribute pair present at encryption time becomes a mandatory
/// conjunct of the policy.
pub fn encrypt(
    payload: &Value,
    attributes: &BTreeMap<String, String>,
) -> Result<EncryptedEnvelope, AbeError> {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let plaintext = serde_json::to_vec(payload)?;
    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);

    Ok(EncryptedEnvelope {
        encrypted_data: BASE64.encode(blob),
        encrypted_key: hex::encode(key),
        policy: policy::generate(attributes),
    })
}

/// Decrypt an envelope if `caller_attributes` satisfy its policy.
///
/// Returns `Ok(None)` when the policy is not satisfied. Callers must treat
/// that as "access denied", never as missing or corrupt data. Corruption of
/// the stored envelope surfaces as an [`AbeError`] instead.
pub fn decrypt(
    envelope: &EncryptedEnvelope,
    caller_attributes: &BTreeMap<String, String>,
) -> Result<Option<Value>, AbeError> {
    let required = policy::parse(&envelope.policy)?;
    if !policy::satisfies(&required, caller_attributes) {
        return Ok(None);
    }

    let key: [u8; 32] = hex::decode(&envelope.encrypted_key)
        .map_err(|_| AbeError::InvalidKey)?
        .try_into()
        .map_err(|_| AbeError::InvalidKey)?;

    let blob = BASE64
        .decode(&envelope.encrypted_data)
        .map_err(|_| AbeError::InvalidCiphertext)?;
    if blob.len() <= IV_LEN {
        return Err(AbeError::InvalidCiphertext);
    }
    let iv: [u8; IV_LEN] = blob[..IV_LEN]
        .try_into()
        .map_err(|_| AbeError::InvalidCiphertext)?;

    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&blob[IV_LEN..])
        .map_err(|_| AbeError::DecryptFailed)?;

    Ok(Some(serde_json::from_slice(&plaintext)?))
}
