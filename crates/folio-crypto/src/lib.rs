use chacha20poly1305::{aead::Aead, KeyInit};
use rand_core::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

// ──────────────────────────────────────────────────────────────────────────────
// Random tokens
// ──────────────────────────────────────────────────────────────────────────────

/// Byte length of generated verification tokens (48 hex chars).
const TOKEN_BYTES: usize = 24;

/// Generate a high-entropy random token, hex-encoded.
///
/// Used for email-verification tokens, v1 verification keys and v2 action
/// tokens; token values must be unguessable.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time equality for token/credential material.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    subtle::ConstantTimeEq::ct_eq(a, b).into()
}

// ──────────────────────────────────────────────────────────────────────────────
// Password hashing (Argon2id)
// ──────────────────────────────────────────────────────────────────────────────

const MIB: u32 = 1024;
const MEMORY_COST_KIB: u32 = 64 * MIB;
const SALT_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("invalid kdf parameters")]
    InvalidParams(argon2::Error),
    #[error("key derivation failed")]
    DerivationFailed(argon2::Error),
    #[error("malformed password hash")]
    MalformedHash,
}

fn argon2_hash_raw(data: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, KdfError> {
    let params =
        argon2::Params::new(MEMORY_COST_KIB, 3, 1, Some(32)).map_err(KdfError::InvalidParams)?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut hash = Zeroizing::new([0u8; 32]);

    argon2
        .hash_password_into(data, salt, hash.as_mut())
        .map_err(KdfError::DerivationFailed)?;

    Ok(hash)
}

/// Hash a password with Argon2id under a fresh random salt.
///
/// The stored form is `hex(salt)$hex(hash)`.
pub fn hash_password(password: &str) -> Result<String, KdfError> {
    let mut salt = [0u8; SALT_BYTES];
    rand_core::OsRng.fill_bytes(&mut salt);
    let hash = argon2_hash_raw(password.as_bytes(), &salt)?;
    Ok(format!("{}${}", hex::encode(salt), hex::encode(hash.as_ref())))
}

/// Verify a password against a stored `hex(salt)$hex(hash)` value in
/// constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, KdfError> {
    let (salt_hex, hash_hex) = stored.split_once('$').ok_or(KdfError::MalformedHash)?;
    let salt = hex::decode(salt_hex).map_err(|_| KdfError::MalformedHash)?;
    let expected = hex::decode(hash_hex).map_err(|_| KdfError::MalformedHash)?;
    let computed = argon2_hash_raw(password.as_bytes(), &salt)?;
    Ok(constant_time_eq(computed.as_ref(), &expected))
}

// ──────────────────────────────────────────────────────────────────────────────
// AEAD sealing (XChaCha20-Poly1305) for gateway payloads
// ──────────────────────────────────────────────────────────────────────────────

/// Symmetric key shared with the authentication front end.
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SealKey(Zeroizing<[u8; 32]>);

impl SealKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        SealKey(Zeroizing::new(*bytes))
    }
}

/// Generate a new random seal key.
pub fn generate_seal_key() -> SealKey {
    let mut key = Zeroizing::new([0u8; 32]);
    rand_core::OsRng.fill_bytes(key.as_mut());
    SealKey(key)
}

pub struct Nonce(pub [u8; 24]);
pub struct Ciphertext(pub Vec<u8>);

#[derive(Debug, Error)]
pub enum SealError {
    #[error("AEAD encryption failed")]
    AeadFailed(chacha20poly1305::aead::Error),
}

/// AEAD encrypt
pub fn seal(plaintext: &[u8], key: &SealKey, aad: &[u8]) -> Result<(Nonce, Ciphertext), SealError> {
    let key = chacha20poly1305::Key::from(*key.as_bytes());
    let cipher = chacha20poly1305::XChaCha20Poly1305::new(&key);

    let mut nonce_bytes = [0u8; 24];
    rand_core::OsRng.fill_bytes(&mut nonce_bytes);

    let nonce = chacha20poly1305::XNonce::from(nonce_bytes);
    let ct = cipher
        .encrypt(
            &nonce,
            chacha20poly1305::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(SealError::AeadFailed)?;

    Ok((Nonce(nonce_bytes), Ciphertext(ct)))
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("AEAD decryption failed")]
    AeadFailed(chacha20poly1305::aead::Error),
}

/// AEAD decrypt
pub fn open(
    ciphertext: &[u8],
    nonce: &Nonce,
    key: &SealKey,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, OpenError> {
    let key = chacha20poly1305::Key::from(*key.as_bytes());
    let cipher = chacha20poly1305::XChaCha20Poly1305::new(&key);

    let nonce = chacha20poly1305::XNonce::from(nonce.0);

    let pt = cipher
        .decrypt(
            &nonce,
            chacha20poly1305::aead::Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(OpenError::AeadFailed)?;

    Ok(Zeroizing::new(pt))
}

// ──────────────────────────────────────────────────────────────────────────────
// Ed25519 signature verification for gateway payloads
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid public key")]
    InvalidKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature verification failed")]
    BadSignature,
}

/// Verify an Ed25519 signature over `message`.
pub fn verify_signature(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerifyError> {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let key = VerifyingKey::from_bytes(public_key).map_err(|_| VerifyError::InvalidKey)?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| VerifyError::InvalidSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);
    key.verify(message, &sig).map_err(|_| VerifyError::BadSignature)
}
