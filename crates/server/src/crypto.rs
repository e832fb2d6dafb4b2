// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token encryption for `users.json` (spec §6): AES-256-GCM with a
//! process-configured key, hashed from an env secret. Tokens serialize as
//! `<iv-b64>.<tag-b64>.<ciphertext-b64>` using a 12-byte IV.
//!
//! Grounded on the teacher's use of `ring` as its crypto provider
//! (`rustls::crypto::ring`, already a direct dependency); reused here
//! directly for AEAD instead of pulling in a second crypto crate.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::{ServerError, ServerResult};

const NONCE_LEN: usize = 12;

/// Well-known fallback key used when `AGENTFLEET_TOKEN_KEY` is unset.
/// Never rely on this outside local development — it's public.
const DEV_FALLBACK_KEY: &str = "agentfleet-dev-only-insecure-default-key";

/// Derives the AES-256-GCM key from a caller-supplied secret (or the dev
/// fallback, with a loud warning) and encrypts/decrypts tokens with it.
pub struct TokenCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl TokenCipher {
    pub fn new(secret: Option<&str>) -> ServerResult<Self> {
        let secret = match secret {
            Some(s) if !s.is_empty() => s,
            _ => {
                tracing::warn!(
                    "AGENTFLEET_TOKEN_KEY is unset; falling back to a well-known \
                     development key. Connected-service tokens are NOT protected. \
                     Set AGENTFLEET_TOKEN_KEY before relying on this in production."
                );
                DEV_FALLBACK_KEY
            }
        };
        let digest = Sha256::digest(secret.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, &digest)
            .map_err(|_| ServerError::Internal("failed to derive AES-256-GCM key".into()))?;
        Ok(Self { key: LessSafeKey::new(unbound), rng: SystemRandom::new() })
    }

    /// Encrypt `plaintext`, returning `<iv-b64>.<tag-b64>.<ciphertext-b64>`.
    pub fn encrypt(&self, plaintext: &str) -> ServerResult<String> {
        let mut iv_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut iv_bytes).map_err(|_| ServerError::Internal("failed to generate nonce".into()))?;
        let nonce = Nonce::assume_unique_for_key(iv_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| ServerError::Internal("token encryption failed".into()))?;

        Ok(format!(
            "{}.{}.{}",
            BASE64.encode(iv_bytes),
            BASE64.encode(tag.as_ref()),
            BASE64.encode(in_out)
        ))
    }

    /// Decrypt a string produced by [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> ServerResult<String> {
        let mut parts = encoded.splitn(3, '.');
        let (iv_b64, tag_b64, ct_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Err(ServerError::BadRequest("malformed encrypted token".into())),
        };

        let iv = BASE64.decode(iv_b64).map_err(|e| ServerError::BadRequest(e.to_string()))?;
        let tag = BASE64.decode(tag_b64).map_err(|e| ServerError::BadRequest(e.to_string()))?;
        let ct = BASE64.decode(ct_b64).map_err(|e| ServerError::BadRequest(e.to_string()))?;

        if iv.len() != NONCE_LEN {
            return Err(ServerError::BadRequest("malformed encrypted token nonce".into()));
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&iv);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = ct;
        in_out.extend_from_slice(&tag);

        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| ServerError::Internal("token decryption failed".into()))?;

        String::from_utf8(plaintext.to_vec()).map_err(|e| ServerError::Internal(e.to_string()))
    }
}
