//! Ticket code minting and verification, plus small hashing helpers.
//!
//! Ticket code format: `TKT-XXXX-XXXX-XXXX-XXXX-CC`
//!
//! - 16 body characters drawn from a 32-symbol alphabet (80 bits of entropy)
//! - 2 check characters: the first two bytes of HMAC-SHA256(secret, body),
//!   each reduced mod 32 into the same alphabet
//!
//! The check characters let the door reject typos and forged codes before any
//! database lookup. Uniqueness is still enforced by the tickets table.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

/// Unambiguous alphabet: no I, O, 0 or 1.
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const CODE_PREFIX: &str = "TKT";
const GROUPS: usize = 4;
const GROUP_LEN: usize = 4;
const CHECK_LEN: usize = 2;

/// Mints and verifies ticket codes with a server-side secret.
///
/// Cheap to clone; the keyed MAC state is cloned per use.
#[derive(Clone)]
pub struct TicketCodeSigner {
    mac: Hmac<Sha256>,
}

impl TicketCodeSigner {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(AppError::Internal("Ticket code secret must not be empty".into()));
        }
        let mac = Hmac::<Sha256>::new_from_slice(secret)
            .map_err(|e| AppError::Internal(format!("Invalid ticket code secret: {}", e)))?;
        Ok(Self { mac })
    }

    /// Generate a fresh random code.
    pub fn generate(&self) -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let body: String = (0..GROUPS * GROUP_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        self.format_code(&body)
    }

    /// Assemble a full code from a 16-character body.
    pub fn format_code(&self, body: &str) -> String {
        let mut out = String::with_capacity(CODE_PREFIX.len() + body.len() + GROUPS + 1 + CHECK_LEN);
        out.push_str(CODE_PREFIX);
        for chunk in body.as_bytes().chunks(GROUP_LEN) {
            out.push('-');
            out.extend(chunk.iter().map(|&b| b as char));
        }
        out.push('-');
        out.push_str(&self.check_chars(body));
        out
    }

    /// Does this (already normalized) code carry valid structure and check characters?
    pub fn verify(&self, code: &str) -> bool {
        let Some(body) = code_body(code) else {
            return false;
        };
        let Some(check) = code.rsplit('-').next() else {
            return false;
        };
        let expected = self.check_chars(&body);
        expected.as_bytes().ct_eq(check.as_bytes()).into()
    }

    fn check_chars(&self, body: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(body.as_bytes());
        let digest = mac.finalize().into_bytes();
        digest[..CHECK_LEN]
            .iter()
            .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
            .collect()
    }
}

/// Canonical form of a scanned or typed code: trimmed, uppercase.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Does this normalized text have the shape of a ticket code?
/// Says nothing about the check characters.
pub fn is_code_shaped(code: &str) -> bool {
    code_body(code).is_some()
}

/// Extract the 16-character body if the code is structurally valid.
fn code_body(code: &str) -> Option<String> {
    let mut parts = code.split('-');
    if parts.next()? != CODE_PREFIX {
        return None;
    }
    let mut body = String::with_capacity(GROUPS * GROUP_LEN);
    for _ in 0..GROUPS {
        let group = parts.next()?;
        if group.len() != GROUP_LEN || !group.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return None;
        }
        body.push_str(group);
    }
    let check = parts.next()?;
    if check.len() != CHECK_LEN || !check.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
        return None;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(body)
}

/// SHA-256 of arbitrary bytes as lowercase hex.
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Compare two secrets without leaking the mismatch position through timing.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
