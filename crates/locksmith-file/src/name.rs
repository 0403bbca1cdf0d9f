//! Key to lock file name mapping.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha512};

use locksmith_core::error::{LockError, LockResult};

/// Extension of every lock file.
pub const EXTENSION: &str = ".lock";

/// Upper bound for generated file names, well below common filesystem limits.
const MAX_FILE_NAME_LENGTH: usize = 64;

/// Hash length in Base32 characters (160 bits / 5 bits per char).
const HASH_LENGTH_IN_CHARS: usize = 32;

/// Base32 alphabet (RFC 4648).
const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Converts a lock key to a file name that is safe on every platform.
///
/// Characters other than ASCII alphanumerics, `-` and `_` become `_`, the
/// readable part is truncated, and a Base32 digest of the full key is
/// appended so that distinct keys (including keys differing only in case or
/// in replaced characters) never share a file.
pub fn lock_file_name(key: &str) -> LockResult<String> {
    if key.is_empty() {
        return Err(LockError::InvalidKey("lock key cannot be empty".to_string()));
    }

    let max_readable = MAX_FILE_NAME_LENGTH - HASH_LENGTH_IN_CHARS - EXTENSION.len() - 1;
    let readable: String = key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(max_readable)
        .collect();

    Ok(format!("{}-{}{}", readable, key_digest(key), EXTENSION))
}

/// Full path of the lock file for `key` inside `directory`.
pub fn lock_file_path(directory: &Path, key: &str) -> LockResult<PathBuf> {
    Ok(directory.join(lock_file_name(key)?))
}

fn key_digest(key: &str) -> String {
    let digest = Sha512::digest(key.as_bytes());

    // 20 bytes encode to exactly 32 Base32 characters, no padding needed.
    let mut out = String::with_capacity(HASH_LENGTH_IN_CHARS);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for &byte in &digest[..20] {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    out
}
