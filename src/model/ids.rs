//! Hierarchical identifiers.
//!
//! Ids are built from `\0`-separated components so that every id sorts
//! together with its parents:
//!
//! - account: `A`
//! - folder: `A\0F`
//! - conversation: `A\0F\0C` (folder namespaced) or `A\0\0C` (global)
//! - message: `A\0F\0C\0M`
//!
//! Numeric components use a sortable base-64 ("a64") encoding.

use crate::error::{Result, SyncError};

const A64_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz{}";

/// Encode an integer in a64. Same-length encodings sort like the integers.
pub fn encode_a64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(A64_ALPHABET[(value % 64) as usize]);
        value /= 64;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

pub fn decode_a64(encoded: &str) -> Result<u64> {
    if encoded.is_empty() {
        return Err(malformed("a64 integer", encoded));
    }
    encoded.bytes().try_fold(0u64, |acc, byte| {
        let digit = A64_ALPHABET
            .iter()
            .position(|&c| c == byte)
            .ok_or_else(|| malformed("a64 integer", encoded))?;
        acc.checked_mul(64)
            .and_then(|v| v.checked_add(digit as u64))
            .ok_or_else(|| malformed("a64 integer", encoded))
    })
}

// ── Accounts / folders ──────────────────────────────────────────

pub fn make_account_id(account_num: u64) -> String {
    encode_a64(account_num)
}

pub fn make_folder_id(account_id: &str, folder_num: u64) -> Result<String> {
    reject_nul("account id", account_id)?;
    Ok(format!("{account_id}\0{}", encode_a64(folder_num)))
}

pub fn account_id_from_folder_id(folder_id: &str) -> Result<&str> {
    Ok(split_exact::<2>("folder id", folder_id)?[0])
}

pub fn folder_num_from_folder_id(folder_id: &str) -> Result<u64> {
    decode_a64(split_exact::<2>("folder id", folder_id)?[1])
}

// ── Conversations ───────────────────────────────────────────────

pub fn make_folder_namespaced_conv_id(folder_id: &str, component: &str) -> Result<String> {
    split_exact::<2>("folder id", folder_id)?;
    reject_nul("conversation id component", component)?;
    Ok(format!("{folder_id}\0{component}"))
}

pub fn make_global_namespaced_conv_id(account_id: &str, component: &str) -> Result<String> {
    reject_nul("account id", account_id)?;
    reject_nul("conversation id component", component)?;
    Ok(format!("{account_id}\0\0{component}"))
}

pub fn account_id_from_conv_id(conv_id: &str) -> Result<&str> {
    Ok(split_exact::<3>("conversation id", conv_id)?[0])
}

pub fn conv_id_component_from_conv_id(conv_id: &str) -> Result<&str> {
    Ok(split_exact::<3>("conversation id", conv_id)?[2])
}

// ── Messages ────────────────────────────────────────────────────

/// Derive a message id from its conversation and a provider-native id.
/// Deterministic, so a resynced event keeps its id.
pub fn make_message_id(conv_id: &str, component: &str) -> Result<String> {
    split_exact::<3>("conversation id", conv_id)?;
    reject_nul("message id component", component)?;
    Ok(format!("{conv_id}\0{component}"))
}

pub fn conv_id_from_message_id(message_id: &str) -> Result<&str> {
    split_exact::<4>("message id", message_id)?;
    // The last separator ends the conversation id.
    let end = message_id.rfind('\0').unwrap_or(message_id.len());
    Ok(&message_id[..end])
}

pub fn message_id_component_from_message_id(message_id: &str) -> Result<&str> {
    Ok(split_exact::<4>("message id", message_id)?[3])
}

fn split_exact<'a, const N: usize>(kind: &'static str, id: &'a str) -> Result<[&'a str; N]> {
    let pieces: Vec<&str> = id.split('\0').collect();
    pieces.try_into().map_err(|_| malformed(kind, id))
}

fn reject_nul(kind: &'static str, value: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(malformed(kind, value));
    }
    Ok(())
}

fn malformed(kind: &'static str, id: &str) -> SyncError {
    SyncError::MalformedId {
        kind,
        id: id.to_string(),
    }
}
