//! Session persistence on top of a [`CookieStore`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use url::Url;

use super::{
    cookies::{CookieOptions, CookieStore},
    AuthError, Session,
};

/// Browsers cap a cookie at 4096 bytes including attributes.
pub(crate) const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";

/// Cookie name for the session: `sb-<project-ref>-auth-token`, where the
/// project ref is the first DNS label of the provider host.
pub(crate) fn storage_key(provider_url: &Url) -> Result<String, AuthError> {
    let host = provider_url
        .host_str()
        .ok_or_else(|| AuthError::InvalidConfig(format!("missing host in {provider_url}")))?;
    let project_ref = host.split('.').next().unwrap_or(host);
    Ok(format!("sb-{project_ref}-auth-token"))
}

pub(crate) fn code_verifier_key(storage_key: &str) -> String {
    format!("{storage_key}-code-verifier")
}

pub(crate) fn encode_session(session: &Session) -> Result<String, AuthError> {
    let json = serde_json::to_vec(session)
        .map_err(|err| AuthError::InvalidResponse(format!("failed to encode session: {err}")))?;
    Ok(format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Decode a stored session; unreadable values are treated as no session.
pub(crate) fn decode_session(value: &str) -> Option<Session> {
    if let Some(encoded) = value.strip_prefix(BASE64_PREFIX) {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
        return serde_json::from_slice(&bytes).ok();
    }
    serde_json::from_str(value).ok()
}

fn chunk_name(key: &str, index: usize) -> String {
    format!("{key}.{index}")
}

fn is_chunk_of(name: &str, key: &str) -> Option<usize> {
    name.strip_prefix(key)?
        .strip_prefix('.')?
        .parse::<usize>()
        .ok()
}

fn split_chunks(value: &str) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(MAX_CHUNK_SIZE)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Read a value stored either whole under `key` or as `key.0`, `key.1`, ...
pub(crate) fn read_chunked(store: &dyn CookieStore, key: &str) -> Option<String> {
    if let Some(value) = store.get(key) {
        return Some(value);
    }

    let mut value = String::new();
    let mut index = 0;
    while let Some(chunk) = store.get(&chunk_name(key, index)) {
        value.push_str(&chunk);
        index += 1;
    }

    if index == 0 {
        None
    } else {
        Some(value)
    }
}

/// Store `value` under `key`, chunking when needed and dropping stale chunks
/// left over from a previous, differently sized value.
pub(crate) fn write_chunked(
    store: &dyn CookieStore,
    key: &str,
    value: &str,
    options: &CookieOptions,
) {
    let chunks = split_chunks(value);
    let existing = store.names();

    if chunks.len() == 1 {
        store.set(key, value, options);
        for name in &existing {
            if is_chunk_of(name, key).is_some() {
                store.remove(name, options);
            }
        }
        return;
    }

    for (index, chunk) in chunks.iter().enumerate() {
        store.set(&chunk_name(key, index), chunk, options);
    }
    for name in &existing {
        let stale_chunk = is_chunk_of(name, key).is_some_and(|index| index >= chunks.len());
        if name == key || stale_chunk {
            store.remove(name, options);
        }
    }
}

/// Remove `key` and all of its chunks that the store knows about.
pub(crate) fn remove_chunked(store: &dyn CookieStore, key: &str, options: &CookieOptions) {
    for name in store.names() {
        if name == key || is_chunk_of(&name, key).is_some() {
            store.remove(&name, options);
        }
    }
}

pub(crate) fn load_session(store: &dyn CookieStore, key: &str) -> Option<Session> {
    read_chunked(store, key).and_then(|value| decode_session(&value))
}

pub(crate) fn save_session(
    store: &dyn CookieStore,
    key: &str,
    session: &Session,
    options: &CookieOptions,
) -> Result<(), AuthError> {
    let value = encode_session(session)?;
    write_chunked(store, key, &value, options);
    Ok(())
}
