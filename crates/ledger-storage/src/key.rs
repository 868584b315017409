//! Filesystem-safe keys derived from player identifiers.
//!
//! Host identifiers may contain `/`, `+` or `=`, so they are never used as
//! file names directly. The key is the URL-safe, unpadded base64 encoding
//! of the identifier's UTF-8 bytes: deterministic, unique per input, free
//! of `.` and path separators, and reversible for debugging.
//!
//! Base64 grows the input by a third, so an identifier longer than
//! [`MAX_PLAIN_UID_BYTES`] would push the temp file name past the usual
//! 255-byte file name limit. Such identifiers get a hashed key instead: a
//! `~` marker followed by the base64 SHA-256 of the identifier. Hashed keys
//! do not decode; the identifier is read back from the record itself.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ledger_types::PlayerUid;
use sha2::{Digest, Sha256};

/// Longest identifier, in bytes, stored under its reversible key.
///
/// 150 bytes encode to 200 characters, which leaves room for the temp
/// file prefix and suffix within 255 bytes.
pub const MAX_PLAIN_UID_BYTES: usize = 150;

/// Leads every hashed key. Outside the URL-safe base64 alphabet, so a
/// hashed key never collides with a plain one.
const HASHED_KEY_MARKER: char = '~';

/// Derive the storage key for a player.
pub fn encode_key(uid: &PlayerUid) -> String {
    let bytes = uid.as_str().as_bytes();
    if bytes.len() <= MAX_PLAIN_UID_BYTES {
        return URL_SAFE_NO_PAD.encode(bytes);
    }
    let digest = Sha256::digest(bytes);
    format!("{HASHED_KEY_MARKER}{}", URL_SAFE_NO_PAD.encode(digest))
}

/// Recover the player identifier from a storage key.
///
/// Returns `None` if `key` is not a plain key produced by [`encode_key`],
/// including every hashed key.
pub fn decode_key(key: &str) -> Option<PlayerUid> {
    let bytes = URL_SAFE_NO_PAD.decode(key).ok()?;
    String::from_utf8(bytes).ok().map(PlayerUid::from)
}

/// Whether `key` is the hashed form used for over-long identifiers.
pub fn is_hashed_key(key: &str) -> bool {
    key.starts_with(HASHED_KEY_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_path_safe() {
        let uid = PlayerUid::from("a/b+c==/../../etc");
        let key = encode_key(&uid);
        assert!(!key.contains('/'));
        assert!(!key.contains('.'));
        assert!(!key.contains('='));
        assert!(!key.contains('+'));
    }

    #[test]
    fn key_is_stable_and_reversible() {
        let uid = PlayerUid::from("q7Zx/+abc==");
        assert_eq!(encode_key(&uid), encode_key(&uid));
        assert_eq!(decode_key(&encode_key(&uid)), Some(uid));
    }

    #[test]
    fn distinct_ids_get_distinct_keys() {
        let a = encode_key(&PlayerUid::from("abc"));
        let b = encode_key(&PlayerUid::from("abd"));
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_names_do_not_decode() {
        assert!(decode_key("not base64 !").is_none());
    }

    #[test]
    fn longest_plain_id_stays_reversible() {
        let uid = PlayerUid::from("x".repeat(MAX_PLAIN_UID_BYTES));
        let key = encode_key(&uid);
        assert!(!is_hashed_key(&key));
        assert_eq!(key.len(), 200);
        assert_eq!(decode_key(&key), Some(uid));
    }

    #[test]
    fn over_long_ids_get_short_hashed_keys() {
        let a = PlayerUid::from("a".repeat(300));
        let b = PlayerUid::from(format!("{}b", "a".repeat(299)));
        let key = encode_key(&a);

        assert!(is_hashed_key(&key));
        assert_eq!(key.len(), 44);
        assert!(!key.contains('.') && !key.contains('/'));
        assert_eq!(key, encode_key(&a));
        assert_ne!(key, encode_key(&b));
        assert!(decode_key(&key).is_none());
    }
}
