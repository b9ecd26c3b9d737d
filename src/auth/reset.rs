use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// A freshly generated password-reset token.
///
/// `raw` goes to the user out of band and is never persisted or logged;
/// only `digest` (sha256 of the raw value, hex) is stored on the principal
/// row. Presenting the raw value later re-derives the digest for lookup.
pub struct ResetToken {
    pub raw: String,
    pub digest: String,
}

pub fn new_reset_token() -> ResetToken {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let digest = digest_of(&raw);
    ResetToken { raw, digest }
}

/// One-way derivative of a raw reset token, as stored in the database.
pub fn digest_of(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_presented_raw_token() {
        let token = new_reset_token();
        assert_eq!(digest_of(&token.raw), token.digest);
    }

    #[test]
    fn raw_token_is_32_random_bytes_hex() {
        let token = new_reset_token();
        assert_eq!(token.raw.len(), 64);
        assert!(token.raw.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_not_the_raw_value() {
        let token = new_reset_token();
        assert_ne!(token.raw, token.digest);
    }

    #[test]
    fn regenerating_invalidates_the_previous_token() {
        // Overwrite semantics: once a second token is stored, the first raw
        // value no longer derives the persisted digest.
        let first = new_reset_token();
        let second = new_reset_token();
        assert_ne!(first.raw, second.raw);
        assert_ne!(digest_of(&first.raw), second.digest);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest_of("abc"), digest_of("abc"));
        assert_eq!(
            digest_of("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
