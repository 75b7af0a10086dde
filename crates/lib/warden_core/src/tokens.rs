//! Random credential generation.
//!
//! Access tokens, refresh tokens, authorization codes and generated client
//! secrets are opaque hex strings drawn from the thread-local CSPRNG.

use rand::RngCore;

/// Bytes of entropy in every generated credential.
const CREDENTIAL_BYTES: usize = 16;

/// Generate a random hex string carrying `byte_len` bytes of entropy.
fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a new access token.
pub fn generate_access_token() -> String {
    random_hex(CREDENTIAL_BYTES)
}

/// Generate a new refresh token.
pub fn generate_refresh_token() -> String {
    random_hex(CREDENTIAL_BYTES)
}

/// Generate a new authorization code.
pub fn generate_authorization_code() -> String {
    random_hex(CREDENTIAL_BYTES)
}

/// Generate a client secret for a web application registered without one.
pub fn generate_client_secret() -> String {
    random_hex(CREDENTIAL_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn credentials_are_hex_with_enough_entropy() {
        for token in [
            generate_access_token(),
            generate_refresh_token(),
            generate_authorization_code(),
            generate_client_secret(),
        ] {
            assert_eq!(token.len(), CREDENTIAL_BYTES * 2);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn credentials_are_unique() {
        let tokens: HashSet<_> = (0..100).map(|_| generate_access_token()).collect();
        assert_eq!(tokens.len(), 100);
    }
}
