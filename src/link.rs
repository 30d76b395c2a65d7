//! Reversible obfuscation for shareable deep links.
//!
//! The current format hashes the passphrase into an AES-256 key, encrypts
//! the scheme-stripped URL in CBC mode under a fresh random IV, and
//! serializes as `hex(iv):hex(ciphertext)`. Links minted before the
//! hashing scheme existed use base64 with the IV prepended and the
//! passphrase truncated or zero-padded to key width; that weaker
//! derivation lives in its own branch so it stays easy to retire.
//!
//! `decode` falls back to returning its input unchanged, so plain URLs can
//! go through the same entry point. The absence of an error therefore does
//! not prove that decryption happened.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::DecodeError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;
const DEEP_LINK_SCHEME: &str = "coverx";
const DEEP_LINK_PREFIX: &str = "coverx://";

/// Encrypts a URL for sharing. The scheme prefix is stripped before
/// encryption; a fresh IV is drawn per call, so encoding the same URL
/// twice yields different ciphertexts.
pub fn encode(url: &str, passphrase: &str) -> String {
    let tail = strip_scheme(url);
    let key = hashed_key(passphrase);
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(tail.as_bytes());
    format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
}

/// Decrypts a link under whichever format it carries, or hands the input
/// back unchanged when neither applies.
pub fn decode(text: &str, passphrase: &str) -> String {
    let attempt = if text.contains(':') {
        decode_current(text, passphrase)
    } else {
        decode_legacy(text, passphrase)
    };
    match attempt {
        Ok(tail) => tail,
        Err(e) => {
            log::debug!("link did not decode, passing through unchanged: {e}");
            text.to_string()
        }
    }
}

/// Resolves an OS-handed deep link to a plain URL for the add path.
/// Accepts `coverx://download?url=<payload>` and the bare
/// `coverx://<payload>` shorthand; anything else is `None`.
pub fn resolve_deep_link(uri: &str, passphrase: &str) -> Option<String> {
    let payload = match Url::parse(uri) {
        Ok(parsed)
            if parsed.scheme() == DEEP_LINK_SCHEME && parsed.host_str() == Some("download") =>
        {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned())?
        }
        // The bare shorthand's payload is not a valid authority, so it
        // does not survive Url parsing; take it off the prefix directly.
        _ => {
            let rest = uri.strip_prefix(DEEP_LINK_PREFIX)?;
            if rest.is_empty() {
                return None;
            }
            rest.to_string()
        }
    };
    Some(with_scheme(decode(&payload, passphrase)))
}

fn decode_current(text: &str, passphrase: &str) -> Result<String, DecodeError> {
    let (iv_hex, ct_hex) = text.split_once(':').ok_or(DecodeError::TooShort)?;
    let iv = hex::decode(iv_hex)?;
    let ciphertext = hex::decode(ct_hex)?;
    if iv.len() != IV_LEN || ciphertext.is_empty() {
        return Err(DecodeError::TooShort);
    }
    decrypt(&hashed_key(passphrase), &iv, &ciphertext)
}

fn decode_legacy(text: &str, passphrase: &str) -> Result<String, DecodeError> {
    let raw = BASE64.decode(text)?;
    if raw.len() <= IV_LEN {
        return Err(DecodeError::TooShort);
    }
    let (iv, ciphertext) = raw.split_at(IV_LEN);
    decrypt(&legacy_key(passphrase), iv, ciphertext)
}

fn decrypt(key: &[u8; KEY_LEN], iv: &[u8], ciphertext: &[u8]) -> Result<String, DecodeError> {
    let decryptor = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| DecodeError::Cipher)?;
    let plain = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecodeError::Cipher)?;
    String::from_utf8(plain).map_err(|_| DecodeError::Cipher)
}

fn hashed_key(passphrase: &str) -> [u8; KEY_LEN] {
    Sha256::digest(passphrase.as_bytes()).into()
}

fn legacy_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let bytes = passphrase.as_bytes();
    let n = bytes.len().min(KEY_LEN);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

fn with_scheme(url: String) -> String {
    if url.contains("://") {
        url
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "unit-test-passphrase";

    #[test]
    fn round_trip_restores_the_plaintext() {
        let encoded = encode("example.com/a.zip", KEY);
        assert_eq!(decode(&encoded, KEY), "example.com/a.zip");
    }

    #[test]
    fn scheme_prefix_is_stripped_before_encryption() {
        let encoded = encode("https://example.com/a.zip", KEY);
        assert_eq!(decode(&encoded, KEY), "example.com/a.zip");
    }

    #[test]
    fn fresh_iv_per_call_still_decodes() {
        let first = encode("example.com/a.zip", KEY);
        let second = encode("example.com/a.zip", KEY);
        assert_ne!(first, second);
        assert_eq!(decode(&first, KEY), decode(&second, KEY));
    }

    #[test]
    fn legacy_format_still_decodes() {
        // iv || ciphertext, base64, passphrase padded to key width.
        let iv = [7u8; IV_LEN];
        let ciphertext = Aes256CbcEnc::new(&legacy_key(KEY).into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(b"example.com/old.zip");
        let mut raw = iv.to_vec();
        raw.extend_from_slice(&ciphertext);
        let legacy = BASE64.encode(raw);

        assert!(!legacy.contains(':'));
        assert_eq!(decode(&legacy, KEY), "example.com/old.zip");
    }

    #[test]
    fn plain_urls_pass_through_unchanged() {
        let plain = "https://plain.example/file.iso";
        assert_eq!(decode(plain, KEY), plain);
    }

    #[test]
    fn arbitrary_text_passes_through_unchanged() {
        assert_eq!(decode("not-a-link", KEY), "not-a-link");
    }

    #[test]
    fn wrong_key_never_yields_the_plaintext() {
        let encoded = encode("example.com/a.zip", KEY);
        assert_ne!(decode(&encoded, "some-other-passphrase"), "example.com/a.zip");
    }

    #[test]
    fn deep_link_query_shape_resolves() {
        let encoded = encode("https://example.com/a.zip", KEY);
        let uri = format!("coverx://download?url={encoded}");
        assert_eq!(
            resolve_deep_link(&uri, KEY).unwrap(),
            "https://example.com/a.zip"
        );
    }

    #[test]
    fn deep_link_bare_shorthand_resolves() {
        let encoded = encode("https://example.com/a.zip", KEY);
        let uri = format!("coverx://{encoded}");
        assert_eq!(
            resolve_deep_link(&uri, KEY).unwrap(),
            "https://example.com/a.zip"
        );
    }

    #[test]
    fn deep_link_with_plain_url_resolves() {
        let uri = "coverx://download?url=https%3A%2F%2Fexample.com%2Fa.zip";
        assert_eq!(
            resolve_deep_link(uri, KEY).unwrap(),
            "https://example.com/a.zip"
        );
    }

    #[test]
    fn foreign_schemes_are_rejected() {
        assert!(resolve_deep_link("https://example.com/a.zip", KEY).is_none());
        assert!(resolve_deep_link("coverx://", KEY).is_none());
    }
}
