//! OpenWebNet authentication engine.
//!
//! Pure credential-proof computations for the three handshake methods the
//! gateway may negotiate:
//!
//! - **legacy** (bare nonce): the historical "OWN calc password"
//!   digit-substitution cipher over a numeric password. The algorithm is a
//!   pinned interoperability contract reproduced byte-for-byte and guarded
//!   by golden vectors from recorded protocol traces.
//! - **SHA-1 / SHA-256** challenge-response: mutual authentication. The
//!   client proves knowledge of the password with [`client_proof`] and
//!   independently computes the reply the gateway must echo with
//!   [`server_proof`].
//!
//! Nonces and proofs travel as decimal-digit strings: each hex digit of a
//! digest is transcoded to its zero-padded two-digit decimal value
//! ([`hex_to_digits`]) and back ([`digits_to_hex`]).
//!
//! No I/O happens here; everything is deterministic given its inputs.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{OwnError, Result};

/// Hash tag mixed into the client proof, ASCII "sope>" in hex.
const CLIENT_TAG: &str = "736F70653E";

/// Hash tag mixed into the client proof, ASCII "cope>" in hex.
const SERVER_TAG: &str = "636F70653E";

/// Length of the random key from which the client nonce is derived.
const CLIENT_NONCE_KEY_LEN: usize = 56;

/// Digest algorithm negotiated for the SHA challenge-response handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashMethod {
    /// HMAC-SHA1 handshake (`*98*1##`).
    Sha1,
    /// HMAC-SHA256 handshake (`*98*2##`).
    Sha256,
}

impl HashMethod {
    /// Lowercase method name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for HashMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase hex digest of `input` under the given method.
fn hexdigest(method: HashMethod, input: &[u8]) -> String {
    match method {
        HashMethod::Sha1 => hex::encode(Sha1::digest(input)),
        HashMethod::Sha256 => hex::encode(Sha256::digest(input)),
    }
}

/// Lowercase hex digest of HMAC(key, message) under the given method.
fn hmac_hexdigest(method: HashMethod, key: &[u8], message: &[u8]) -> String {
    match method {
        HashMethod::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key size");
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        }
        HashMethod::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key size");
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Transcode a hex string to the wire's decimal-digit form.
///
/// Each hex digit becomes its zero-padded two-digit decimal value, so
/// `"1f"` becomes `"0115"`.
pub fn hex_to_digits(hex: &str) -> String {
    debug_assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
    let mut out = String::with_capacity(hex.len() * 2);
    for c in hex.chars() {
        if let Some(v) = c.to_digit(16) {
            out.push_str(&format!("{v:02}"));
        }
    }
    out
}

/// Transcode a decimal-digit string back to hex.
///
/// Consecutive digit pairs are read as decimal values and formatted as
/// minimal lowercase hex; well-formed wire nonces only carry pairs in the
/// `00`-`15` range, each yielding one hex digit.
pub fn digits_to_hex(digits: &str) -> String {
    debug_assert!(digits.bytes().all(|b| b.is_ascii_digit()));
    let bytes = digits.as_bytes();
    let mut out = String::with_capacity(bytes.len() / 2 + 1);
    for pair in bytes.chunks(2) {
        let mut v = 0u32;
        for b in pair {
            v = v * 10 + u32::from(b - b'0');
        }
        out.push_str(&format!("{v:x}"));
    }
    out
}

/// Legacy "OWN calc password" transform.
///
/// A digit-substitution cipher over 32-bit arithmetic, keyed by the
/// server nonce: each nonce digit selects a shift/rotate step applied to
/// the running value seeded from the numeric password. Returns the
/// decimal rendering of the final value, which is sent back as
/// `*#<result>##`.
pub fn legacy_password(password: &str, nonce: &str) -> Result<String> {
    let password: u32 = password.trim().parse().map_err(|_| {
        OwnError::Password("legacy gateway authentication requires a numeric password".into())
    })?;

    let mut seeded = false;
    let mut num1: u32 = 0;
    let mut num2: u32 = 0;

    for c in nonce.chars() {
        if c != '0' && !seeded {
            num2 = password;
            seeded = true;
        }
        num1 = match c {
            '1' => ((num2 & 0xFFFF_FF80) >> 7).wrapping_add(num2 << 25),
            '2' => ((num2 & 0xFFFF_FFF0) >> 4).wrapping_add(num2 << 28),
            '3' => ((num2 & 0xFFFF_FFF8) >> 3).wrapping_add(num2 << 29),
            '4' => (num2 << 1).wrapping_add(num2 >> 31),
            '5' => (num2 << 5).wrapping_add(num2 >> 27),
            '6' => (num2 << 12).wrapping_add(num2 >> 20),
            '7' => (num2 & 0x0000_FF00)
                .wrapping_add((num2 & 0x0000_00FF) << 24)
                .wrapping_add((num2 & 0x00FF_0000) >> 16)
                .wrapping_add((num2 & 0xFF00_0000) >> 8),
            '8' => ((num2 & 0x0000_FFFF) << 16)
                .wrapping_add(num2 >> 24)
                .wrapping_add((num2 & 0x00FF_0000) >> 8),
            '9' => !num2,
            _ => num2,
        };
        num2 = num1;
    }

    Ok(num1.to_string())
}

/// Derive the client nonce `Rb` from a decimal-digit key.
///
/// The key is used as an HMAC key over the empty message; the hex digest
/// is transcoded to the wire's decimal form.
pub fn client_nonce(method: HashMethod, key: &str) -> String {
    hex_to_digits(&hmac_hexdigest(method, key.as_bytes(), b""))
}

/// Generate a fresh client nonce `Rb` from a random 56-digit key.
pub fn generate_client_nonce(method: HashMethod) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let key: String = (0..CLIENT_NONCE_KEY_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    client_nonce(method, &key)
}

/// Compute the client proof for the SHA challenge-response handshake.
///
/// `H(hex(Ra) || hex(Rb) || tags || H(password))`, transcoded to decimal
/// digits; sent as `*#<Rb>*<proof>##`.
pub fn client_proof(method: HashMethod, password: &str, ra: &str, rb: &str) -> String {
    let kab = hexdigest(method, password.as_bytes());
    let message = format!(
        "{}{}{CLIENT_TAG}{SERVER_TAG}{kab}",
        digits_to_hex(ra),
        digits_to_hex(rb)
    );
    hex_to_digits(&hexdigest(method, message.as_bytes()))
}

/// Compute the proof the gateway must echo to authenticate itself.
///
/// `H(hex(Ra) || hex(Rb) || H(password))`, transcoded to decimal digits.
/// A reply that does not match this value byte-for-byte is a hard
/// authentication failure.
pub fn server_proof(method: HashMethod, password: &str, ra: &str, rb: &str) -> String {
    let kab = hexdigest(method, password.as_bytes());
    let message = format!("{}{}{kab}", digits_to_hex(ra), digits_to_hex(rb));
    hex_to_digits(&hexdigest(method, message.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Deterministic Rb used by the proof fixtures: hex "aa" * 32.
    const RB_256: &str = "1010101010101010101010101010101010101010101010101010101010101010\
                          1010101010101010101010101010101010101010101010101010101010101010";

    fn rb_256() -> String {
        RB_256.replace(char::is_whitespace, "")
    }

    fn rb_1() -> String {
        rb_256()[..80].to_string()
    }

    #[test]
    fn test_digit_hex_transcoding() {
        assert_eq!(hex_to_digits("1f"), "0115");
        assert_eq!(digits_to_hex("0115"), "1f");
        assert_eq!(hex_to_digits("aa"), "1010");
        // Pairs above 15 produce multi-digit hex; the transform mirrors
        // the reference implementation exactly.
        assert_eq!(digits_to_hex("123456"), "c2238");
    }

    #[test]
    fn test_legacy_password_golden_vectors() {
        // First vector is the published reference pair for the cipher.
        assert_eq!(legacy_password("12345", "603356072").unwrap(), "25280520");
        assert_eq!(legacy_password("12345", "410501656").unwrap(), "119537670");
        assert_eq!(legacy_password("12345", "630292165").unwrap(), "4269684735");
        assert_eq!(legacy_password("98765", "523168970").unwrap(), "4294046615");
    }

    #[test]
    fn test_legacy_password_all_zero_nonce() {
        // The password is only mixed in from the first non-zero digit.
        assert_eq!(legacy_password("12345", "000000000").unwrap(), "0");
        assert_eq!(legacy_password("1", "1").unwrap(), "33554432");
    }

    #[test]
    fn test_legacy_password_rejects_non_numeric() {
        let err = legacy_password("hunter2", "603356072").unwrap_err();
        assert!(matches!(err, crate::error::OwnError::Password(_)));
    }

    #[test]
    fn test_sha256_proof_golden_vector() {
        let proof = client_proof(HashMethod::Sha256, "abcdef", "123456", &rb_256());
        assert_eq!(
            proof,
            "1305070902061215091112070302060214020309141413060106131111021112\
             0201001504040003000404081111030208141014031103151214030201131403"
                .replace(char::is_whitespace, "")
        );
        let expected = server_proof(HashMethod::Sha256, "abcdef", "123456", &rb_256());
        assert_eq!(
            expected,
            "1500070308080610131207080009011101040714150708151402010715050512\
             0303121204151200130905130801131303050509050004090211150806021315"
                .replace(char::is_whitespace, "")
        );
    }

    #[test]
    fn test_sha1_proof_golden_vector() {
        let proof = client_proof(HashMethod::Sha1, "abcdef", "123456", &rb_1());
        assert_eq!(
            proof,
            "05000109020409010902121513051203021503060904140715141015130100080304060404120503"
        );
        let expected = server_proof(HashMethod::Sha1, "abcdef", "123456", &rb_1());
        assert_eq!(
            expected,
            "14011314030112150411061306061411100311040911150609120715070805070605080710131205"
        );
    }

    #[test]
    fn test_client_nonce_is_keyed() {
        let key = "1".repeat(56);
        assert_eq!(
            client_nonce(HashMethod::Sha256, &key),
            "1103131201040806001513091510031401120011130112010300021112130212\
             0701081000151014100615120814140014100113030712050706001213060410"
                .replace(char::is_whitespace, "")
        );
        // SHA-1 digests are 40 hex chars, so the nonce is 80 digits.
        assert_eq!(client_nonce(HashMethod::Sha1, &key).len(), 80);
        assert_eq!(client_nonce(HashMethod::Sha256, &key).len(), 128);
    }

    #[test]
    fn test_generated_nonce_shape() {
        let rb = generate_client_nonce(HashMethod::Sha256);
        assert_eq!(rb.len(), 128);
        assert!(rb.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_proofs_are_deterministic() {
        let a = client_proof(HashMethod::Sha256, "abcdef", "123456", &rb_256());
        let b = client_proof(HashMethod::Sha256, "abcdef", "123456", &rb_256());
        assert_eq!(a, b);
    }

    #[test]
    fn test_client_and_server_proofs_differ() {
        let client = client_proof(HashMethod::Sha256, "abcdef", "123456", &rb_256());
        let server = server_proof(HashMethod::Sha256, "abcdef", "123456", &rb_256());
        assert_ne!(client, server);
    }

    proptest! {
        /// Any single-digit change to password, Ra or Rb changes the proof.
        #[test]
        fn prop_proof_sensitive_to_inputs(
            password in "[a-zA-Z0-9]{1,64}",
            ra in "[0-9]{8,16}",
            flip in 0usize..8,
        ) {
            let rb = rb_256();
            let base = client_proof(HashMethod::Sha256, &password, &ra, &rb);

            let mut ra_bytes = ra.clone().into_bytes();
            let i = flip % ra_bytes.len();
            ra_bytes[i] = if ra_bytes[i] == b'9' { b'0' } else { ra_bytes[i] + 1 };
            let ra_flipped = String::from_utf8(ra_bytes).unwrap();
            prop_assert_ne!(client_proof(HashMethod::Sha256, &password, &ra_flipped, &rb), base.clone());

            let mut pw_flipped = password.clone();
            pw_flipped.push('x');
            prop_assert_ne!(client_proof(HashMethod::Sha256, &pw_flipped, &ra, &rb), base);
        }
    }
}
