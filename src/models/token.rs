//! The upload bearer token.

use crate::constants;
use rand::{rngs::OsRng, RngCore};
use std::fmt::Write as _;
use zeroize::Zeroizing;

/// A 256-bit secret serialized as 64 lowercase hex characters.
///
/// The value is wiped from memory on drop and never shown by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadToken(Zeroizing<String>);

impl UploadToken {
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; constants::TOKEN_BYTES]);
        OsRng.fill_bytes(&mut bytes[..]);
        let mut hex = Zeroizing::new(String::with_capacity(constants::TOKEN_HEX_LEN));
        for b in bytes.iter() {
            // Writing to a String cannot fail.
            let _ = write!(hex, "{:02x}", b);
        }
        Self(hex)
    }

    /// Parse file contents: exactly one token, optionally newline-terminated.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value = raw.strip_suffix('\n').unwrap_or(raw);
        if value.len() != constants::TOKEN_HEX_LEN {
            return Err(format!(
                "expected {} hex characters, found {}",
                constants::TOKEN_HEX_LEN,
                value.len()
            ));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err("expected lowercase hexadecimal".into());
        }
        Ok(Self(Zeroizing::new(value.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact bytes persisted to the token file.
    pub fn file_contents(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("{}\n", self.as_str()))
    }
}

impl std::fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UploadToken(<redacted>)")
    }
}
