//! Strongbox Cashu codec
//!
//! Encodes and decodes Cashu V3 bearer tokens (`cashuA...`).
//!
//! # Wire Format
//!
//! ```text
//! cashuA<base64url(json)>
//!
//! json = { "token": [ { "mint": "<url>", "proofs": [ { "amount": 1, "secret": "..." } ] } ],
//!          "memo": "..." }
//! ```
//!
//! Base64 padding is optional on the wire. Extra proof fields emitted by real
//! wallets (`id`, `C`, ...) are ignored.
//!
//! # Example
//!
//! ```
//! use strongbox_cashu::{decode, encode, Proof};
//!
//! let token = encode("https://mint.example.com", &[Proof::new(1000, "secret_xyz")]);
//! assert!(token.starts_with("cashuA"));
//! assert_eq!(decode(&token).unwrap(), 1000);
//! ```

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version prefix of a V3 token.
pub const TOKEN_PREFIX: &str = "cashuA";

/// URI scheme some wallets put in front of the token.
const URI_SCHEME: &str = "cashu:";

/// URL-safe alphabet, padding written on encode and optional on decode.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors from token decoding
#[derive(Error, Debug)]
pub enum CashuError {
    #[error("Token does not start with {TOKEN_PREFIX}")]
    MissingPrefix,

    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Token payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid token JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token contains no entries")]
    EmptyToken,

    #[error("Proof amounts overflow")]
    AmountOverflow,
}

/// One unit of value inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Value in satoshis
    pub amount: u64,
    /// Opaque secret chosen by the holder
    pub secret: String,
}

impl Proof {
    pub fn new(amount: u64, secret: impl Into<String>) -> Self {
        Self {
            amount,
            secret: secret.into(),
        }
    }
}

/// Proofs issued by a single mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Mint URL
    pub mint: String,
    /// Proofs, in issue order
    pub proofs: Vec<Proof>,
}

impl TokenEntry {
    /// Sum of all proof amounts, `None` on overflow.
    pub fn value(&self) -> Option<u64> {
        self.proofs
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
    }
}

/// A decoded V3 token document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: Vec<TokenEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl Token {
    /// Build a single-mint token.
    pub fn new(mint: impl Into<String>, proofs: Vec<Proof>) -> Self {
        Self {
            token: vec![TokenEntry {
                mint: mint.into(),
                proofs,
            }],
            memo: None,
        }
    }

    /// Attach a memo.
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Redeemable value: the proofs of the first entry.
    ///
    /// Further entries are carried but not counted.
    pub fn value(&self) -> Result<u64, CashuError> {
        let first = self.token.first().ok_or(CashuError::EmptyToken)?;
        first.value().ok_or(CashuError::AmountOverflow)
    }

    /// Mint of the first entry.
    pub fn mint(&self) -> Option<&str> {
        self.token.first().map(|e| e.mint.as_str())
    }

    /// Serialize to the `cashuA` wire string.
    pub fn serialize(&self) -> String {
        // Struct serialization has a fixed field order and cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", TOKEN_PREFIX, TOKEN_ENGINE.encode(json.as_bytes()))
    }
}

/// Parse a token string into its document.
pub fn decode_token(token: &str) -> Result<Token, CashuError> {
    let token = token.trim();
    let token = token.strip_prefix(URI_SCHEME).unwrap_or(token);
    let encoded = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or(CashuError::MissingPrefix)?;

    let bytes = TOKEN_ENGINE.decode(encoded)?;
    let json = String::from_utf8(bytes)?;
    let parsed: Token = serde_json::from_str(&json)?;

    if parsed.token.is_empty() {
        return Err(CashuError::EmptyToken);
    }
    Ok(parsed)
}

/// Decode a token string to its redeemable amount.
///
/// `Err` means the token is malformed. `Ok(0)` is a well-formed token worth
/// nothing; callers decide whether that is acceptable.
pub fn decode(token: &str) -> Result<u64, CashuError> {
    decode_token(token)?.value()
}

/// Encode proofs from one mint into a token string.
///
/// Deterministic: identical input yields an identical string.
pub fn encode(mint: &str, proofs: &[Proof]) -> String {
    Token::new(mint, proofs.to_vec()).serialize()
}
