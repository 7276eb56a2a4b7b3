use autodamage_core::now_unix_nanos;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub const CODE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("reference must be 12 characters, got {0}")]
    Length(usize),
    #[error("reference may only contain letters and digits, found {0:?}")]
    Character(char),
}

/// Claim reference shared out of band between the parties of one incident.
/// Always 12 uppercase ASCII letters or digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimCode(String);

impl ClaimCode {
    /// Fresh code from the clock and a random UUID. Nothing checks it against
    /// codes already handed out.
    pub fn generate() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(now_unix_nanos().to_string().as_bytes());
        hasher.update(Uuid::new_v4().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..CODE_LEN].to_ascii_uppercase())
    }

    /// Accepts exactly 12 ASCII letters or digits, in either case. Surrounding
    /// whitespace is not trimmed.
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(FormatError::Character(bad));
        }
        if raw.len() != CODE_LEN {
            return Err(FormatError::Length(raw.len()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn validate(raw: &str) -> Result<ClaimCode, FormatError> {
    ClaimCode::parse(raw)
}

impl std::str::FromStr for ClaimCode {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClaimCode {
    type Error = FormatError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ClaimCode> for String {
    fn from(c: ClaimCode) -> Self {
        c.0
    }
}

impl std::fmt::Display for ClaimCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
