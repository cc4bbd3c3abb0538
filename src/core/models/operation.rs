use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::PgpipeError;

/// What the batch does to every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Encrypt for the configured recipient, signing when a private key is set.
    Encrypt,
    /// Decrypt with the configured private key, verifying when a public key is set.
    Decrypt,
}

impl Operation {
    /// Json field (text items) and default binary slot (file items) for results.
    pub fn output_name(self) -> &'static str {
        match self {
            Operation::Encrypt => "encrypted",
            Operation::Decrypt => "decrypted",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Encrypt => write!(f, "encrypt"),
            Operation::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// Where an item's payload lives.
///
/// Serialized with the host's names: `string` for inline text,
/// `file` for a binary attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "string")]
    Text,
    #[default]
    #[serde(rename = "file")]
    Binary,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Text => write!(f, "string"),
            ContentKind::Binary => write!(f, "file"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = PgpipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "text" => Ok(ContentKind::Text),
            "file" | "binary" => Ok(ContentKind::Binary),
            other => Err(PgpipeError::InvalidConfig {
                detail: format!("Unknown item type: '{other}'. Use 'file' or 'string'."),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_display_as_subcommands() {
        assert_eq!(Operation::Encrypt.to_string(), "encrypt");
        assert_eq!(Operation::Decrypt.to_string(), "decrypt");
    }

    #[test]
    fn content_kind_uses_host_names() {
        assert_eq!("string".parse::<ContentKind>().unwrap(), ContentKind::Text);
        assert_eq!("file".parse::<ContentKind>().unwrap(), ContentKind::Binary);
        assert_eq!(ContentKind::default(), ContentKind::Binary);

        let json = serde_json::to_string(&ContentKind::Text).unwrap();
        assert_eq!(json, "\"string\"");
    }

    #[test]
    fn output_names_follow_operation() {
        assert_eq!(Operation::Encrypt.output_name(), "encrypted");
        assert_eq!(Operation::Decrypt.output_name(), "decrypted");
    }
}
