//! String encodings for the classical channel
//!
//! The channel only carries strings. Binary artifacts travel as lower-case
//! hex, and the authentication message as `"<message>|<hex(tag)>"`.

use crypto::mac::TAG_LEN;
use std::fmt;
use thiserror::Error;

/// Separator between plaintext and tag in the authentication message
pub const AUTH_DELIMITER: char = '|';

/// Encode a public key or ciphertext for transmission
pub fn encode_artifact(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a received public key or ciphertext
pub fn decode_artifact(content: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(content)
}

/// Why a received authentication message was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedAuth {
    #[error("no '|' delimiter")]
    MissingDelimiter,
    #[error("{0} delimiters, expected exactly one")]
    ExtraDelimiters(usize),
    #[error("tag is not hex")]
    TagNotHex,
    #[error("tag is {0} bytes, expected 32")]
    TagLength(usize),
}

/// Plaintext plus MAC tag, as exchanged during authentication
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthMessage {
    pub message: String,
    pub tag: [u8; TAG_LEN],
}

impl AuthMessage {
    pub fn new(message: impl Into<String>, tag: [u8; TAG_LEN]) -> Self {
        Self {
            message: message.into(),
            tag,
        }
    }

    /// Render for the wire
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.message, AUTH_DELIMITER, hex::encode(self.tag))
    }

    /// Parse a received payload; anything that does not split on exactly one
    /// delimiter into a message and a full-length hex tag is malformed.
    pub fn parse(content: &str) -> Result<Self, MalformedAuth> {
        let delimiters = content.matches(AUTH_DELIMITER).count();
        match delimiters {
            0 => return Err(MalformedAuth::MissingDelimiter),
            1 => {}
            n => return Err(MalformedAuth::ExtraDelimiters(n)),
        }
        let (message, tag_hex) = content
            .split_once(AUTH_DELIMITER)
            .ok_or(MalformedAuth::MissingDelimiter)?;
        let tag_bytes = hex::decode(tag_hex).map_err(|_| MalformedAuth::TagNotHex)?;
        let tag: [u8; TAG_LEN] = tag_bytes
            .as_slice()
            .try_into()
            .map_err(|_| MalformedAuth::TagLength(tag_bytes.len()))?;
        Ok(Self::new(message, tag))
    }
}

impl fmt::Display for AuthMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn artifacts_are_lower_case_hex() {
        assert_eq!(encode_artifact(&[0xAB, 0x01, 0xFF]), "ab01ff");
        assert_eq!(decode_artifact("AB01ff").unwrap(), vec![0xAB, 0x01, 0xFF]);
        assert!(decode_artifact("xyz").is_err());
    }

    #[test]
    fn auth_message_layout() {
        let msg = AuthMessage::new("AUTH_CHECK", [0x11; TAG_LEN]);
        let encoded = msg.encode();
        assert!(encoded.starts_with("AUTH_CHECK|1111"));
        assert_eq!(encoded.len(), "AUTH_CHECK|".len() + TAG_LEN * 2);
        assert_eq!(AuthMessage::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn missing_delimiter_is_malformed() {
        assert_eq!(
            AuthMessage::parse("AUTH_CHECK"),
            Err(MalformedAuth::MissingDelimiter)
        );
    }

    #[test]
    fn ambiguous_split_is_malformed() {
        let tag = hex::encode([0u8; TAG_LEN]);
        let content = format!("AUTH|CHECK|{tag}");
        assert_eq!(
            AuthMessage::parse(&content),
            Err(MalformedAuth::ExtraDelimiters(2))
        );
    }

    #[test]
    fn short_or_non_hex_tag_is_malformed() {
        assert_eq!(
            AuthMessage::parse("AUTH_CHECK|abcd"),
            Err(MalformedAuth::TagLength(2))
        );
        assert_eq!(
            AuthMessage::parse("AUTH_CHECK|zz"),
            Err(MalformedAuth::TagNotHex)
        );
    }

    proptest! {
        #[test]
        fn parse_never_panics(content in ".*") {
            let _ = AuthMessage::parse(&content);
        }

        #[test]
        fn delimiter_free_messages_parse_back(
            message in "[A-Za-z0-9_ ]{0,40}",
            tag in proptest::array::uniform32(any::<u8>()),
        ) {
            let msg = AuthMessage::new(message, tag);
            prop_assert_eq!(AuthMessage::parse(&msg.encode()), Ok(msg));
        }
    }
}
