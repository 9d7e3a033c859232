//! Versioned ciphertext bundle.
//!
//! The version is read once when the bytes are parsed; everything after that
//! works with the typed variant.

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptedPayload, SealedContent};
use crate::error::{Error, Result};

/// Version written by [`ContentBundle::to_bytes`]
pub const BUNDLE_VERSION: u32 = 1;

/// Version 1 body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleV1 {
    /// Encrypted content
    pub content: EncryptedPayload,
    /// Content key wrapped to the recipient
    pub wrapped_key: EncryptedPayload,
}

/// A stored bundle, by format version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBundle {
    /// `{"version": 1, "content": ..., "wrappedKey": ...}`
    V1(BundleV1),
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    version: u32,
    #[serde(flatten)]
    body: &'a T,
}

impl ContentBundle {
    /// Bundle the output of `encrypt_content` in the current format
    pub fn seal(sealed: &SealedContent) -> Self {
        ContentBundle::V1(BundleV1 {
            content: sealed.content.clone(),
            wrapped_key: sealed.wrapped_key.clone(),
        })
    }

    /// Format version of this bundle
    pub fn version(&self) -> u32 {
        match self {
            ContentBundle::V1(_) => 1,
        }
    }

    /// The content and wrapped-key payloads
    pub fn payloads(&self) -> (&EncryptedPayload, &EncryptedPayload) {
        match self {
            ContentBundle::V1(body) => (&body.content, &body.wrapped_key),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ContentBundle::V1(body) => Ok(serde_json::to_vec(&Envelope {
                version: 1,
                body,
            })?),
        }
    }

    /// Parse JSON bytes.
    ///
    /// Unknown versions, missing fields and role mix-ups (an ephemeral key on
    /// the content payload or none on the wrapped key) are `MalformedPayload`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedPayload(format!("bundle: {}", e)))?;

        let bundle = match probe.version {
            1 => {
                let body: BundleV1 = serde_json::from_slice(bytes)
                    .map_err(|e| Error::MalformedPayload(format!("bundle v1: {}", e)))?;
                ContentBundle::V1(body)
            }
            other => {
                return Err(Error::MalformedPayload(format!(
                    "unsupported bundle version {}",
                    other
                )))
            }
        };

        let (content, wrapped_key) = bundle.payloads();
        if content.is_wrapped_key() || !wrapped_key.is_wrapped_key() {
            return Err(Error::MalformedPayload("bundle payload roles are swapped".into()));
        }

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt_content, EncryptionKeyPair};

    fn sealed() -> SealedContent {
        let recipient = EncryptionKeyPair::generate();
        encrypt_content(b"bundle me", &recipient.public_bytes()).unwrap()
    }

    #[test]
    fn test_wire_shape() {
        let bundle = ContentBundle::seal(&sealed());
        let value: serde_json::Value = serde_json::from_slice(&bundle.to_bytes().unwrap()).unwrap();

        assert_eq!(value["version"], 1);
        assert!(value["content"]["ciphertext"].is_string());
        assert!(value["content"].get("ephemeralPublicKey").is_none());
        assert!(value["wrappedKey"]["ephemeralPublicKey"].is_string());
    }

    #[test]
    fn test_parse_back() {
        let bundle = ContentBundle::seal(&sealed());
        let parsed = ContentBundle::from_bytes(&bundle.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, bundle);
        assert_eq!(parsed.version(), BUNDLE_VERSION);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let bundle = ContentBundle::seal(&sealed());
        let mut value: serde_json::Value = serde_json::from_slice(&bundle.to_bytes().unwrap()).unwrap();
        value["version"] = serde_json::json!(2);

        let result = ContentBundle::from_bytes(&serde_json::to_vec(&value).unwrap());
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        for bytes in [&b"not json"[..], b"{}", b"{\"version\":1}", b"[1,2,3]"] {
            assert!(matches!(
                ContentBundle::from_bytes(bytes),
                Err(Error::MalformedPayload(_))
            ));
        }
    }

    #[test]
    fn test_swapped_roles_rejected() {
        let s = sealed();
        let swapped = ContentBundle::V1(BundleV1 {
            content: s.wrapped_key.clone(),
            wrapped_key: s.content.clone(),
        });
        let result = ContentBundle::from_bytes(&swapped.to_bytes().unwrap());
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }
}
