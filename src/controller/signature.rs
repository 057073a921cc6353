// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Controller signature protocol.
//!
//! ## Wire Layout
//!
//! Signatures travel as a list of 32-byte words. The first word is always
//! the class hash of the controller version that produced the signature;
//! verifiers use it to pick the verification routine.
//!
//! ```text
//! owner:   [class_hash, r, s, y_parity]
//! session: [class_hash, SESSION_MAGIC, session_key, r, s, y_parity]
//! ```
//!
//! A signature with a missing or wrong class hash is rejected by verifiers
//! even when the ECDSA part is valid.

use std::fmt;

use alloy::{
    dyn_abi::TypedData,
    primitives::{b256, Address, Signature, B256, U256},
};
use serde::{Deserialize, Serialize};

/// Magic word marking session-attributed signatures (`"session-token"`).
pub const SESSION_MAGIC: B256 =
    b256!("0x0000000000000000000000000000000000000073657373696f6e2d746f6b656e");

const CLASS_HASH_V1: B256 =
    b256!("0x05f0f2ae9301e0468ca3f9218dadd43a448a71acc66b6ee1b5ad7be9d5d1f4ad");
const CLASS_HASH_V2: B256 =
    b256!("0x0743c83c41ce99ad470aa308823f417b2141e02e04571f5c0004e743556e7faf");

/// Controller protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerVersion {
    V1,
    V2,
}

impl ControllerVersion {
    /// Version used for newly provisioned controllers.
    pub const LATEST: ControllerVersion = ControllerVersion::V2;

    /// Class hash identifying this version's verification routine.
    pub fn class_hash(self) -> B256 {
        match self {
            ControllerVersion::V1 => CLASS_HASH_V1,
            ControllerVersion::V2 => CLASS_HASH_V2,
        }
    }

    pub fn from_class_hash(hash: &B256) -> Option<Self> {
        [ControllerVersion::V1, ControllerVersion::V2]
            .into_iter()
            .find(|version| version.class_hash() == *hash)
    }
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerVersion::V1 => write!(f, "v1"),
            ControllerVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Errors raised while decoding a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature has {0} components, expected 4 (owner) or 6 (session)")]
    Length(usize),
    #[error("session signature is missing the session marker")]
    MissingSessionMagic,
    #[error("y parity must be 0 or 1")]
    Parity,
    #[error("session key does not fit in an address")]
    SessionKey,
}

/// Class-hash tagged ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<B256>", try_from = "Vec<B256>")]
pub enum ControllerSignature {
    Owner {
        class_hash: B256,
        signature: Signature,
    },
    Session {
        class_hash: B256,
        session_key: Address,
        signature: Signature,
    },
}

impl ControllerSignature {
    /// Owner signature tagged for `version`.
    pub fn owner(version: ControllerVersion, signature: Signature) -> Self {
        Self::Owner {
            class_hash: version.class_hash(),
            signature,
        }
    }

    /// Session signature tagged for `version`.
    pub fn session(version: ControllerVersion, session_key: Address, signature: Signature) -> Self {
        Self::Session {
            class_hash: version.class_hash(),
            session_key,
            signature,
        }
    }

    pub fn class_hash(&self) -> &B256 {
        match self {
            Self::Owner { class_hash, .. } | Self::Session { class_hash, .. } => class_hash,
        }
    }

    /// Raw ECDSA part.
    pub fn inner(&self) -> &Signature {
        match self {
            Self::Owner { signature, .. } | Self::Session { signature, .. } => signature,
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session { .. })
    }

    /// Encode to the word list verifiers expect.
    pub fn to_words(&self) -> Vec<B256> {
        let sig = self.inner();
        let ecdsa = [
            word(sig.r()),
            word(sig.s()),
            B256::with_last_byte(u8::from(sig.v())),
        ];
        match self {
            Self::Owner { class_hash, .. } => {
                let mut words = vec![*class_hash];
                words.extend(ecdsa);
                words
            }
            Self::Session {
                class_hash,
                session_key,
                ..
            } => {
                let mut words = vec![*class_hash, SESSION_MAGIC, session_key.into_word()];
                words.extend(ecdsa);
                words
            }
        }
    }

    /// Decode from the word list. Fails only on malformed shapes; an
    /// unknown class hash decodes fine and is rejected at verification.
    pub fn from_words(words: &[B256]) -> Result<Self, SignatureError> {
        match words {
            [class_hash, r, s, v] => Ok(Self::Owner {
                class_hash: *class_hash,
                signature: ecdsa(r, s, v)?,
            }),
            [class_hash, magic, key, r, s, v] => {
                if *magic != SESSION_MAGIC {
                    return Err(SignatureError::MissingSessionMagic);
                }
                if key[..12].iter().any(|byte| *byte != 0) {
                    return Err(SignatureError::SessionKey);
                }
                Ok(Self::Session {
                    class_hash: *class_hash,
                    session_key: Address::from_word(*key),
                    signature: ecdsa(r, s, v)?,
                })
            }
            other => Err(SignatureError::Length(other.len())),
        }
    }
}

impl From<ControllerSignature> for Vec<B256> {
    fn from(signature: ControllerSignature) -> Self {
        signature.to_words()
    }
}

impl TryFrom<Vec<B256>> for ControllerSignature {
    type Error = SignatureError;

    fn try_from(words: Vec<B256>) -> Result<Self, Self::Error> {
        Self::from_words(&words)
    }
}

fn word(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

fn ecdsa(r: &B256, s: &B256, v: &B256) -> Result<Signature, SignatureError> {
    let parity = match U256::from_be_slice(v.as_slice()) {
        p if p == U256::ZERO => false,
        p if p == U256::from(1u8) => true,
        _ => return Err(SignatureError::Parity),
    };
    Ok(Signature::new(
        U256::from_be_slice(r.as_slice()),
        U256::from_be_slice(s.as_slice()),
        parity,
    ))
}

/// EIP-712 signing hash of a typed-data document.
///
/// Pure function of the document: structurally equal inputs always give
/// the same digest.
pub fn hash_typed_data(typed_data: &TypedData) -> Result<B256, alloy::dyn_abi::Error> {
    typed_data.eip712_signing_hash()
}

/// Whether `signature` over `hash` recovers to `expected`.
///
/// Recovery failures count as "not valid" rather than errors.
pub fn recovers_to(signature: &Signature, hash: &B256, expected: Address) -> bool {
    match signature.recover_address_from_prehash(hash) {
        Ok(recovered) => recovered == expected,
        Err(_) => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::signing::generate_device_signer;
    use alloy::signers::SignerSync;

    pub(crate) fn mail_typed_data() -> serde_json::Value {
        serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "Person": [
                    { "name": "name", "type": "string" },
                    { "name": "wallet", "type": "address" }
                ],
                "Mail": [
                    { "name": "from", "type": "Person" },
                    { "name": "to", "type": "Person" },
                    { "name": "contents", "type": "string" }
                ]
            },
            "primaryType": "Mail",
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "message": {
                "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
                "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
                "contents": "Hello, Bob!"
            }
        })
    }

    #[test]
    fn known_typed_data_hash() {
        let typed: TypedData = serde_json::from_value(mail_typed_data()).unwrap();
        assert_eq!(
            hash_typed_data(&typed).unwrap(),
            b256!("0xbe609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2")
        );
    }

    #[test]
    fn hash_ignores_key_order() {
        let a: TypedData = serde_json::from_value(mail_typed_data()).unwrap();
        let reordered = serde_json::json!({
            "message": mail_typed_data()["message"],
            "domain": mail_typed_data()["domain"],
            "primaryType": "Mail",
            "types": mail_typed_data()["types"]
        });
        let b: TypedData = serde_json::from_value(reordered).unwrap();
        assert_eq!(hash_typed_data(&a).unwrap(), hash_typed_data(&b).unwrap());
    }

    #[test]
    fn session_magic_is_left_padded_tag() {
        assert_eq!(&SESSION_MAGIC[19..], b"session-token");
        assert!(SESSION_MAGIC[..19].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn class_hashes_map_back_to_versions() {
        for version in [ControllerVersion::V1, ControllerVersion::V2] {
            assert_eq!(
                ControllerVersion::from_class_hash(&version.class_hash()),
                Some(version)
            );
        }
        assert_eq!(ControllerVersion::from_class_hash(&B256::ZERO), None);
        assert_ne!(
            ControllerVersion::V1.class_hash(),
            ControllerVersion::V2.class_hash()
        );
    }

    #[test]
    fn owner_words_round_trip() {
        let signer = generate_device_signer();
        let hash = B256::repeat_byte(0x42);
        let raw = signer.sign_hash_sync(&hash).unwrap();

        let signature = ControllerSignature::owner(ControllerVersion::V2, raw);
        let words = signature.to_words();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], ControllerVersion::V2.class_hash());

        let decoded = ControllerSignature::from_words(&words).unwrap();
        assert_eq!(decoded, signature);
        assert!(recovers_to(decoded.inner(), &hash, signer.address()));
    }

    #[test]
    fn session_words_carry_key() {
        let signer = generate_device_signer();
        let hash = B256::repeat_byte(0x07);
        let raw = signer.sign_hash_sync(&hash).unwrap();

        let signature = ControllerSignature::session(ControllerVersion::V1, signer.address(), raw);
        let words = signature.to_words();
        assert_eq!(words.len(), 6);
        assert_eq!(words[1], SESSION_MAGIC);

        let decoded = ControllerSignature::from_words(&words).unwrap();
        assert!(decoded.is_session());
        assert_eq!(decoded, signature);
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        let w = B256::ZERO;
        assert_eq!(
            ControllerSignature::from_words(&[w, w]),
            Err(SignatureError::Length(2))
        );
        assert_eq!(
            ControllerSignature::from_words(&[w, w, w, B256::with_last_byte(2)]),
            Err(SignatureError::Parity)
        );
        assert_eq!(
            ControllerSignature::from_words(&[w, w, w, w, w, w]),
            Err(SignatureError::MissingSessionMagic)
        );
        assert_eq!(
            ControllerSignature::from_words(&[w, SESSION_MAGIC, B256::repeat_byte(0xff), w, w, w]),
            Err(SignatureError::SessionKey)
        );
    }

    #[test]
    fn serde_uses_word_list() {
        let signer = generate_device_signer();
        let raw = signer.sign_hash_sync(&B256::ZERO).unwrap();
        let signature = ControllerSignature::owner(ControllerVersion::V2, raw);

        let json = serde_json::to_value(signature).unwrap();
        let words = json.as_array().unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(
            words[0].as_str().unwrap(),
            ControllerVersion::V2.class_hash().to_string()
        );

        let back: ControllerSignature = serde_json::from_value(json).unwrap();
        assert_eq!(back, signature);
    }

    #[test]
    fn recovery_failure_is_not_valid() {
        let bogus = Signature::new(U256::ZERO, U256::ZERO, false);
        assert!(!recovers_to(&bogus, &B256::ZERO, Address::ZERO));
    }
}
