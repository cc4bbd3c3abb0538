use std::time::SystemTime;

use pgp::composed::{Deserializable, Message, MessageBuilder, SignedPublicKey, SignedSecretKey};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::packet::{SignatureConfig, SignatureType, Subpacket, SubpacketData};
use pgp::types::{KeyDetails, Password, SecretKeyTrait};
use rand::thread_rng;
use secrecy::{ExposeSecret, SecretString};

use crate::core::errors::KeyParseError;
use crate::core::models::key_material::{
    Credentials, KeyMaterial, SigningSlot, UnlockedKey, fingerprint_hex,
};
use crate::core::models::key_usage::{primary_may_sign, subkey_may_encrypt, subkey_may_sign};

/// Data signed once to prove a passphrase unlocks the private key.
const UNLOCK_CHALLENGE: &[u8] = b"pgpipe unlock challenge";

/// Turns raw credentials into key material for one batch.
pub struct KeyLoader;

impl KeyLoader {
    /// Parse both keys and unlock the private key.
    ///
    /// Absent or empty fields produce absent keys; whether that is acceptable
    /// depends on the operation and is checked later.
    pub fn load(credentials: &Credentials) -> Result<KeyMaterial, KeyParseError> {
        let private_key = match credentials
            .private_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
        {
            Some(armored) => {
                let key = Self::parse_private_key(armored.expose_secret())?;
                let passphrase = credentials
                    .passphrase
                    .clone()
                    .unwrap_or_else(|| SecretString::from(String::new()));
                Some(Self::unlock(key, passphrase)?)
            }
            None => None,
        };

        let public_key = match credentials
            .public_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
        {
            Some(armored) => Some(Self::parse_public_key(armored)?),
            None => None,
        };

        log::debug!(
            "Key material loaded (public key: {}, private key: {})",
            public_key.is_some(),
            private_key.is_some()
        );

        Ok(KeyMaterial {
            public_key,
            private_key,
        })
    }

    /// Replace escaped `\n` sequences with real line breaks.
    ///
    /// Credential stores often keep armored blocks on a single line.
    pub fn normalize_armor(raw: &str) -> String {
        raw.replace("\\n", "\n").trim().to_string()
    }

    /// Parse an armored private key block.
    pub fn parse_private_key(armored: &str) -> Result<SignedSecretKey, KeyParseError> {
        let normalized = Self::normalize_armor(armored);
        if normalized.contains("PUBLIC KEY BLOCK") {
            return Err(KeyParseError::InvalidPrivateKey {
                reason: "found a public key block where a private key was expected".into(),
            });
        }

        let (key, _headers) = SignedSecretKey::from_string(&normalized).map_err(|e| {
            KeyParseError::InvalidPrivateKey {
                reason: e.to_string(),
            }
        })?;
        log::debug!("Parsed private key {}", fingerprint_hex(&key.primary_key));
        Ok(key)
    }

    /// Parse an armored public key block.
    pub fn parse_public_key(armored: &str) -> Result<SignedPublicKey, KeyParseError> {
        let normalized = Self::normalize_armor(armored);
        if normalized.contains("PRIVATE KEY BLOCK") {
            return Err(KeyParseError::InvalidPublicKey {
                reason: "found a private key block where a public key was expected".into(),
            });
        }

        let (key, _headers) = SignedPublicKey::from_string(&normalized).map_err(|e| {
            KeyParseError::InvalidPublicKey {
                reason: e.to_string(),
            }
        })?;
        log::debug!("Parsed public key {}", fingerprint_hex(&key));
        Ok(key)
    }

    /// Check that `passphrase` unlocks `key` and pair them.
    ///
    /// The passphrase is proven against a secret key that may sign
    /// (subkeys before the primary), else against an encryption subkey, so
    /// subkeys-only exports unlock too. Keys without secret-key protection
    /// accept any passphrase.
    pub fn unlock(
        key: SignedSecretKey,
        passphrase: SecretString,
    ) -> Result<UnlockedKey, KeyParseError> {
        let password = Password::from(passphrase.expose_secret());

        let mut signing_slots: Vec<SigningSlot> = key
            .secret_subkeys
            .iter()
            .enumerate()
            .filter(|(_, sub)| subkey_may_sign(&sub.signatures))
            .map(|(index, _)| SigningSlot::Subkey(index))
            .collect();
        if primary_may_sign(&key.details) {
            signing_slots.push(SigningSlot::Primary);
        }

        for &slot in &signing_slots {
            let unlocked = match slot {
                SigningSlot::Primary => sign_challenge(&key.primary_key, &password),
                SigningSlot::Subkey(index) => {
                    sign_challenge(&key.secret_subkeys[index].key, &password)
                }
            };
            match unlocked {
                Ok(()) => {
                    log::debug!("Passphrase verified with signing key {slot:?}");
                    return Ok(UnlockedKey::new(key, passphrase, Some(slot)));
                }
                Err(e) => log::debug!("Signing key {slot:?} did not unlock: {e}"),
            }
        }

        let encryption_subkeys: Vec<usize> = key
            .secret_subkeys
            .iter()
            .enumerate()
            .filter(|(_, sub)| subkey_may_encrypt(&sub.signatures))
            .map(|(index, _)| index)
            .collect();

        for &index in &encryption_subkeys {
            match decrypt_challenge(&key, index, &password) {
                Ok(()) => {
                    log::debug!("Passphrase verified with encryption subkey {index}");
                    return Ok(UnlockedKey::new(key, passphrase, None));
                }
                Err(e) => log::debug!("Encryption subkey {index} did not unlock: {e}"),
            }
        }

        if signing_slots.is_empty() && encryption_subkeys.is_empty() {
            return Err(KeyParseError::InvalidPrivateKey {
                reason: "no secret key in the set may sign or encrypt".into(),
            });
        }
        Err(KeyParseError::WrongPassphrase)
    }
}

/// Sign [`UNLOCK_CHALLENGE`] with `signer`.
fn sign_challenge<K>(signer: &K, password: &Password) -> pgp::errors::Result<()>
where
    K: SecretKeyTrait + KeyDetails,
{
    let mut config = SignatureConfig::from_key(thread_rng(), signer, SignatureType::Binary)?;
    config.hashed_subpackets = vec![
        Subpacket::regular(SubpacketData::IssuerFingerprint(signer.fingerprint()))?,
        Subpacket::critical(SubpacketData::SignatureCreationTime(SystemTime::now().into()))?,
    ];
    config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(signer.key_id()))?];

    config.sign(signer, password, UNLOCK_CHALLENGE)?;
    Ok(())
}

/// Encrypt [`UNLOCK_CHALLENGE`] to one encryption subkey of `key` and decrypt it again.
fn decrypt_challenge(
    key: &SignedSecretKey,
    index: usize,
    password: &Password,
) -> pgp::errors::Result<()> {
    let mut rng = thread_rng();
    let mut builder = MessageBuilder::from_reader("", UNLOCK_CHALLENGE)
        .seipd_v1(&mut rng, SymmetricKeyAlgorithm::AES128);
    builder.encrypt_to_key(&mut rng, key.secret_subkeys[index].key.public_key())?;
    let sealed = builder.to_vec(&mut rng)?;

    Message::from_bytes(&sealed[..])?.decrypt(password, key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::key_material::SigningKey;
    use crate::test_support::*;

    #[test]
    fn loads_protected_private_key_with_passphrase() {
        let creds = credentials(None, Some(ALICE_SECRET), Some(ALICE_PASSPHRASE));
        let keys = KeyLoader::load(&creds).unwrap();

        assert!(keys.private_key.is_some());
        assert!(keys.public_key.is_none());
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let creds = credentials(None, Some(ALICE_SECRET), Some("not-the-passphrase"));
        let result = KeyLoader::load(&creds);
        assert!(matches!(result, Err(KeyParseError::WrongPassphrase)));
    }

    #[test]
    fn missing_passphrase_for_protected_key_is_rejected() {
        let creds = credentials(None, Some(ALICE_SECRET), None);
        let result = KeyLoader::load(&creds);
        assert!(matches!(result, Err(KeyParseError::WrongPassphrase)));
    }

    #[test]
    fn unprotected_key_needs_no_passphrase() {
        let creds = credentials(Some(ALICE_PUBLIC), Some(BOB_SECRET), None);
        let keys = KeyLoader::load(&creds).unwrap();

        assert!(keys.private_key.is_some());
        assert!(keys.public_key.is_some());
    }

    #[test]
    fn certify_only_primary_signs_with_subkey() {
        let creds = credentials(None, Some(CAROL_SECRET), Some(CAROL_PASSPHRASE));
        let keys = KeyLoader::load(&creds).unwrap();

        let carol = keys.private_key.unwrap();
        assert!(matches!(carol.signing_key(), Some(SigningKey::Subkey(_))));
    }

    #[test]
    fn default_gnupg_key_signs_with_primary() {
        let keys = keys(None, Some(BOB_SECRET), None);
        let bob = keys.private_key.unwrap();
        assert!(matches!(bob.signing_key(), Some(SigningKey::Primary(_))));
    }

    #[test]
    fn subkeys_only_export_unlocks_with_correct_passphrase() {
        let creds = credentials(None, Some(CAROL_SUBKEYS_SECRET), Some(CAROL_PASSPHRASE));
        let keys = KeyLoader::load(&creds).unwrap();

        let carol = keys.private_key.unwrap();
        assert!(matches!(carol.signing_key(), Some(SigningKey::Subkey(_))));
    }

    #[test]
    fn subkeys_only_export_rejects_wrong_passphrase() {
        let creds = credentials(None, Some(CAROL_SUBKEYS_SECRET), Some("not-carols"));
        let result = KeyLoader::load(&creds);
        assert!(matches!(result, Err(KeyParseError::WrongPassphrase)));
    }

    #[test]
    fn garbage_private_key_is_invalid() {
        let creds = credentials(None, Some("not a key at all"), None);
        let result = KeyLoader::load(&creds);
        assert!(matches!(
            result,
            Err(KeyParseError::InvalidPrivateKey { .. })
        ));
    }

    #[test]
    fn garbage_public_key_is_invalid() {
        let creds = credentials(
            Some("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nnope\n-----END PGP PUBLIC KEY BLOCK-----"),
            None,
            None,
        );
        let result = KeyLoader::load(&creds);
        assert!(matches!(result, Err(KeyParseError::InvalidPublicKey { .. })));
    }

    #[test]
    fn swapped_key_blocks_are_invalid() {
        let creds = credentials(Some(BOB_SECRET), None, None);
        assert!(matches!(
            KeyLoader::load(&creds),
            Err(KeyParseError::InvalidPublicKey { .. })
        ));

        let creds = credentials(None, Some(BOB_PUBLIC), None);
        assert!(matches!(
            KeyLoader::load(&creds),
            Err(KeyParseError::InvalidPrivateKey { .. })
        ));
    }

    #[test]
    fn escaped_newlines_are_normalized() {
        let escaped = BOB_PUBLIC.replace('\n', "\\n");
        assert!(!escaped.contains('\n'));

        let creds = credentials(Some(&escaped), None, None);
        let keys = KeyLoader::load(&creds).unwrap();

        let direct = KeyLoader::parse_public_key(BOB_PUBLIC).unwrap();
        assert_eq!(
            fingerprint_hex(&keys.public_key.unwrap()),
            fingerprint_hex(&direct)
        );
    }

    #[test]
    fn empty_fields_count_as_absent() {
        let creds = credentials(Some("  "), Some(""), Some(""));
        let keys = KeyLoader::load(&creds).unwrap();

        assert!(keys.public_key.is_none());
        assert!(keys.private_key.is_none());
    }

    #[test]
    fn normalize_armor_trims_and_unescapes() {
        let raw = "  -----BEGIN-----\\nabc\\n-----END-----  ";
        assert_eq!(
            KeyLoader::normalize_armor(raw),
            "-----BEGIN-----\nabc\n-----END-----"
        );
    }
}
