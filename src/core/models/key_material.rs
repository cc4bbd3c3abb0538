use std::fmt;

use pgp::composed::{SignedPublicKey, SignedSecretKey};
use pgp::packet::{SecretKey, SecretSubkey};
use pgp::types::{KeyDetails, Password};
use secrecy::{ExposeSecret, SecretString};

use crate::core::errors::CryptoError;

/// Raw credential values as handed over by the host.
///
/// Key blocks may still contain escaped `\n` sequences; the loader
/// normalizes them. Empty strings are treated as absent.
#[derive(Debug, Default, Clone)]
pub struct Credentials {
    pub public_key: Option<String>,
    pub private_key: Option<SecretString>,
    pub passphrase: Option<SecretString>,
}

/// Position of the secret key that signs on behalf of a key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningSlot {
    Primary,
    Subkey(usize),
}

/// The signing-capable secret key of an [`UnlockedKey`].
pub enum SigningKey<'a> {
    Primary(&'a SecretKey),
    Subkey(&'a SecretSubkey),
}

/// A private key together with the passphrase that was verified to unlock it.
///
/// Built once by the key loader and never modified afterwards.
pub struct UnlockedKey {
    key: SignedSecretKey,
    passphrase: SecretString,
    signing: Option<SigningSlot>,
}

impl UnlockedKey {
    pub(crate) fn new(
        key: SignedSecretKey,
        passphrase: SecretString,
        signing: Option<SigningSlot>,
    ) -> Self {
        Self {
            key,
            passphrase,
            signing,
        }
    }

    pub fn key(&self) -> &SignedSecretKey {
        &self.key
    }

    /// The key that may sign and was unlocked by the passphrase, if any.
    pub fn signing_key(&self) -> Option<SigningKey<'_>> {
        match self.signing? {
            SigningSlot::Primary => Some(SigningKey::Primary(&self.key.primary_key)),
            SigningSlot::Subkey(index) => self
                .key
                .secret_subkeys
                .get(index)
                .map(|sub| SigningKey::Subkey(&sub.key)),
        }
    }

    /// A fresh rPGP password handle for one signing or decryption call.
    pub fn password(&self) -> Password {
        Password::from(self.passphrase.expose_secret())
    }

    /// Fingerprint of the primary key, safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint_hex(&self.key.primary_key)
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("fingerprint", &self.fingerprint())
            .field("signing", &self.signing)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Upper-case hex fingerprint of a key's primary key.
pub fn fingerprint_hex(key: &impl KeyDetails) -> String {
    hex::encode_upper(key.fingerprint().as_bytes())
}

/// Keys prepared for one batch. Shared read-only by every item.
#[derive(Default)]
pub struct KeyMaterial {
    pub public_key: Option<SignedPublicKey>,
    pub private_key: Option<UnlockedKey>,
}

impl KeyMaterial {
    /// Recipient for encryption. Required by the encrypt operation.
    pub fn recipient(&self) -> Result<&SignedPublicKey, CryptoError> {
        self.public_key
            .as_ref()
            .ok_or(CryptoError::MissingRecipientKey)
    }

    /// Decryption key. Required by the decrypt operation.
    pub fn decryption_key(&self) -> Result<&UnlockedKey, CryptoError> {
        self.private_key
            .as_ref()
            .ok_or(CryptoError::MissingDecryptionKey)
    }

    /// Optional signer for encryption.
    pub fn signer(&self) -> Option<&UnlockedKey> {
        self.private_key.as_ref()
    }

    /// Optional verifier for decryption. When set, verification is mandatory.
    pub fn verifier(&self) -> Option<&SignedPublicKey> {
        self.public_key.as_ref()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field(
                "public_key",
                &self.public_key.as_ref().map(fingerprint_hex),
            )
            .field("private_key", &self.private_key)
            .finish()
    }
}
