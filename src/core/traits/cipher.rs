use pgp::composed::SignedPublicKey;

use crate::core::errors::Result;
use crate::core::models::key_material::UnlockedKey;
use crate::core::models::work_item::{MessageInput, MessageOutput};

/// Port for OpenPGP encrypt/decrypt backends.
///
/// Implementations live in `adapters::cipher` (e.g. RpgpBackend).
/// Key presence rules are enforced by the transform engine; a backend
/// only receives keys that are required or explicitly optional.
pub trait CipherBackend: Send + Sync {
    /// Encrypt for `recipient`, additionally signing with `signer` when given.
    fn encrypt(
        &self,
        input: MessageInput<'_>,
        recipient: &SignedPublicKey,
        signer: Option<&UnlockedKey>,
    ) -> Result<MessageOutput>;

    /// Decrypt with `key`. When `verifier` is given the message must carry
    /// a valid signature from it.
    fn decrypt(
        &self,
        input: MessageInput<'_>,
        key: &UnlockedKey,
        verifier: Option<&SignedPublicKey>,
    ) -> Result<MessageOutput>;

    /// Human-readable name of this backend (e.g. "rpgp").
    fn name(&self) -> &str;
}
