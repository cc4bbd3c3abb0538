//! Key usage as declared by the key flags of self-signatures.

use pgp::composed::SignedKeyDetails;
use pgp::packet::{KeyFlags, Signature, SubpacketData};

/// Whether the primary key of a key set may sign.
///
/// A primary key whose self-signatures carry no key flags at all is treated
/// as unrestricted.
pub fn primary_may_sign(details: &SignedKeyDetails) -> bool {
    let signatures = details
        .direct_signatures
        .iter()
        .chain(details.users.iter().flat_map(|user| user.signatures.iter()));
    granted(signatures, KeyFlags::sign).unwrap_or(true)
}

/// Whether a subkey's binding signatures allow it to sign.
pub fn subkey_may_sign(signatures: &[Signature]) -> bool {
    granted(signatures, KeyFlags::sign).unwrap_or(false)
}

/// Whether a subkey's binding signatures allow it to encrypt.
pub fn subkey_may_encrypt(signatures: &[Signature]) -> bool {
    granted(signatures, |flags| flags.encrypt_comms() || flags.encrypt_storage()).unwrap_or(false)
}

/// `Some(true)` if any signature grants `usage`, `Some(false)` if flags are
/// present but none grants it, `None` without any key flags.
fn granted<'a>(
    signatures: impl IntoIterator<Item = &'a Signature>,
    usage: fn(&KeyFlags) -> bool,
) -> Option<bool> {
    let mut flagged = false;
    for config in signatures.into_iter().filter_map(Signature::config) {
        for subpacket in &config.hashed_subpackets {
            if let SubpacketData::KeyFlags(flags) = &subpacket.data {
                if usage(flags) {
                    return Some(true);
                }
                flagged = true;
            }
        }
    }
    flagged.then_some(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::services::key_loader::KeyLoader;
    use crate::test_support::*;

    #[test]
    fn certify_only_primary_may_not_sign() {
        let carol = KeyLoader::parse_public_key(CAROL_PUBLIC).unwrap();
        assert!(!primary_may_sign(&carol.details));

        let signing: Vec<bool> = carol
            .public_subkeys
            .iter()
            .map(|sub| subkey_may_sign(&sub.signatures))
            .collect();
        assert_eq!(signing, vec![true, false]);

        let encrypting: Vec<bool> = carol
            .public_subkeys
            .iter()
            .map(|sub| subkey_may_encrypt(&sub.signatures))
            .collect();
        assert_eq!(encrypting, vec![false, true]);
    }

    #[test]
    fn default_gnupg_primary_may_sign() {
        let alice = KeyLoader::parse_public_key(ALICE_PUBLIC).unwrap();
        assert!(primary_may_sign(&alice.details));
        assert!(
            alice
                .public_subkeys
                .iter()
                .all(|sub| !subkey_may_sign(&sub.signatures))
        );
    }

    #[test]
    fn no_flags_means_no_answer() {
        assert_eq!(granted(std::iter::empty(), KeyFlags::sign), None);
    }
}
