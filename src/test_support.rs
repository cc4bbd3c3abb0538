//! Fixture keys and helpers shared by unit tests.
//!
//! The keys are real GnuPG exports (Ed25519 primary for signing,
//! Curve25519 subkey for encryption). Alice's secret key is protected
//! with `ALICE_PASSPHRASE`; Bob's and Mallory's are not.
//!
//! Carol's primary key may only certify; she signs with an Ed25519 subkey.
//! `CAROL_SUBKEYS_SECRET` is a subkeys-only export whose primary holds no
//! secret material. Both are protected with `CAROL_PASSPHRASE`.

use secrecy::SecretString;

use crate::core::models::key_material::{Credentials, KeyMaterial};
use crate::core::services::key_loader::KeyLoader;

pub const ALICE_PUBLIC: &str = include_str!("../tests/fixtures/alice.pub.asc");
pub const ALICE_SECRET: &str = include_str!("../tests/fixtures/alice.sec.asc");
pub const ALICE_PASSPHRASE: &str = "alice-passphrase";

pub const BOB_PUBLIC: &str = include_str!("../tests/fixtures/bob.pub.asc");
pub const BOB_SECRET: &str = include_str!("../tests/fixtures/bob.sec.asc");

pub const MALLORY_PUBLIC: &str = include_str!("../tests/fixtures/mallory.pub.asc");
pub const MALLORY_SECRET: &str = include_str!("../tests/fixtures/mallory.sec.asc");

pub const CAROL_PUBLIC: &str = include_str!("../tests/fixtures/carol.pub.asc");
pub const CAROL_SECRET: &str = include_str!("../tests/fixtures/carol.sec.asc");
pub const CAROL_SUBKEYS_SECRET: &str = include_str!("../tests/fixtures/carol.subkeys.sec.asc");
pub const CAROL_PASSPHRASE: &str = "carol-passphrase";

/// Build credentials from optional armored blocks and passphrase.
pub fn credentials(
    public_key: Option<&str>,
    private_key: Option<&str>,
    passphrase: Option<&str>,
) -> Credentials {
    Credentials {
        public_key: public_key.map(str::to_string),
        private_key: private_key.map(|k| SecretString::from(k.to_string())),
        passphrase: passphrase.map(|p| SecretString::from(p.to_string())),
    }
}

/// Load key material, panicking on fixture errors.
pub fn keys(
    public_key: Option<&str>,
    private_key: Option<&str>,
    passphrase: Option<&str>,
) -> KeyMaterial {
    KeyLoader::load(&credentials(public_key, private_key, passphrase)).unwrap()
}

/// Alice sends to Bob: encrypt for Bob, sign as Alice.
pub fn alice_to_bob() -> KeyMaterial {
    keys(Some(BOB_PUBLIC), Some(ALICE_SECRET), Some(ALICE_PASSPHRASE))
}

/// Bob receives from Alice: decrypt as Bob, verify Alice's signature.
pub fn bob_from_alice() -> KeyMaterial {
    keys(Some(ALICE_PUBLIC), Some(BOB_SECRET), None)
}
