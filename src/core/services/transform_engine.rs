use crate::core::errors::Result;
use crate::core::models::key_material::KeyMaterial;
use crate::core::models::operation::Operation;
use crate::core::models::work_item::{MessageInput, MessageOutput};
use crate::core::traits::cipher::CipherBackend;

/// One transform call: what to do, to which payload, with which keys.
pub struct TransformRequest<'i, 'k> {
    pub operation: Operation,
    pub input: MessageInput<'i>,
    pub keys: &'k KeyMaterial,
}

/// Runs encrypt+sign or decrypt+verify through a cipher backend.
///
/// Holds no state besides the backend; keys are borrowed per call.
pub struct TransformEngine<C: CipherBackend> {
    backend: C,
}

impl<C: CipherBackend> TransformEngine<C> {
    pub fn new(backend: C) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Fail unless `keys` holds the key `operation` cannot do without.
    pub fn check_keys(&self, operation: Operation, keys: &KeyMaterial) -> Result<()> {
        match operation {
            Operation::Encrypt => keys.recipient().map(|_| ())?,
            Operation::Decrypt => keys.decryption_key().map(|_| ())?,
        }
        Ok(())
    }

    pub fn run(&self, request: TransformRequest<'_, '_>) -> Result<MessageOutput> {
        let TransformRequest {
            operation,
            input,
            keys,
        } = request;
        log::debug!("{operation} {} input with {}", input.kind(), self.backend.name());

        match operation {
            Operation::Encrypt => {
                let recipient = keys.recipient()?;
                self.backend.encrypt(input, recipient, keys.signer())
            }
            Operation::Decrypt => {
                let key = keys.decryption_key()?;
                self.backend.decrypt(input, key, keys.verifier())
            }
        }
    }
}
