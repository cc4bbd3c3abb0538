use std::fmt::{self, Display};
use std::io::{self, BufRead, Read, Write};

use pgp::composed::{ArmorOptions, Message, MessageBuilder, SignedPublicKey};
use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::PublicKeyTrait;
use rand::thread_rng;

use crate::core::errors::{CryptoError, PgpipeError, Result};
use crate::core::models::key_material::{SigningKey, UnlockedKey};
use crate::core::models::key_usage::{primary_may_sign, subkey_may_sign};
use crate::core::models::work_item::{MessageInput, MessageOutput};
use crate::core::traits::cipher::CipherBackend;

const ARMOR_HEADER: &str = "-----BEGIN PGP MESSAGE-----";

/// Chunk size used when copying decrypted data to an output stream.
const STREAM_CHUNK: usize = 64 * 1024;

/// OpenPGP backend built on rPGP.
///
/// Produces SEIPD v1 messages (the format every OpenPGP implementation
/// reads), ASCII-armored for text input and binary otherwise.
pub struct RpgpBackend {
    sym_alg: SymmetricKeyAlgorithm,
    hash_alg: HashAlgorithm,
}

/// Where encrypted or decrypted output goes.
enum Sink<'w> {
    Text,
    Buffer,
    Writer(&'w mut dyn Write),
}

impl RpgpBackend {
    /// Create a backend using AES-256 and SHA-256.
    pub fn new() -> Self {
        Self {
            sym_alg: SymmetricKeyAlgorithm::AES256,
            hash_alg: HashAlgorithm::Sha256,
        }
    }

    /// Encrypt everything `reader` yields and write it to `sink`.
    fn seal(
        &self,
        reader: &mut dyn Read,
        recipient: &SignedPublicKey,
        signer: Option<&UnlockedKey>,
        sink: Sink<'_>,
    ) -> Result<MessageOutput> {
        let mut rng = thread_rng();
        let mut builder = MessageBuilder::from_reader("", reader).seipd_v1(&mut rng, self.sym_alg);

        // Prefer a dedicated encryption subkey; fall back to the primary key.
        let added = match recipient
            .public_subkeys
            .iter()
            .find(|sub| sub.is_encryption_key())
        {
            Some(subkey) => builder.encrypt_to_key(&mut rng, subkey).map(|_| ()),
            None => builder
                .encrypt_to_key(&mut rng, &recipient.primary_key)
                .map(|_| ()),
        };
        added.map_err(|e| CryptoError::EncryptionFailed {
            reason: format!("recipient key cannot encrypt: {e}"),
        })?;

        if let Some(signer) = signer {
            match signer.signing_key() {
                Some(SigningKey::Subkey(key)) => {
                    builder.sign(key, signer.password(), self.hash_alg)
                }
                Some(SigningKey::Primary(key)) => {
                    builder.sign(key, signer.password(), self.hash_alg)
                }
                None => {
                    return Err(CryptoError::EncryptionFailed {
                        reason: "the private key has no unlocked key that may sign".into(),
                    }
                    .into());
                }
            };
            log::debug!("Signing on behalf of {}", signer.fingerprint());
        }

        match sink {
            Sink::Text => builder
                .to_armored_string(&mut rng, ArmorOptions::default())
                .map(MessageOutput::Text)
                .map_err(encryption_failed),
            Sink::Buffer => builder
                .to_vec(&mut rng)
                .map(MessageOutput::Buffer)
                .map_err(encryption_failed),
            Sink::Writer(writer) => {
                let mut counting = CountingWriter::new(writer);
                builder
                    .to_writer(&mut rng, &mut counting)
                    .map_err(|e| PgpipeError::Io(io::Error::other(e.to_string())))?;
                counting.flush()?;
                Ok(MessageOutput::Streamed {
                    bytes_written: counting.written,
                })
            }
        }
    }

    /// Decrypt `message`, deliver the plaintext to `sink`, then verify.
    ///
    /// Verification needs the whole literal data to be read first, so a
    /// streamed plaintext has already been written when it fails; callers
    /// must not publish the stream in that case.
    fn open(
        &self,
        message: Message<'_>,
        key: &UnlockedKey,
        verifier: Option<&SignedPublicKey>,
        sink: Sink<'_>,
    ) -> Result<MessageOutput> {
        let mut message = message
            .decrypt(&key.password(), key.key())
            .map_err(|e| CryptoError::DecryptionFailed {
                reason: e.to_string(),
            })?;

        if message.is_compressed() {
            message = message.decompress().map_err(malformed)?;
        }

        let output = match sink {
            Sink::Text => MessageOutput::Text(message.as_data_string().map_err(malformed)?),
            Sink::Buffer => MessageOutput::Buffer(message.as_data_vec().map_err(malformed)?),
            Sink::Writer(writer) => {
                let mut buf = vec![0u8; STREAM_CHUNK];
                let mut written = 0u64;
                loop {
                    let n = message.read(&mut buf).map_err(malformed)?;
                    if n == 0 {
                        break;
                    }
                    writer.write_all(&buf[..n])?;
                    written += n as u64;
                }
                writer.flush()?;
                MessageOutput::Streamed {
                    bytes_written: written,
                }
            }
        };

        if let Some(verifier) = verifier {
            Self::verify(&message, verifier)?;
        }

        Ok(output)
    }

    /// Accept a signature made by a key of the verifier that may sign.
    fn verify(message: &Message<'_>, verifier: &SignedPublicKey) -> Result<()> {
        let by_primary = || {
            primary_may_sign(&verifier.details) && message.verify(&verifier.primary_key).is_ok()
        };
        let by_subkey = || {
            verifier
                .public_subkeys
                .iter()
                .filter(|sub| subkey_may_sign(&sub.signatures))
                .any(|sub| message.verify(sub).is_ok())
        };

        if by_primary() || by_subkey() {
            log::debug!("Signature verified");
            Ok(())
        } else {
            Err(CryptoError::SignatureVerificationFailed.into())
        }
    }
}

impl Default for RpgpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherBackend for RpgpBackend {
    fn encrypt(
        &self,
        input: MessageInput<'_>,
        recipient: &SignedPublicKey,
        signer: Option<&UnlockedKey>,
    ) -> Result<MessageOutput> {
        match input {
            MessageInput::Text(text) => {
                let mut source = text.as_bytes();
                self.seal(&mut source, recipient, signer, Sink::Text)
            }
            MessageInput::Buffer(bytes) => {
                let mut source = bytes;
                self.seal(&mut source, recipient, signer, Sink::Buffer)
            }
            MessageInput::Stream { reader, writer } => {
                self.seal(reader, recipient, signer, Sink::Writer(writer))
            }
        }
    }

    fn decrypt(
        &self,
        input: MessageInput<'_>,
        key: &UnlockedKey,
        verifier: Option<&SignedPublicKey>,
    ) -> Result<MessageOutput> {
        match input {
            MessageInput::Text(text) => {
                if !text.trim_start().starts_with(ARMOR_HEADER) {
                    return Err(CryptoError::MalformedMessage {
                        reason: "text is not an armored PGP message".into(),
                    }
                    .into());
                }
                let (message, _headers) = Message::from_armor(text.as_bytes()).map_err(malformed)?;
                self.open(message, key, verifier, Sink::Text)
            }
            MessageInput::Buffer(bytes) => {
                check_packet_start(bytes)?;
                let message = Message::from_bytes(bytes).map_err(malformed)?;
                self.open(message, key, verifier, Sink::Buffer)
            }
            MessageInput::Stream { reader, writer } => {
                check_packet_start(reader.fill_buf()?)?;
                let message = Message::from_bytes(StreamSource(reader)).map_err(malformed)?;
                self.open(message, key, verifier, Sink::Writer(writer))
            }
        }
    }

    fn name(&self) -> &str {
        "rpgp"
    }
}

/// Every OpenPGP packet header has its high bit set.
fn check_packet_start(head: &[u8]) -> Result<()> {
    match head.first() {
        None => Err(CryptoError::MalformedMessage {
            reason: "message is empty".into(),
        }
        .into()),
        Some(byte) if byte & 0x80 == 0 => Err(CryptoError::MalformedMessage {
            reason: "data is not a binary PGP message".into(),
        }
        .into()),
        Some(_) => Ok(()),
    }
}

fn malformed(e: impl Display) -> PgpipeError {
    CryptoError::MalformedMessage {
        reason: e.to_string(),
    }
    .into()
}

fn encryption_failed(e: impl Display) -> PgpipeError {
    CryptoError::EncryptionFailed {
        reason: e.to_string(),
    }
    .into()
}

/// Borrowed input stream in the shape rPGP's parser takes.
struct StreamSource<'r>(&'r mut (dyn BufRead + Send));

impl fmt::Debug for StreamSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamSource")
    }
}

impl Read for StreamSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl BufRead for StreamSource<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.0.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.0.consume(amt)
    }
}

/// Counts bytes passed through to the wrapped writer.
struct CountingWriter<'w> {
    inner: &'w mut dyn Write,
    written: u64,
}

impl<'w> CountingWriter<'w> {
    fn new(inner: &'w mut dyn Write) -> Self {
        Self { inner, written: 0 }
    }
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
