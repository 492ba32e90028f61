//! The serializable message envelope.
//!
//! Every message in flight is a [`Message`]: opaque payload bytes plus
//! a [`Fingerprint`] of the payload's type. The fingerprint is the only
//! type information the runtime ever consults - routing and selective
//! receive compare fingerprints, and the payload is decoded only by a
//! receiver that matched on that type.
//!
//! Payloads are encoded with `postcard`. Any `Serialize + DeserializeOwned`
//! type is a [`Term`] and can be sent.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Decoding an envelope failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope carries a different type than the receiver expected.
    #[error("fingerprint mismatch: expected {expected:?}, found {found:?}")]
    FingerprintMismatch {
        /// Fingerprint of the type the receiver asked for.
        expected: Fingerprint,
        /// Fingerprint the envelope actually carries.
        found: Fingerprint,
    },
    /// The payload bytes did not deserialize.
    #[error("failed to decode payload: {0}")]
    Deserialize(#[from] postcard::Error),
}

/// A value that can travel inside an envelope.
///
/// Blanket-implemented for every `Serialize + DeserializeOwned + Send`
/// type. The type tag feeding the fingerprint defaults to the type's
/// canonical name, which is deterministic across nodes built from
/// identical type definitions.
pub trait Term: Serialize + DeserializeOwned + Send + 'static {
    /// The canonical tag identifying this type on the wire.
    fn type_tag() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: Serialize + DeserializeOwned + Send + 'static> Term for T {}

/// A content-addressed hash of a type: equality over fingerprints is
/// how the runtime decides whether an envelope "is" a given type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    /// The fingerprint of `T`.
    pub fn of<T: Term>() -> Self {
        Self::from_tag(T::type_tag())
    }

    /// Hashes an explicit type tag.
    pub fn from_tag(tag: &str) -> Self {
        let digest = Sha256::digest(tag.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(bytes)
    }

    /// The raw hash bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// The envelope: a type fingerprint plus the encoded payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct Message {
    fingerprint: Fingerprint,
    encoding: Vec<u8>,
}

impl Message {
    /// Wraps `value` in an envelope, capturing its type fingerprint.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for
    /// well-formed `Serialize` implementations.
    pub fn create<T: Term>(value: &T) -> Self {
        Self {
            fingerprint: Fingerprint::of::<T>(),
            encoding: postcard::to_allocvec(value).expect("message serialization failed"),
        }
    }

    /// Assembles an envelope from an already-known fingerprint and raw
    /// payload bytes, e.g. when a resolver hands back an opaque
    /// environment.
    pub fn from_parts(fingerprint: Fingerprint, encoding: Vec<u8>) -> Self {
        Self {
            fingerprint,
            encoding,
        }
    }

    /// The envelope's type fingerprint.
    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The raw payload bytes.
    pub fn encoding(&self) -> &[u8] {
        &self.encoding
    }

    /// Whether this envelope carries a `T`.
    pub fn is<T: Term>(&self) -> bool {
        self.fingerprint == Fingerprint::of::<T>()
    }

    /// Decodes the payload as `T`, failing if the fingerprint says the
    /// envelope carries something else.
    pub fn decode<T: Term>(&self) -> Result<T, DecodeError> {
        let expected = Fingerprint::of::<T>();
        if self.fingerprint != expected {
            return Err(DecodeError::FingerprintMismatch {
                expected,
                found: self.fingerprint,
            });
        }
        Ok(postcard::from_bytes(&self.encoding)?)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("fingerprint", &self.fingerprint)
            .field("len", &self.encoding.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pong {
        seq: u32,
    }

    #[test]
    fn create_then_decode() {
        let msg = Message::create(&Ping { seq: 7 });
        assert!(msg.is::<Ping>());
        assert_eq!(msg.decode::<Ping>().unwrap(), Ping { seq: 7 });
    }

    #[test]
    fn fingerprint_discriminates_structurally_identical_types() {
        // Ping and Pong encode identically; only the fingerprint tells
        // them apart.
        let msg = Message::create(&Ping { seq: 7 });
        assert!(!msg.is::<Pong>());
        assert!(matches!(
            msg.decode::<Pong>(),
            Err(DecodeError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(Fingerprint::of::<Ping>(), Fingerprint::of::<Ping>());
        assert_eq!(
            Fingerprint::from_tag("custom.Tag"),
            Fingerprint::from_tag("custom.Tag")
        );
        assert_ne!(
            Fingerprint::from_tag("custom.Tag"),
            Fingerprint::from_tag("custom.Tag2")
        );
    }

    #[test]
    fn envelope_survives_the_wire() {
        let msg = Message::create(&"hello".to_string());
        let bytes = postcard::to_allocvec(&msg).unwrap();
        let back: Message = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back.decode::<String>().unwrap(), "hello");
    }

    #[test]
    fn primitive_terms() {
        assert_eq!(Message::create(&42u64).decode::<u64>().unwrap(), 42);
        let t = ("label".to_string(), 3u32);
        assert_eq!(
            Message::create(&t).decode::<(String, u32)>().unwrap(),
            t
        );
    }
}
