//! Tag-driven decoding for objects whose type is only known at runtime.
//!
//! Inventories and world state can reference saved objects of several
//! concrete types through one string tag (see
//! [`ItemHandle`](crate::codec::rules::ItemHandle)). Callers register each
//! tag's decoder once at startup; a lookup then resolves the envelope tag to
//! that decoder instead of doing any per-call type reflection.

use crate::codec::{Codec, CodecError};
use serde::de::DeserializeOwned;
use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No decoder registered for type tag `{0}`")]
    UnknownTag(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

type DecodeFn = fn(&Codec, &str, &str) -> Result<Box<dyn Any>, CodecError>;

fn decode_as<T: DeserializeOwned + Any>(
    codec: &Codec,
    text: &str,
    tag: &str,
) -> Result<Box<dyn Any>, CodecError> {
    Ok(Box::new(codec.decode::<T>(text, tag)?))
}

struct Entry {
    tag: String,
    decode: DecodeFn,
}

/// Maps stable type tags to concrete decode functions.
#[derive(Default)]
pub struct DecodeRegistry {
    entries: Vec<Entry>,
}

impl DecodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` as the decoded type for `tag`.
    ///
    /// The first registration for a tag wins; later ones are ignored at
    /// lookup time.
    pub fn register<T: DeserializeOwned + Any>(&mut self, tag: impl Into<String>) {
        self.entries.push(Entry {
            tag: tag.into(),
            decode: decode_as::<T>,
        });
    }

    /// Whether a decoder is registered for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.iter().any(|entry| entry.tag == tag)
    }

    /// Decode an envelope by the tag it carries.
    pub fn decode(&self, codec: &Codec, text: &str) -> Result<Box<dyn Any>, RegistryError> {
        let tag = codec.peek_tag(text)?;
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.tag == tag)
            .ok_or(RegistryError::UnknownTag(tag))?;
        Ok((entry.decode)(codec, text, &entry.tag)?)
    }
}
