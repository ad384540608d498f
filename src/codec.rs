//! Payload encoding shared by the persistent backends
//!
//! Payloads are stored as JSON, optionally LZ4-compressed. The compression
//! flag travels with the record so either setting can read both forms.

use crate::config::CodecConfig;
use crate::error::{StorageError, StorageResult};
use serde_json::Value;

/// Serialized payload as written to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub is_compressed: bool,
}

/// Encodes and decodes record payloads
#[derive(Debug, Clone, Default)]
pub struct PayloadCodec {
    config: CodecConfig,
}

impl PayloadCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn encode(&self, value: &Value) -> StorageResult<EncodedPayload> {
        let bytes = serde_json::to_vec(value)?;
        if self.config.compress && bytes.len() >= self.config.compression_threshold {
            return Ok(EncodedPayload {
                bytes: lz4_flex::compress_prepend_size(&bytes),
                is_compressed: true,
            });
        }
        Ok(EncodedPayload {
            bytes,
            is_compressed: false,
        })
    }

    pub fn decode(&self, bytes: &[u8], is_compressed: bool) -> StorageResult<Value> {
        if is_compressed {
            let raw = lz4_flex::decompress_size_prepended(bytes).map_err(|e| {
                StorageError::Serialization(format!("corrupt compressed payload: {e}"))
            })?;
            return Ok(serde_json::from_slice(&raw)?);
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}
