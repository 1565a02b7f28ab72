use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CodecError, Result};

/// Byte layout of the JSON text inside a [`Block`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockEncoding {
    /// UTF-8 bytes of the JSON text.
    #[default]
    Utf8,
    /// One byte per UTF-16 code unit of the JSON text (legacy peers).
    ///
    /// Code units above 0xFF cannot be carried and fail to encode.
    Latin1,
}

impl fmt::Display for BlockEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockEncoding::Utf8 => f.write_str("utf8"),
            BlockEncoding::Latin1 => f.write_str("latin1"),
        }
    }
}

/// One encoded value, opaque to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Block(Bytes);

impl Block {
    /// Wrap raw bytes received from a peer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes of the block.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block(<{} bytes>)", self.0.len())
    }
}

/// Encode a value into a block.
///
/// Fails with [`CodecError::NotSerializable`] when the value has no JSON
/// text (maps with non-string keys, `Serialize` impls that error).
pub fn encode<T: Serialize + ?Sized>(value: &T, encoding: BlockEncoding) -> Result<Block> {
    let text = serde_json::to_string(value).map_err(CodecError::NotSerializable)?;
    match encoding {
        BlockEncoding::Utf8 => Ok(Block(Bytes::from(text.into_bytes()))),
        BlockEncoding::Latin1 => {
            let mut buf = BytesMut::with_capacity(text.len());
            for (index, unit) in text.encode_utf16().enumerate() {
                let byte =
                    u8::try_from(unit).map_err(|_| CodecError::Unrepresentable { unit, index })?;
                buf.put_u8(byte);
            }
            Ok(Block(buf.freeze()))
        }
    }
}

/// Decode a block back into a JSON value.
pub fn decode(block: &Block, encoding: BlockEncoding) -> Result<Value> {
    match encoding {
        BlockEncoding::Utf8 => {
            serde_json::from_slice(block.as_bytes()).map_err(CodecError::Malformed)
        }
        BlockEncoding::Latin1 => {
            let text: String = block.as_bytes().iter().copied().map(char::from).collect();
            serde_json::from_str(&text).map_err(CodecError::Malformed)
        }
    }
}
