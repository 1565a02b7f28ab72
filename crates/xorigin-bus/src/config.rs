use std::fmt;
use std::time::Duration;

use xorigin_codec::BlockEncoding;

use crate::error::{BusError, Result};

/// Default time a call waits for its reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_KEY_LEN: usize = 4096;
const MAX_PATTERN_LEN: usize = 2048;

/// Configuration for a cross-origin bus.
///
/// There is no `Default`: the allowlist must always be chosen explicitly.
#[derive(Clone)]
pub struct BusOptions {
    /// Host patterns of the origins allowed to talk to this bus. `*` matches
    /// any run of characters; `["*"]` accepts every origin.
    pub origins: Vec<String>,
    /// Shared key. Host and hosted side must agree on it to connect.
    /// Treated as opaque credential material and redacted in debug output.
    pub key: String,
    /// How long a call waits for its reply. `None` waits forever.
    pub reply_timeout: Option<Duration>,
    /// Block encoding used for every envelope.
    pub encoding: BlockEncoding,
}

impl BusOptions {
    /// Options accepting the given origin patterns.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
            key: String::new(),
            reply_timeout: Some(DEFAULT_REPLY_TIMEOUT),
            encoding: BlockEncoding::default(),
        }
    }

    /// Options accepting every origin.
    pub fn open() -> Self {
        Self::new(["*"])
    }

    /// Override the shared key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Override the reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Override the block encoding.
    pub fn with_encoding(mut self, encoding: BlockEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Check option bounds.
    pub fn validate(&self) -> Result<()> {
        if self.key.len() > MAX_KEY_LEN {
            return Err(BusError::InvalidOptions(format!(
                "key too long: {} bytes (max {})",
                self.key.len(),
                MAX_KEY_LEN
            )));
        }

        for pattern in &self.origins {
            if pattern.is_empty() || pattern.len() > MAX_PATTERN_LEN {
                return Err(BusError::InvalidOptions(format!(
                    "invalid origin pattern length: {}",
                    pattern.len()
                )));
            }
        }

        if self.reply_timeout == Some(Duration::ZERO) {
            return Err(BusError::InvalidOptions(
                "reply timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for BusOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusOptions")
            .field("origins", &self.origins)
            .field("key", &format_args!("<redacted:{} bytes>", self.key.len()))
            .field("reply_timeout", &self.reply_timeout)
            .field("encoding", &self.encoding)
            .finish()
    }
}
