/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The port (or its entangled counterpart) has been closed.
    #[error("port {0} is closed")]
    PortClosed(u64),

    /// A frame URL could not be turned into an origin.
    #[error("invalid frame url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The realm is not hosted by any other realm.
    #[error("realm {0} has no parent context")]
    NoParent(String),

    /// The hosted frame was removed from its host.
    #[error("frame {0} has been removed")]
    FrameRemoved(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
