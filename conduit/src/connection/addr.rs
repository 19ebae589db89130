use std::fmt;

/// A peer's network address, stored as the raw bytes the control layer
/// produced.
///
/// The core never interprets the bytes; the control layer owning the
/// connection does (see [`tcp::peer_socket_addr`](crate::tcp::peer_socket_addr)).
/// An address is never empty, so a present address always has a non-zero
/// length.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr(Box<[u8]>);

impl PeerAddr {
    /// Wraps raw address bytes. Returns `None` for an empty slice.
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerAddr").field("len", &self.0.len()).finish()
    }
}
