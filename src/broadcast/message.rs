//! Fan-out message frames

use bytes::{Bytes, BytesMut};

use crate::protocol::constants::MESSAGE_KIND;
use crate::protocol::value::encode_bulks;

/// A message ready to be written to any subscriber
///
/// The RESP frame `["message", channel, payload]` is encoded once at publish
/// time. Cloning only bumps reference counts, so every subscriber queue shares
/// the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    channel: Bytes,
    frame: Bytes,
}

impl Message {
    /// Encode a message for `channel` carrying `payload`
    pub fn encode(channel: &[u8], payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(channel.len() + payload.len() + 40);
        encode_bulks(&mut buf, &[MESSAGE_KIND, channel, payload]);

        Self {
            channel: Bytes::copy_from_slice(channel),
            frame: buf.freeze(),
        }
    }

    pub fn channel(&self) -> &Bytes {
        &self.channel
    }

    /// The encoded wire frame
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_message_frame() {
        let msg = Message::encode(b"news", b"hello");

        assert_eq!(msg.channel().as_ref(), b"news");
        assert_eq!(
            msg.frame().as_ref(),
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n"
        );
        assert_eq!(msg.len(), msg.frame().len());
    }

    #[test]
    fn test_clone_shares_frame() {
        let msg = Message::encode(b"c", b"payload");
        let copy = msg.clone();
        assert_eq!(msg.frame().as_ptr(), copy.frame().as_ptr());
    }
}
