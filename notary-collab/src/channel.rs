//! Sync channel adapter: operations in, bytes out, and back.
//!
//! Sending never waits. A payload that does not fit the outbound buffer is
//! dropped and counted; the local canvas keeps the operation regardless.
//! Received payloads that fail to parse or validate are dropped and counted
//! too. Nothing here retries, acknowledges or reorders.

use notary_core::Operation;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::protocol::{decode_operation, encode_operation, ProtocolError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: u64,
    pub send_failures: u64,
    pub received: u64,
    pub dropped: u64,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] ProtocolError),
    #[error("outbound buffer full")]
    Full,
    #[error("channel closed")]
    Closed,
}

pub struct SyncChannel {
    outbound: mpsc::Sender<Vec<u8>>,
    stats: ChannelStats,
}

impl SyncChannel {
    pub fn new(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            outbound,
            stats: ChannelStats::default(),
        }
    }

    /// Serialize `op` and queue it without waiting.
    pub fn send(&mut self, op: &Operation) -> Result<(), SendError> {
        let result = encode_operation(op)
            .map_err(SendError::from)
            .and_then(|bytes| {
                self.outbound.try_send(bytes).map_err(|e| match e {
                    TrySendError::Full(_) => SendError::Full,
                    TrySendError::Closed(_) => SendError::Closed,
                })
            });
        match &result {
            Ok(()) => {
                self.stats.sent += 1;
                log::trace!("Sent {} for page {}", op.kind(), op.page());
            }
            Err(e) => {
                self.stats.send_failures += 1;
                log::warn!("Failed to send {} for page {}: {e}", op.kind(), op.page());
            }
        }
        result
    }

    /// Decode a payload from `from`. Invalid payloads yield `None`.
    pub fn receive(&mut self, from: &str, raw: &[u8]) -> Option<Operation> {
        match decode_operation(raw) {
            Ok(op) => {
                self.stats.received += 1;
                log::debug!("Received {} for page {} from {from}", op.kind(), op.page());
                Some(op)
            }
            Err(e) => {
                self.stats.dropped += 1;
                log::warn!("Dropped malformed payload from {from} ({} bytes): {e}", raw.len());
                None
            }
        }
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_core::{CanvasState, Color, Point};

    fn red_line() -> Operation {
        Operation::draw(
            1,
            [Point::new(10.0, 10.0), Point::new(20.0, 20.0)],
            Color::RED,
            3.0,
        )
    }

    #[test]
    fn test_send_then_receive_is_content_equal() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut a = SyncChannel::new(tx);
        let (unused_tx, _unused_rx) = mpsc::channel(1);
        let mut b = SyncChannel::new(unused_tx);

        let op = red_line();
        a.send(&op).unwrap();
        let raw = rx.try_recv().unwrap();

        let mut canvas = CanvasState::new();
        canvas.apply(b.receive("notary", &raw).unwrap());
        assert_eq!(canvas.page(1), &[op]);
        assert_eq!(a.stats().sent, 1);
        assert_eq!(b.stats().received, 1);
    }

    #[test]
    fn test_malformed_dropped_and_counted() {
        let (tx, _rx) = mpsc::channel(1);
        let mut channel = SyncChannel::new(tx);
        assert!(channel.receive("peer", br#"{"type":"unknown"}"#).is_none());
        assert!(channel.receive("peer", b"{{{").is_none());
        assert_eq!(
            channel.stats(),
            ChannelStats {
                dropped: 2,
                ..ChannelStats::default()
            }
        );
    }

    #[test]
    fn test_oversized_text_dropped() {
        let (tx, _rx) = mpsc::channel(1);
        let mut channel = SyncChannel::new(tx);
        let raw = br##"{"type":"text","page":1,"x":5,"y":5,"value":"W","fontSize":200000,"color":"#000000"}"##;
        assert!(channel.receive("peer", raw).is_none());
        assert_eq!(channel.stats().dropped, 1);
        assert_eq!(channel.stats().received, 0);
    }

    #[test]
    fn test_full_buffer_is_send_failure() {
        let (tx, _rx) = mpsc::channel(1);
        let mut channel = SyncChannel::new(tx);
        channel.send(&red_line()).unwrap();
        assert!(matches!(channel.send(&red_line()), Err(SendError::Full)));
        assert_eq!(channel.stats().sent, 1);
        assert_eq!(channel.stats().send_failures, 1);
    }

    #[test]
    fn test_closed_channel_is_send_failure() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut channel = SyncChannel::new(tx);
        assert!(channel.is_closed());
        assert!(matches!(channel.send(&Operation::clear(1)), Err(SendError::Closed)));
    }
}
