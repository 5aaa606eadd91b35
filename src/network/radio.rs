//! Boundary with the radio driver and the upper layer
//!
//! The driver transmits raw frames and delivers captured management frames;
//! decoded application payloads go up through a [`MessageSink`].

use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::{Error, MacAddr, Result, MAX_FRAME_SIZE};

/// Raw frame transmit primitive
///
/// Treated as synchronous and expected to return within a few hundred
/// microseconds. A failure is reported as [`Error::TransmitFailure`].
pub trait Radio: Send + Sync {
    fn transmit(&self, frame: &[u8]) -> Result<()>;
}

/// Signal metadata accompanying a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxMetadata {
    pub rssi: i8,
    pub channel: u8,
    /// Trailing frame check sequence bytes included in the capture
    pub fcs_len: u8,
}

/// A payload handed to the upper layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: MacAddr,
    /// Destination address of the frame; may be another node's
    pub to: MacAddr,
    pub interface_id: u32,
    pub payload: Bytes,
}

/// Receiver of decoded application payloads
pub trait MessageSink: Send + Sync {
    fn deliver(&self, delivery: Delivery);
}

impl MessageSink for mpsc::UnboundedSender<Delivery> {
    fn deliver(&self, delivery: Delivery) {
        // A closed receiver means nobody is listening any more.
        let _ = self.send(delivery);
    }
}

/// Sink that only logs what it receives
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn deliver(&self, delivery: Delivery) {
        info!(
            from = %delivery.from,
            to = %delivery.to,
            interface = delivery.interface_id,
            len = delivery.payload.len(),
            "Message received"
        );
    }
}

/// Radio that records every transmitted frame
///
/// Can be switched to fail with a driver error code.
#[derive(Debug, Default)]
pub struct RecordingRadio {
    sent: Mutex<Vec<Bytes>>,
    fail_code: Mutex<Option<i32>>,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent transmits fail with `code`, or succeed again with `None`
    pub fn fail_with(&self, code: Option<i32>) {
        *lock(&self.fail_code) = code;
    }

    /// Frames transmitted so far
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.sent).clone()
    }

    /// Removes and returns the frames transmitted so far
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *lock(&self.sent))
    }
}

impl Radio for RecordingRadio {
    fn transmit(&self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(Error::transmit(-1));
        }
        if let Some(code) = *lock(&self.fail_code) {
            return Err(Error::transmit(code));
        }
        lock(&self.sent).push(Bytes::copy_from_slice(frame));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_radio() {
        let radio = RecordingRadio::new();
        radio.transmit(&[1, 2, 3]).unwrap();
        assert_eq!(radio.sent(), vec![Bytes::from_static(&[1, 2, 3])]);

        radio.fail_with(Some(12));
        assert!(matches!(
            radio.transmit(&[4]),
            Err(Error::TransmitFailure { code: 12 })
        ));

        radio.fail_with(None);
        radio.transmit(&[5]).unwrap();
        assert_eq!(radio.take().len(), 2);
        assert!(radio.sent().is_empty());
    }

    #[test]
    fn test_recording_radio_rejects_oversized() {
        let radio = RecordingRadio::new();
        assert!(radio.transmit(&[0u8; MAX_FRAME_SIZE + 1]).is_err());
        assert!(radio.transmit(&[0u8; MAX_FRAME_SIZE]).is_ok());
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let delivery = Delivery {
            from: MacAddr([2, 0, 0, 0, 0, 1]),
            to: MacAddr::BROADCAST,
            interface_id: 3,
            payload: Bytes::from_static(b"hi"),
        };
        tx.deliver(delivery.clone());
        assert_eq!(rx.recv().await, Some(delivery.clone()));

        drop(rx);
        // Delivering to a closed channel is not an error.
        tx.deliver(delivery);
    }
}
