//! In-process duplex transport.
//!
//! A [`Port`] is one end of a pair of unbounded channels carrying envelope
//! text. Delivery is ordered per direction; the two directions are
//! independent. Only text crosses, so nothing is shared between the ends.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use playground_common::BridgeError;

/// One end of a duplex message channel.
#[derive(Debug)]
pub struct Port {
    tx: UnboundedSender<String>,
    rx: UnboundedReceiver<String>,
}

/// Create two connected ports.
pub fn channel() -> (Port, Port) {
    let (a_tx, b_rx) = unbounded_channel();
    let (b_tx, a_rx) = unbounded_channel();

    (Port { tx: a_tx, rx: a_rx }, Port { tx: b_tx, rx: b_rx })
}

impl Port {
    /// Send one message to the other end.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Closed`] if the other end is gone.
    pub fn send(&self, message: String) -> Result<(), BridgeError> {
        self.tx.send(message).map_err(|_| BridgeError::Closed)
    }

    /// Receive the next message; `None` once the other end is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Separate the sending and receiving halves.
    pub fn into_parts(self) -> (UnboundedSender<String>, UnboundedReceiver<String>) {
        (self.tx, self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ordered_per_direction() {
        let (mut a, mut b) = channel();

        a.send("1".into()).unwrap();
        a.send("2".into()).unwrap();
        b.send("x".into()).unwrap();

        assert_eq!(b.recv().await.as_deref(), Some("1"));
        assert_eq!(b.recv().await.as_deref(), Some("2"));
        assert_eq!(a.recv().await.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_closed_when_other_end_dropped() {
        let (mut a, b) = channel();
        drop(b);

        assert_eq!(a.send("lost".into()), Err(BridgeError::Closed));
        assert_eq!(a.recv().await, None);
    }
}
