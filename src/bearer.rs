//! Transport I/O boundary. The stack never learns how bytes reach the radio;
//! it pushes and pulls framed PDUs through a pair of bounded channels whose
//! far ends belong to the radio driver (or to a loopback peer in tests).
use tokio::sync::mpsc;

/// Closed set of traffic classes multiplexed over one radio.
#[derive(Copy, Clone, Hash, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub enum PduType {
    /// Network-layer traffic between provisioned nodes.
    Network,
    /// Generic-provisioning (PB-ADV) traffic.
    Provisioning,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BearerPdu {
    pub pdu_type: PduType,
    pub bytes: Vec<u8>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BearerClosed;

/// One side of a bearer link: outgoing sink plus incoming stream. Single
/// producer, single consumer; the protocol stack owns exactly one of each.
pub struct Bearer {
    tx: mpsc::Sender<BearerPdu>,
    rx: mpsc::Receiver<BearerPdu>,
}
impl Bearer {
    #[must_use]
    pub fn new(tx: mpsc::Sender<BearerPdu>, rx: mpsc::Receiver<BearerPdu>) -> Bearer {
        Bearer { tx, rx }
    }
    pub async fn send(&self, pdu_type: PduType, bytes: Vec<u8>) -> Result<(), BearerClosed> {
        self.tx
            .send(BearerPdu { pdu_type, bytes })
            .await
            .or(Err(BearerClosed))
    }
    /// `None` once the far side hung up.
    pub async fn recv(&mut self) -> Option<BearerPdu> {
        self.rx.recv().await
    }
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<BearerPdu> {
        self.tx.clone()
    }
    pub fn split(self) -> (mpsc::Sender<BearerPdu>, mpsc::Receiver<BearerPdu>) {
        (self.tx, self.rx)
    }
}

/// Two directly connected bearers, for tests and local stacks.
#[must_use]
pub fn loopback_pair(capacity: usize) -> (Bearer, Bearer) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (Bearer::new(a_tx, a_rx), Bearer::new(b_tx, b_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_delivers_both_ways() {
        let (a, mut b) = loopback_pair(4);
        a.send(PduType::Network, vec![1, 2, 3]).await.unwrap();
        let got = b.recv().await.unwrap();
        assert_eq!(got.pdu_type, PduType::Network);
        assert_eq!(got.bytes, vec![1, 2, 3]);

        b.send(PduType::Provisioning, vec![9]).await.unwrap();
        let mut a = a;
        assert_eq!(a.recv().await.unwrap().bytes, vec![9]);
    }
}
