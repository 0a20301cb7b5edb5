//! Provisioning link driver: link open/close and the retried, acknowledged
//! transaction exchange that carries handshake PDUs. Each side numbers its
//! transactions from its own half of the space; a transaction is resent
//! whole until the peer acknowledges it or the retry budget runs out.
use crate::bearer::{Bearer, PduType};
use crate::provisioning::bearer_control::{self, CloseReason, LinkAck, LinkClose, LinkOpen};
use crate::provisioning::generic::{self, Reassembler, SegmentGenerator};
use crate::provisioning::pb_adv::{self, LinkID, TransactionNumber};
use crate::uuid::UUID;
use core::time::Duration;
use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;

pub const LINK_OPEN_ATTEMPTS: usize = 5;
pub const TRANSACTION_ATTEMPTS: usize = 3;
pub const LINK_OPEN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
pub const TRANSACTION_ACK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum LinkError {
    #[error("no link ack within the retry budget")]
    OpenTimeout,
    #[error("no transaction ack within the retry budget")]
    TransactionTimeout,
    #[error("no transaction from the peer within the deadline")]
    RecvTimeout,
    #[error("peer closed the link ({0})")]
    UnexpectedDeviceClose(CloseReason),
    #[error("bearer closed")]
    BearerClosed,
    #[error("link already closed")]
    Closed,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Role {
    Provisioner,
    Device,
}
impl Role {
    fn first_transaction(self) -> TransactionNumber {
        match self {
            Role::Provisioner => TransactionNumber::new_provisioner(),
            Role::Device => TransactionNumber::new_device(),
        }
    }
    fn is_peer_transaction(self, number: TransactionNumber) -> bool {
        match self {
            Role::Provisioner => number.is_device(),
            Role::Device => number.is_provisioner(),
        }
    }
}

/// Inter-PDU gap within one transaction, to dodge radio collisions.
fn pdu_gap() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(20..=50))
}

pub struct Link {
    bearer: Bearer,
    link_id: LinkID,
    role: Role,
    device_uuid: UUID,
    local_transaction: TransactionNumber,
    last_peer_transaction: Option<TransactionNumber>,
    is_open: bool,
    close_reason: Option<CloseReason>,
}
impl Link {
    /// Provisioner side: picks a random link id and repeats Link Open until
    /// the device acknowledges.
    pub async fn open(bearer: Bearer, device_uuid: UUID) -> Result<Link, LinkError> {
        let mut link = Link {
            bearer,
            link_id: LinkID::random(),
            role: Role::Provisioner,
            device_uuid,
            local_transaction: TransactionNumber::new_provisioner(),
            last_peer_transaction: None,
            is_open: false,
            close_reason: None,
        };
        let open_transaction = link.local_transaction;
        for attempt in 0..LINK_OPEN_ATTEMPTS {
            if attempt != 0 {
                log::debug!("link open attempt {} to {}", attempt + 1, device_uuid);
            }
            link.send_pdu(
                open_transaction,
                generic::PDU::BearerControl(bearer_control::PDU::LinkOpen(LinkOpen(device_uuid))),
            )
            .await?;
            let deadline = Instant::now() + LINK_OPEN_ATTEMPT_TIMEOUT;
            loop {
                let pdu = match link.recv_pdu(deadline).await {
                    Ok(pdu) => pdu,
                    Err(LinkError::RecvTimeout) => break,
                    Err(err) => return Err(err),
                };
                if let generic::PDU::BearerControl(bearer_control::PDU::LinkAck(LinkAck())) =
                    pdu.generic_pdu
                {
                    if pdu.transaction_number == open_transaction {
                        link.is_open = true;
                        return Ok(link);
                    }
                }
            }
        }
        Err(LinkError::OpenTimeout)
    }
    /// Device side: waits for a Link Open naming `device_uuid` and
    /// acknowledges it.
    pub async fn accept(
        mut bearer: Bearer,
        device_uuid: UUID,
        timeout: Duration,
    ) -> Result<Link, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, bearer.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(LinkError::BearerClosed),
                Err(_) => return Err(LinkError::OpenTimeout),
            };
            if frame.pdu_type != PduType::Provisioning {
                continue;
            }
            let pdu = match pb_adv::PDU::unpack_from(&frame.bytes) {
                Ok(pdu) => pdu,
                Err(_) => continue,
            };
            let open_transaction = pdu.transaction_number;
            if let generic::PDU::BearerControl(bearer_control::PDU::LinkOpen(LinkOpen(uuid))) =
                pdu.generic_pdu
            {
                if uuid != device_uuid {
                    continue;
                }
                let link = Link {
                    bearer,
                    link_id: pdu.link_id,
                    role: Role::Device,
                    device_uuid,
                    local_transaction: TransactionNumber::new_device(),
                    last_peer_transaction: None,
                    is_open: true,
                    close_reason: None,
                };
                link.send_pdu(
                    open_transaction,
                    generic::PDU::BearerControl(bearer_control::PDU::LinkAck(LinkAck())),
                )
                .await?;
                return Ok(link);
            }
        }
    }
    #[must_use]
    pub fn link_id(&self) -> LinkID {
        self.link_id
    }
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    async fn send_pdu(
        &self,
        transaction_number: TransactionNumber,
        generic_pdu: generic::PDU,
    ) -> Result<(), LinkError> {
        let pdu = pb_adv::PDU {
            link_id: self.link_id,
            transaction_number,
            generic_pdu,
        };
        self.bearer
            .send(PduType::Provisioning, pdu.to_bytes())
            .await
            .or(Err(LinkError::BearerClosed))
    }
    /// Next PB-ADV PDU on this link before `deadline`. Foreign link ids and
    /// unparseable frames are dropped.
    async fn recv_pdu(&mut self, deadline: Instant) -> Result<pb_adv::PDU, LinkError> {
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.bearer.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(LinkError::BearerClosed),
                Err(_) => return Err(LinkError::RecvTimeout),
            };
            if frame.pdu_type != PduType::Provisioning {
                continue;
            }
            match pb_adv::PDU::unpack_from(&frame.bytes) {
                Ok(pdu) if pdu.link_id == self.link_id => return Ok(pdu),
                Ok(pdu) => log::trace!("foreign link id {:?}", pdu.link_id),
                Err(err) => log::trace!("unparseable PB-ADV frame: {}", err),
            }
        }
    }
    fn peer_close(&mut self, reason: CloseReason) -> LinkError {
        self.is_open = false;
        self.close_reason = Some(reason);
        LinkError::UnexpectedDeviceClose(reason)
    }

    /// Sends one transaction payload, retrying the whole Start+Continuation
    /// volley until the peer's acknowledgment or the attempt budget is gone.
    pub async fn send_transaction(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if !self.is_open {
            return Err(LinkError::Closed);
        }
        let transaction = self.local_transaction;
        let pdus = SegmentGenerator::new(payload.to_vec()).pdus();
        for _attempt in 0..TRANSACTION_ATTEMPTS {
            for (i, pdu) in pdus.iter().enumerate() {
                if i != 0 {
                    tokio::time::sleep(pdu_gap()).await;
                }
                self.send_pdu(transaction, pdu.clone()).await?;
            }
            let deadline = Instant::now() + TRANSACTION_ACK_TIMEOUT;
            loop {
                let pdu = match self.recv_pdu(deadline).await {
                    Ok(pdu) => pdu,
                    Err(LinkError::RecvTimeout) => break,
                    Err(err) => return Err(err),
                };
                match pdu.generic_pdu {
                    generic::PDU::TransactionAcknowledgment(_)
                        if pdu.transaction_number == transaction =>
                    {
                        self.local_transaction.increment();
                        return Ok(());
                    }
                    generic::PDU::BearerControl(bearer_control::PDU::LinkClose(LinkClose(
                        reason,
                    ))) => {
                        return Err(self.peer_close(reason));
                    }
                    other => log::trace!("ignoring {:?} while awaiting transaction ack", other),
                }
            }
            log::debug!(
                "transaction {:?} unacknowledged, retrying",
                transaction
            );
        }
        Err(LinkError::TransactionTimeout)
    }

    /// Receives one transaction payload from the peer, acknowledging it.
    /// Retransmissions of the last completed transaction are re-acked and
    /// not surfaced again.
    pub async fn recv_transaction(&mut self, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        if !self.is_open {
            return Err(LinkError::Closed);
        }
        let deadline = Instant::now() + timeout;
        let mut assembly: Option<(TransactionNumber, Reassembler)> = None;
        loop {
            let pdu = self.recv_pdu(deadline).await?;
            let number = pdu.transaction_number;
            match pdu.generic_pdu {
                generic::PDU::BearerControl(control) => match control {
                    bearer_control::PDU::LinkClose(LinkClose(reason)) => {
                        return Err(self.peer_close(reason));
                    }
                    // A lost Link Ack makes the provisioner repeat Link Open.
                    bearer_control::PDU::LinkOpen(LinkOpen(uuid)) => {
                        if self.role == Role::Device && uuid == self.device_uuid {
                            self.send_pdu(
                                number,
                                generic::PDU::BearerControl(bearer_control::PDU::LinkAck(
                                    LinkAck(),
                                )),
                            )
                            .await?;
                        }
                    }
                    bearer_control::PDU::LinkAck(_) => {}
                },
                generic::PDU::TransactionAcknowledgment(_) => {}
                generic::PDU::TransactionStart(start, payload) => {
                    if !self.role.is_peer_transaction(number) {
                        continue;
                    }
                    if Some(number) == self.last_peer_transaction {
                        // Our ack got lost; the peer resent the transaction.
                        self.send_ack(number).await?;
                        continue;
                    }
                    match Reassembler::new(start, &payload) {
                        Ok(reassembler) => assembly = Some((number, reassembler)),
                        Err(err) => {
                            log::trace!("bad transaction start: {:?}", err);
                            assembly = None;
                        }
                    }
                    if let Some(payload) = self.try_finish(&mut assembly).await? {
                        return Ok(payload);
                    }
                }
                generic::PDU::TransactionContinuation(continuation, payload) => {
                    match &mut assembly {
                        Some((current, reassembler)) if *current == number => {
                            if let Err(err) =
                                reassembler.insert(continuation.seg_index, &payload)
                            {
                                log::trace!("dropping continuation: {:?}", err);
                                continue;
                            }
                        }
                        _ => continue,
                    }
                    if let Some(payload) = self.try_finish(&mut assembly).await? {
                        return Ok(payload);
                    }
                }
            }
        }
    }
    /// If the assembly is complete, length/FCS-check it, ack it and yield
    /// the payload; a failed check silently restarts the transaction wait.
    async fn try_finish(
        &mut self,
        assembly: &mut Option<(TransactionNumber, Reassembler)>,
    ) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some((_, reassembler)) = assembly {
            if !reassembler.is_done() {
                return Ok(None);
            }
        } else {
            return Ok(None);
        }
        let (number, reassembler) = assembly.take().expect("checked above");
        match reassembler.finish() {
            Ok(payload) => {
                self.send_ack(number).await?;
                self.last_peer_transaction = Some(number);
                Ok(Some(payload))
            }
            Err(err) => {
                log::debug!("transaction {:?} failed reassembly: {:?}", number, err);
                Ok(None)
            }
        }
    }
    async fn send_ack(&self, number: TransactionNumber) -> Result<(), LinkError> {
        self.send_pdu(
            number,
            generic::PDU::TransactionAcknowledgment(Default::default()),
        )
        .await
    }

    /// Closes the link. Every exit path of a provisioning attempt ends here,
    /// success or not.
    pub async fn close(&mut self, reason: CloseReason) {
        if !self.is_open {
            return;
        }
        self.is_open = false;
        self.close_reason = Some(reason);
        // Best effort; the peer also has its own timeout.
        let _ = self
            .send_pdu(
                self.local_transaction,
                generic::PDU::BearerControl(bearer_control::PDU::LinkClose(LinkClose(reason))),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bearer::loopback_pair;

    fn uuid() -> UUID {
        UUID::new_bytes([0xAB; 16])
    }

    #[tokio::test]
    async fn open_exchange_and_echo() {
        let (provisioner_bearer, device_bearer) = loopback_pair(64);
        let device = tokio::spawn(async move {
            let mut link = Link::accept(device_bearer, uuid(), Duration::from_secs(5))
                .await
                .expect("link open must arrive");
            let payload = link
                .recv_transaction(Duration::from_secs(5))
                .await
                .expect("transaction must arrive");
            link.send_transaction(&payload).await.expect("echo");
            payload
        });
        let mut link = Link::open(provisioner_bearer, uuid()).await.unwrap();
        assert!(link.is_open());
        // Three generic-provisioning segments worth of payload.
        let payload: Vec<u8> = (0..60_u8).collect();
        link.send_transaction(&payload).await.unwrap();
        let echoed = link.recv_transaction(Duration::from_secs(5)).await.unwrap();
        assert_eq!(echoed, payload);
        assert_eq!(device.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn peer_close_surfaces_reason() {
        let (provisioner_bearer, device_bearer) = loopback_pair(16);
        let device = tokio::spawn(async move {
            let mut link = Link::accept(device_bearer, uuid(), Duration::from_secs(5))
                .await
                .unwrap();
            link.close(CloseReason::Fail).await;
        });
        let mut link = Link::open(provisioner_bearer, uuid()).await.unwrap();
        device.await.unwrap();
        assert_eq!(
            link.recv_transaction(Duration::from_secs(5)).await,
            Err(LinkError::UnexpectedDeviceClose(CloseReason::Fail))
        );
        assert!(!link.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn open_gives_up_without_device() {
        let (provisioner_bearer, _device_bearer) = loopback_pair(16);
        assert_eq!(
            Link::open(provisioner_bearer, uuid()).await.err(),
            Some(LinkError::OpenTimeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unacked_transaction_times_out() {
        let (provisioner_bearer, device_bearer) = loopback_pair(16);
        let device = tokio::spawn(async move {
            // Accepts the link, then goes silent.
            Link::accept(device_bearer, uuid(), Duration::from_secs(5)).await
        });
        let mut link = Link::open(provisioner_bearer, uuid()).await.unwrap();
        let _device_link = device.await.unwrap().unwrap();
        assert_eq!(
            link.send_transaction(b"hello").await,
            Err(LinkError::TransactionTimeout)
        );
    }
}
