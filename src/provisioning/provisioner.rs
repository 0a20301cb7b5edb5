//! The provisioner-side handshake driver:
//! Link Open -> Invite -> Capabilities -> Start -> Public Key exchange ->
//! Confirmation -> Random -> Data -> Complete, with the link closed on every
//! exit path. The driver returns an [`Outcome`] instead of raising; callers
//! match on it.
use crate::bearer::Bearer;
use crate::crypto::ecdh;
use crate::crypto::key::DevKey;
use crate::provisioning::bearer_control::CloseReason;
use crate::provisioning::confirmation::{confirm, verify, Inputs, AUTH_VALUE_NO_OOB};
use crate::provisioning::data::{provisioning_salt, ProvisioningData, SessionSecurityMaterials};
use crate::provisioning::link::{Link, LinkError};
use crate::provisioning::protocol::{
    AttentionDuration, Capabilities, Confirmation, ErrorCode, Invite, ProtocolPDU, PublicKey,
    Random, Start, PDU,
};
use crate::uuid::UUID;
use core::fmt::{Display, Error, Formatter};
use core::time::Duration;

/// How long to wait for the device's answer in any one phase.
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Phase {
    Invite,
    Capabilities,
    Start,
    PublicKey,
    Confirmation,
    Random,
    Data,
    Complete,
}
impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let name = match self {
            Phase::Invite => "invite",
            Phase::Capabilities => "capabilities",
            Phase::Start => "start",
            Phase::PublicKey => "public key",
            Phase::Confirmation => "confirmation",
            Phase::Random => "random",
            Phase::Data => "data",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FailReason {
    /// The device answered with a PDU the phase doesn't allow.
    UnexpectedPdu,
    /// The device's confirmation didn't match its revealed random.
    ConfirmationMismatch,
    /// The device's public point isn't on the curve.
    InvalidPeerKey,
    /// The device reported a Provisioning Failed error code.
    DeviceReported(ErrorCode),
    /// The bearer went away under the handshake.
    Bearer,
}

/// What became of one provisioning attempt.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Outcome {
    Success(SuccessData),
    LinkOpenFailed,
    PhaseFailed { phase: Phase, reason: FailReason },
    Timeout(Phase),
    PeerClosed(CloseReason),
}
impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SuccessData {
    /// `k1(ecdh_secret, prov_salt, "prdk")`, shared with the new node.
    pub device_key: DevKey,
    pub element_address: crate::address::UnicastAddress,
    pub capabilities: Capabilities,
}

enum PhaseError {
    Timeout(Phase),
    PeerClosed(CloseReason),
    Failed { phase: Phase, reason: FailReason },
}
impl PhaseError {
    fn from_link(err: LinkError, phase: Phase) -> PhaseError {
        match err {
            LinkError::RecvTimeout | LinkError::TransactionTimeout | LinkError::OpenTimeout => {
                PhaseError::Timeout(phase)
            }
            LinkError::UnexpectedDeviceClose(reason) => PhaseError::PeerClosed(reason),
            LinkError::BearerClosed | LinkError::Closed => PhaseError::Failed {
                phase,
                reason: FailReason::Bearer,
            },
        }
    }
    fn close_reason(&self) -> CloseReason {
        match self {
            PhaseError::Timeout(_) => CloseReason::Timeout,
            // The peer already tore the link down; nothing left to close.
            PhaseError::PeerClosed(_) => CloseReason::Fail,
            PhaseError::Failed { .. } => CloseReason::Fail,
        }
    }
    fn into_outcome(self) -> Outcome {
        match self {
            PhaseError::Timeout(phase) => Outcome::Timeout(phase),
            PhaseError::PeerClosed(reason) => Outcome::PeerClosed(reason),
            PhaseError::Failed { phase, reason } => Outcome::PhaseFailed { phase, reason },
        }
    }
}

/// Handshake state accumulated across phases. The Invite/Capabilities/Start
/// byte images are kept verbatim because they feed the confirmation MAC
/// later, exactly as they crossed the bearer.
struct ProvisioningContext {
    invite_image: [u8; Invite::BYTE_LEN],
    capabilities_image: [u8; Capabilities::BYTE_LEN],
    start_image: [u8; Start::BYTE_LEN],
    public_key: PublicKey,
    device_public_key: PublicKey,
    random_provisioner: Random,
    random_device: Random,
    device_confirmation: Confirmation,
}
impl ProvisioningContext {
    fn new() -> ProvisioningContext {
        ProvisioningContext {
            invite_image: [0; Invite::BYTE_LEN],
            capabilities_image: [0; Capabilities::BYTE_LEN],
            start_image: [0; Start::BYTE_LEN],
            public_key: PublicKey::default(),
            device_public_key: PublicKey::default(),
            random_provisioner: Random::new_secure(),
            random_device: Random::default(),
            device_confirmation: Confirmation::default(),
        }
    }
    fn confirmation_inputs(&self) -> Inputs {
        Inputs {
            invite: self.invite_image,
            capabilities: self.capabilities_image,
            start: self.start_image,
            provisioner_public_key: self.public_key,
            device_public_key: self.device_public_key,
        }
    }
}

pub struct Provisioner {
    pub attention_duration: AttentionDuration,
}
impl Default for Provisioner {
    fn default() -> Provisioner {
        Provisioner {
            attention_duration: AttentionDuration(0),
        }
    }
}
impl Provisioner {
    /// Runs the whole handshake against the device with `device_uuid`,
    /// injecting `data`. The link is closed before this returns, whatever
    /// happened.
    pub async fn provision(
        &self,
        bearer: Bearer,
        device_uuid: UUID,
        data: ProvisioningData,
    ) -> Outcome {
        let mut link = match Link::open(bearer, device_uuid).await {
            Ok(link) => link,
            Err(err) => {
                log::warn!("link open to {} failed: {}", device_uuid, err);
                return Outcome::LinkOpenFailed;
            }
        };
        match self.run_phases(&mut link, data).await {
            Ok(success) => {
                link.close(CloseReason::Success).await;
                Outcome::Success(success)
            }
            Err(err) => {
                link.close(err.close_reason()).await;
                let outcome = err.into_outcome();
                log::warn!("provisioning of {} failed: {:?}", device_uuid, outcome);
                outcome
            }
        }
    }

    async fn run_phases(
        &self,
        link: &mut Link,
        data: ProvisioningData,
    ) -> Result<SuccessData, PhaseError> {
        let mut ctx = ProvisioningContext::new();

        // Invite
        let invite = Invite(self.attention_duration);
        invite
            .pack(&mut ctx.invite_image)
            .expect("image buffer sized to the PDU");
        send(link, Phase::Invite, invite.to_pdu_bytes()).await?;

        // Capabilities
        let (pdu, raw) = recv(link, Phase::Capabilities).await?;
        let capabilities = match pdu {
            PDU::Capabilities(capabilities) => capabilities,
            _ => return Err(unexpected(Phase::Capabilities)),
        };
        ctx.capabilities_image.copy_from_slice(&raw[1..]);

        // Start: no OOB authentication, key exchanged in-band.
        let start = Start::no_oob();
        start
            .pack(&mut ctx.start_image)
            .expect("image buffer sized to the PDU");
        send(link, Phase::Start, start.to_pdu_bytes()).await?;

        // Public key exchange
        let private_key = ecdh::PrivateKey::generate();
        ctx.public_key = private_key.public_key();
        send(link, Phase::PublicKey, ctx.public_key.to_pdu_bytes()).await?;
        let (pdu, _) = recv(link, Phase::PublicKey).await?;
        ctx.device_public_key = match pdu {
            PDU::PublicKey(device_public_key) => device_public_key,
            _ => return Err(unexpected(Phase::PublicKey)),
        };
        let secret = private_key
            .agree(&ctx.device_public_key)
            .map_err(|_| PhaseError::Failed {
                phase: Phase::PublicKey,
                reason: FailReason::InvalidPeerKey,
            })?;

        // Confirmation
        let inputs = ctx.confirmation_inputs();
        let confirmation_salt = inputs.salt();
        let confirmation_key = inputs.confirmation_key(&secret);
        let own_confirmation = confirm(
            &confirmation_key,
            &ctx.random_provisioner,
            &AUTH_VALUE_NO_OOB,
        );
        send(link, Phase::Confirmation, own_confirmation.to_pdu_bytes()).await?;
        let (pdu, _) = recv(link, Phase::Confirmation).await?;
        ctx.device_confirmation = match pdu {
            PDU::Confirm(confirmation) => confirmation,
            _ => return Err(unexpected(Phase::Confirmation)),
        };

        // Random reveal, then check the stored confirmation against it.
        send(link, Phase::Random, ctx.random_provisioner.to_pdu_bytes()).await?;
        let (pdu, _) = recv(link, Phase::Random).await?;
        ctx.random_device = match pdu {
            PDU::Random(random) => random,
            _ => return Err(unexpected(Phase::Random)),
        };
        if !verify(
            &confirmation_key,
            &ctx.random_device,
            &AUTH_VALUE_NO_OOB,
            &ctx.device_confirmation,
        ) {
            return Err(PhaseError::Failed {
                phase: Phase::Random,
                reason: FailReason::ConfirmationMismatch,
            });
        }

        // Data
        let salt = provisioning_salt(
            &confirmation_salt,
            &ctx.random_provisioner,
            &ctx.random_device,
        );
        let session = SessionSecurityMaterials::from_secret_salt(&secret, &salt);
        let device_key = DevKey::from_secret_salt(&secret, &salt);
        send(link, Phase::Data, data.encrypt(&session).to_pdu_bytes()).await?;

        // Complete
        let (pdu, _) = recv(link, Phase::Complete).await?;
        match pdu {
            PDU::Complete(_) => Ok(SuccessData {
                device_key,
                element_address: data.element_address,
                capabilities,
            }),
            _ => Err(unexpected(Phase::Complete)),
        }
    }
}

fn unexpected(phase: Phase) -> PhaseError {
    PhaseError::Failed {
        phase,
        reason: FailReason::UnexpectedPdu,
    }
}

async fn send(link: &mut Link, phase: Phase, pdu_bytes: Vec<u8>) -> Result<(), PhaseError> {
    link.send_transaction(&pdu_bytes)
        .await
        .map_err(|err| PhaseError::from_link(err, phase))
}

/// Receives the device's next handshake PDU; a Provisioning Failed PDU
/// aborts the phase with the device's error code.
async fn recv(link: &mut Link, phase: Phase) -> Result<(PDU, Vec<u8>), PhaseError> {
    let raw = link
        .recv_transaction(PHASE_TIMEOUT)
        .await
        .map_err(|err| PhaseError::from_link(err, phase))?;
    let pdu = PDU::unpack_raw(&raw).map_err(|_| unexpected(phase))?;
    if let PDU::Failed(failed) = pdu {
        return Err(PhaseError::Failed {
            phase,
            reason: FailReason::DeviceReported(failed.0),
        });
    }
    Ok((pdu, raw))
}
