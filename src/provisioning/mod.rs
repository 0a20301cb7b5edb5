//! Everything needed to provision an unprovisioned device: the handshake
//! PDUs (`protocol`), the generic-provisioning transaction framing that
//! carries them (`generic`, `pb_adv`, `bearer_control`), the link driver
//! (`link`) and the provisioner-role state machine (`provisioner`). This
//! protocol stack is fully independent of the message transport layers; the
//! two never share a segment table or a link.
pub mod bearer_control;
pub mod confirmation;
pub mod data;
pub mod generic;
pub mod link;
pub mod pb_adv;
pub mod protocol;
pub mod provisioner;
