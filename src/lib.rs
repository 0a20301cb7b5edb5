//! Provisioning and message transport for Bluetooth-Mesh-style devices over
//! an unreliable, MTU-limited advertising bearer.
//!
//! Two independent protocol stacks share the crypto primitives:
//!
//! * messaging: access -> upper transport (AES-CCM) -> lower transport
//!   (segmentation + block ack) -> network (obfuscation + AES-CCM), in
//!   [`stack`], [`upper`], [`lower`], [`net`];
//! * provisioning: the ECDH handshake in [`provisioning::provisioner`],
//!   carried by the generic-provisioning transaction framing in
//!   [`provisioning::generic`] / [`provisioning::pb_adv`].
//!
//! The radio, persistence and UI live outside; see [`bearer`] and
//! [`device_state`] for the boundaries they plug into.
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod access;
pub mod address;
pub mod bearer;
pub mod bytes;
pub mod crypto;
pub mod device_state;
pub mod lower;
pub mod mesh;
pub mod net;
pub mod pack;
pub mod provisioning;
pub mod reassembler;
pub mod replay;
pub mod segmenter;
pub mod stack;
pub mod upper;
pub mod uuid;
