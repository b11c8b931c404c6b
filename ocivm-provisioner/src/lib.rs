//! The instance-provisioning workflow: image selection, network selection,
//! key injection, launch, poll-to-ready, IP discovery. The listing,
//! termination and inspection operations are built from the same pieces.

pub mod clock;
pub mod provision;
pub mod resolve;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use provision::Provisioner;
