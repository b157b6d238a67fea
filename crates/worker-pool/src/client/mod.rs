//! Control plane API client.

pub mod control_plane;

pub use control_plane::{ControlPlaneClient, JobOutcome};
