//! CLI command implementations.

mod allocate;
mod config;
mod init;
mod provision;
mod release;
mod seed;
mod start;
mod status;

pub use allocate::{run_allocate, AllocateArgs};
pub use config::{run_config, ConfigArgs};
pub use init::{run_init, InitArgs};
pub use provision::{run_provision, ProvisionArgs};
pub use release::{run_release, ReleaseArgs};
pub use seed::{run_seed, SeedArgs};
pub use start::{run_start, StartArgs};
pub use status::{run_status, StatusArgs};
