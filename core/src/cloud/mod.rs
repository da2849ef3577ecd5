//! Contracts of the remote collaborators the orchestration layer drives.
//!
//! Only the fields the orchestration logic reads are modelled; concrete HTTP
//! clients live in the plugins crate.

mod traits;
mod types;

pub use traits::{ControlPlane, PrecacheApi, RegistryCatalog, ShellExec, TokenSource};
pub use types::{
    ControlPlaneResponse, ImageVersion, IssuedToken, Page, PrecacheStatus, PrecacheTicket,
    ProbeSpec, ProbeToolSpec, RegistryInfo, Repository, ShellExecRequest, ShellExecResponse,
    ToolStatus, DEFAULT_SHELL_PORT,
};
