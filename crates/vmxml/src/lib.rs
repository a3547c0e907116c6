//! Edit libvirt domain XML from structured command line options.
//!
//! A change is computed in memory against a [`Snapshot`] of the domain
//! configuration and then applied through a [`Connection`]: hotplugged into
//! the running guest, persisted as the new definition, used to start the
//! domain, or only previewed.

pub mod backends;
pub mod diff;
pub mod elements;
pub mod engine;
pub mod error;
pub mod options;
pub mod osinfo;
pub mod prompt;
pub mod resolve;
pub mod select;
pub mod snapshot;
pub mod storage;
pub mod traits;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use backends::{RouterConnection, TestConnection, VirshConnection};
pub use elements::{ElementKind, Placement};
pub use engine::{ChangeContext, PendingElement};
pub use error::{Result, VmXmlError};
pub use prompt::{AssumeYes, ConsolePrompt, Prompt};
pub use resolve::{ResolvedDomain, resolve_domain};
pub use select::{Action, ActionFlags, Selection};
pub use snapshot::Snapshot;
pub use storage::{QemuImg, StorageBuilder, StorageRequest};
pub use traits::Connection;
pub use types::{DeviceAction, DomainHandle, DomainState};
pub use workflow::{ApplyFlags, Input, Outcome, Request, Warning};
