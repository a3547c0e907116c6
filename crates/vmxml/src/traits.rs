use std::future::Future;

use crate::error::Result;
use crate::types::{DomainHandle, DomainState};

/// A connection to a hypervisor management daemon.
///
/// Every call may fail with a connection-level error; callers turn those into
/// fatal errors that carry the original message.
pub trait Connection: Send + Sync {
    fn lookup_by_name(&self, name: &str) -> impl Future<Output = Result<DomainHandle>> + Send;

    fn lookup_by_id(&self, id: u32) -> impl Future<Output = Result<DomainHandle>> + Send;

    fn lookup_by_uuid(&self, uuid: &str) -> impl Future<Output = Result<DomainHandle>> + Send;

    fn state(&self, dom: &DomainHandle) -> impl Future<Output = Result<DomainState>> + Send;

    /// Domain XML; the persistent definition when `inactive` is set.
    fn xml_desc(
        &self,
        dom: &DomainHandle,
        inactive: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Persist a definition, creating or replacing the domain.
    fn define_xml(&self, xml: &str) -> impl Future<Output = Result<DomainHandle>> + Send;

    /// Start a transient domain from XML.
    fn create_xml(&self, xml: &str) -> impl Future<Output = Result<DomainHandle>> + Send;

    /// Start a defined domain.
    fn create(&self, dom: &DomainHandle) -> impl Future<Output = Result<()>> + Send;

    /// Hotplug a device into the running guest. The persistent definition is
    /// left alone.
    fn attach_device(&self, dom: &DomainHandle, xml: &str)
    -> impl Future<Output = Result<()>> + Send;

    /// Hot unplug a device from the running guest.
    fn detach_device(&self, dom: &DomainHandle, xml: &str)
    -> impl Future<Output = Result<()>> + Send;

    /// Change a device of the running guest in place.
    fn update_device(&self, dom: &DomainHandle, xml: &str)
    -> impl Future<Output = Result<()>> + Send;
}
