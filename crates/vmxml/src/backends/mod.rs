pub mod virsh;

pub use test::{Call, Operation, TEST_URI, TestConnection};
pub use virsh::VirshConnection;

use crate::error::Result;
use crate::traits::Connection;
use crate::types::{DomainHandle, DomainState};

/// Dispatches to the backend selected by the connection URI.
#[derive(Debug)]
pub enum RouterConnection {
    Virsh(VirshConnection),
    Test(TestConnection),
}

impl RouterConnection {
    /// `test:///default` selects the in-memory driver; everything else,
    /// including no URI at all, goes through `virsh`.
    pub fn from_uri(uri: Option<&str>) -> Self {
        match uri {
            Some(TEST_URI) => RouterConnection::Test(TestConnection::new()),
            other => RouterConnection::Virsh(VirshConnection::new(other.map(str::to_string))),
        }
    }
}

impl Connection for RouterConnection {
    async fn lookup_by_name(&self, name: &str) -> Result<DomainHandle> {
        match self {
            Self::Virsh(c) => c.lookup_by_name(name).await,
            Self::Test(c) => c.lookup_by_name(name).await,
        }
    }

    async fn lookup_by_id(&self, id: u32) -> Result<DomainHandle> {
        match self {
            Self::Virsh(c) => c.lookup_by_id(id).await,
            Self::Test(c) => c.lookup_by_id(id).await,
        }
    }

    async fn lookup_by_uuid(&self, uuid: &str) -> Result<DomainHandle> {
        match self {
            Self::Virsh(c) => c.lookup_by_uuid(uuid).await,
            Self::Test(c) => c.lookup_by_uuid(uuid).await,
        }
    }

    async fn state(&self, dom: &DomainHandle) -> Result<DomainState> {
        match self {
            Self::Virsh(c) => c.state(dom).await,
            Self::Test(c) => c.state(dom).await,
        }
    }

    async fn xml_desc(&self, dom: &DomainHandle, inactive: bool) -> Result<String> {
        match self {
            Self::Virsh(c) => c.xml_desc(dom, inactive).await,
            Self::Test(c) => c.xml_desc(dom, inactive).await,
        }
    }

    async fn define_xml(&self, xml: &str) -> Result<DomainHandle> {
        match self {
            Self::Virsh(c) => c.define_xml(xml).await,
            Self::Test(c) => c.define_xml(xml).await,
        }
    }

    async fn create_xml(&self, xml: &str) -> Result<DomainHandle> {
        match self {
            Self::Virsh(c) => c.create_xml(xml).await,
            Self::Test(c) => c.create_xml(xml).await,
        }
    }

    async fn create(&self, dom: &DomainHandle) -> Result<()> {
        match self {
            Self::Virsh(c) => c.create(dom).await,
            Self::Test(c) => c.create(dom).await,
        }
    }

    async fn attach_device(&self, dom: &DomainHandle, xml: &str) -> Result<()> {
        match self {
            Self::Virsh(c) => c.attach_device(dom, xml).await,
            Self::Test(c) => c.attach_device(dom, xml).await,
        }
    }

    async fn detach_device(&self, dom: &DomainHandle, xml: &str) -> Result<()> {
        match self {
            Self::Virsh(c) => c.detach_device(dom, xml).await,
            Self::Test(c) => c.detach_device(dom, xml).await,
        }
    }

    async fn update_device(&self, dom: &DomainHandle, xml: &str) -> Result<()> {
        match self {
            Self::Virsh(c) => c.update_device(dom, xml).await,
            Self::Test(c) => c.update_device(dom, xml).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_selects_backend() {
        assert!(matches!(
            RouterConnection::from_uri(Some("test:///default")),
            RouterConnection::Test(_)
        ));
        match RouterConnection::from_uri(Some("qemu:///system")) {
            RouterConnection::Virsh(c) => assert_eq!(c.uri(), Some("qemu:///system")),
            other => panic!("unexpected backend {other:?}"),
        }
        assert!(matches!(RouterConnection::from_uri(None), RouterConnection::Virsh(_)));
    }

    #[tokio::test]
    async fn test_backend_is_reachable_through_router() {
        let conn = RouterConnection::from_uri(Some(TEST_URI));
        let dom = conn.lookup_by_name("test").await.unwrap();
        assert!(conn.state(&dom).await.unwrap().is_active());
    }
}
