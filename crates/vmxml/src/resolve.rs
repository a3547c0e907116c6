use tracing::debug;

use crate::error::{Result, VmXmlError};
use crate::snapshot::Snapshot;
use crate::traits::Connection;
use crate::types::{DomainHandle, DomainState};

/// A domain together with its configuration snapshots.
#[derive(Debug, Clone)]
pub struct ResolvedDomain {
    pub handle: DomainHandle,
    pub state: DomainState,
    /// Persistent definition.
    pub inactive: Snapshot,
    /// Live configuration; present unless the domain is shut off.
    pub active: Option<Snapshot>,
}

pub(crate) fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

/// Find a domain by name, falling back to id or UUID.
///
/// When every attempt fails the error from the name lookup is reported.
pub async fn lookup_domain<C: Connection>(conn: &C, ident: &str) -> Result<DomainHandle> {
    let original = match conn.lookup_by_name(ident).await {
        Ok(handle) => return Ok(handle),
        Err(e) => e,
    };

    let retry = if is_integer(ident) {
        match ident.parse::<u32>() {
            Ok(id) => conn.lookup_by_id(id).await.ok(),
            Err(_) => None,
        }
    } else if is_uuid(ident) {
        conn.lookup_by_uuid(ident).await.ok()
    } else {
        None
    };

    retry.ok_or_else(|| VmXmlError::DomainNotFound {
        domain: ident.to_string(),
        detail: original.to_string(),
    })
}

/// Resolve `ident` and load its inactive and, if running, active XML.
pub async fn resolve_domain<C: Connection>(conn: &C, ident: &str) -> Result<ResolvedDomain> {
    let handle = lookup_domain(conn, ident).await?;
    let state = conn.state(&handle).await?;
    debug!(domain = %handle.name, %state, "resolved domain");

    let inactive = Snapshot::parse(&conn.xml_desc(&handle, true).await?)?;
    let active = if state.is_active() {
        Some(Snapshot::parse(&conn.xml_desc(&handle, false).await?)?)
    } else {
        None
    };

    Ok(ResolvedDomain {
        handle,
        state,
        inactive,
        active,
    })
}
