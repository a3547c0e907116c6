//! In-memory application of an action to a domain snapshot.
//!
//! Elements are addressed by their 0-based position among same-type
//! siblings; the affected elements are handed back as owned copies so the
//! caller can send them to a hypervisor after the snapshot is serialized.

use std::path::Path;

use tracing::debug;
use xmltree::Element;

use crate::elements::{DefaultsContext, ElementKind, Placement};
use crate::error::{Result, VmXmlError};
use crate::osinfo::OsVariant;
use crate::resolve::is_integer;
use crate::select::Action;
use crate::snapshot::{Snapshot, element_to_xml};
use crate::storage::{StorageBuilder, StorageRequest};

/// Everything the engine needs to know about the requested change.
#[derive(Debug, Clone, Copy)]
pub struct ChangeContext<'a> {
    pub kind: &'static dyn ElementKind,
    /// Every value given for the element flag, in command line order.
    pub values: &'a [String],
    pub os: Option<&'static OsVariant>,
    pub storage_dir: &'a Path,
}

impl ChangeContext<'_> {
    fn defaults(&self) -> DefaultsContext<'_> {
        DefaultsContext {
            os: self.os,
            storage_dir: self.storage_dir,
        }
    }

    fn flag(&self) -> String {
        format!("--{}", self.kind.cli_name())
    }

    fn reject_os_variant(&self, action: &str) -> Result<()> {
        match self.os {
            Some(_) => Err(VmXmlError::unsupported(format!(
                "--os-variant/--osinfo is not supported with --{action}"
            ))),
            None => Ok(()),
        }
    }
}

/// One element produced or affected by an action.
#[derive(Debug, Clone)]
pub struct PendingElement {
    pub kind: &'static dyn ElementKind,
    pub element: Element,
    /// Backing storage to create before the element is used.
    pub storage: Option<StorageRequest>,
    set_up: bool,
}

impl PendingElement {
    fn new(kind: &'static dyn ElementKind, element: Element, storage: Option<StorageRequest>) -> Self {
        Self {
            kind,
            element,
            storage,
            set_up: false,
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        element_to_xml(&self.element)
    }

    pub fn is_set_up(&self) -> bool {
        self.set_up
    }

    /// Prepare backing storage. Runs at most once per element.
    pub async fn setup<B: StorageBuilder>(&mut self, builder: &B) -> Result<()> {
        if self.set_up {
            return Ok(());
        }
        if let Some(request) = self.storage.as_ref().filter(|_| self.kind.needs_setup()) {
            builder.create(request).await?;
        }
        self.set_up = true;
        Ok(())
    }
}

/// Resolve a user selector to positions among the kind's instances.
///
/// `None` means the first instance. Integers are 1-based and negative
/// values count from the end; `all` selects everything and needs at least
/// one instance; anything else is an option string matched against each
/// instance.
pub fn find_objects_to_edit(
    guest: &Snapshot,
    action: &str,
    selector: Option<&str>,
    kind: &dyn ElementKind,
) -> Result<Vec<usize>> {
    let instances = kind.instances(guest);
    let selector = selector.unwrap_or("1");

    if is_integer(selector) {
        let digits = selector.trim_start_matches('-');
        if digits.bytes().all(|b| b == b'0') {
            return Err(VmXmlError::InvalidIndex {
                action: action.to_string(),
                value: selector.to_string(),
            });
        }
        if instances.is_empty() {
            return Err(VmXmlError::NoObjects {
                kind: kind.cli_name().to_string(),
            });
        }
        let len = instances.len();
        let magnitude = digits.parse::<usize>().unwrap_or(usize::MAX);
        if magnitude > len {
            return Err(VmXmlError::IndexOutOfRange {
                action: action.to_string(),
                number: selector.to_string(),
                max: len,
                kind: kind.cli_name().to_string(),
            });
        }
        let pos = if selector.starts_with('-') {
            len - magnitude
        } else {
            magnitude - 1
        };
        return Ok(vec![pos]);
    }

    if selector == "all" {
        if instances.is_empty() {
            return Err(VmXmlError::NoObjects {
                kind: kind.cli_name().to_string(),
            });
        }
        return Ok((0..instances.len()).collect());
    }

    for (pos, instance) in instances.iter().enumerate() {
        if kind.matches_option_string(instance, selector)? {
            return Ok(vec![pos]);
        }
    }
    Err(VmXmlError::NoMatch {
        action: action.to_string(),
        selector: selector.to_string(),
    })
}

fn check_edit_only(ctx: &ChangeContext<'_>, action: &Action) -> Result<()> {
    if ctx.kind.edit_only() && !action.is_edit() {
        return Err(VmXmlError::unsupported(format!(
            "{} can only be used with --edit",
            ctx.flag()
        )));
    }
    Ok(())
}

/// Apply every value onto the selected existing instances.
pub fn action_edit(
    guest: &mut Snapshot,
    ctx: &ChangeContext<'_>,
    selector: Option<&str>,
) -> Result<Vec<PendingElement>> {
    let kind = ctx.kind;
    ctx.reject_os_variant("edit")?;
    let positions = match kind.placement() {
        Placement::Root => {
            if let Some(sel) = selector.filter(|s| !matches!(*s, "1" | "all")) {
                return Err(VmXmlError::unsupported(format!(
                    "'--edit {sel}' doesn't make sense with {}, just use empty '--edit'",
                    ctx.flag()
                )));
            }
            vec![0]
        }
        Placement::Device | Placement::Child => {
            kind.ensure_instance(guest);
            find_objects_to_edit(guest, "edit", selector, kind)?
        }
    };

    let mut devs = Vec::with_capacity(positions.len());
    for pos in positions {
        let element = kind
            .instance_mut(guest, pos)
            .ok_or_else(|| VmXmlError::NoObjects {
                kind: kind.cli_name().to_string(),
            })?;
        for value in ctx.values {
            kind.apply_option_string(element, value)?;
        }
        debug!(kind = kind.cli_name(), pos, "edited element");
        devs.push(PendingElement::new(kind, element.clone(), None));
    }
    Ok(devs)
}

/// Build one new element per value and append it.
///
/// `reuse` carries elements already built against another snapshot of the
/// same domain, so live and persistent configs receive identical devices.
pub fn action_add_device(
    guest: &mut Snapshot,
    ctx: &ChangeContext<'_>,
    reuse: Option<&[PendingElement]>,
) -> Result<Vec<PendingElement>> {
    let kind = ctx.kind;
    if !kind.is_list() {
        return Err(VmXmlError::ConflictingOptions {
            first: "--add-device".to_string(),
            second: ctx.flag(),
        });
    }

    if let Some(devs) = reuse.filter(|d| !d.is_empty()) {
        for dev in devs {
            kind.append(guest, dev.element.clone());
        }
        return Ok(devs.to_vec());
    }

    let defaults = ctx.defaults();
    let mut devs = Vec::with_capacity(ctx.values.len());
    for value in ctx.values {
        let mut element = kind.build();
        let parsed = kind.apply_option_string(&mut element, value)?;
        kind.set_defaults(&mut element, guest, &defaults, &parsed)?;
        let storage = kind.storage_request(&element, &parsed)?;
        kind.append(guest, element.clone());
        debug!(kind = kind.cli_name(), "added element");
        devs.push(PendingElement::new(kind, element, storage));
    }
    Ok(devs)
}

/// Remove the instances matched by the last value given.
pub fn action_remove_device(
    guest: &mut Snapshot,
    ctx: &ChangeContext<'_>,
) -> Result<Vec<PendingElement>> {
    let kind = ctx.kind;
    if !kind.is_list() {
        return Err(VmXmlError::ConflictingOptions {
            first: "--remove-device".to_string(),
            second: ctx.flag(),
        });
    }
    ctx.reject_os_variant("remove-device")?;

    let selector = ctx.values.last().map(String::as_str);
    let mut positions = find_objects_to_edit(guest, "remove-device", selector, kind)?;
    positions.sort_unstable();
    positions.dedup();

    let mut removed = Vec::with_capacity(positions.len());
    for pos in positions.into_iter().rev() {
        if let Some(element) = kind.remove(guest, pos) {
            removed.push(PendingElement::new(kind, element, None));
        }
    }
    removed.reverse();
    Ok(removed)
}

/// Build standalone elements without touching any domain.
pub fn action_build_xml(ctx: &ChangeContext<'_>) -> Result<Vec<PendingElement>> {
    let kind = ctx.kind;
    check_edit_only(ctx, &Action::BuildXml)?;
    if !kind.is_buildable() {
        return Err(VmXmlError::unsupported(format!(
            "--build-xml not supported for {}",
            ctx.flag()
        )));
    }
    ctx.reject_os_variant("build-xml")?;

    let guest = Snapshot::new_guest();
    let defaults = ctx.defaults();
    let mut devs = Vec::with_capacity(ctx.values.len());
    for value in ctx.values {
        let mut element = kind.build();
        let parsed = kind.apply_option_string(&mut element, value)?;
        kind.set_defaults(&mut element, &guest, &defaults, &parsed)?;
        let storage = kind.storage_request(&element, &parsed)?;
        devs.push(PendingElement::new(kind, element, storage));
    }
    Ok(devs)
}

/// Dispatch a domain-modifying action against one snapshot.
pub fn apply_action(
    guest: &mut Snapshot,
    action: &Action,
    ctx: &ChangeContext<'_>,
    reuse: Option<&[PendingElement]>,
) -> Result<Vec<PendingElement>> {
    check_edit_only(ctx, action)?;
    match action {
        Action::Edit(selector) => action_edit(guest, ctx, selector.as_deref()),
        Action::AddDevice => action_add_device(guest, ctx, reuse),
        Action::RemoveDevice => action_remove_device(guest, ctx),
        Action::BuildXml => Err(VmXmlError::unsupported(
            "--build-xml does not modify an existing domain",
        )),
    }
}
