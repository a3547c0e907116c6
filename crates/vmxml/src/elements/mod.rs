//! Registry of configurable element types.
//!
//! Each category (disk, network, memory, ...) implements [`ElementKind`]; the
//! change engine and the CLI only ever talk to the trait.

mod devices;
mod guest;
mod xpath;

use std::fmt;
use std::path::{Path, PathBuf};

use xmltree::{Element, XMLNode};

use crate::error::{Result, VmXmlError};
use crate::options::{self, ParsedOptions, SubOption, Target};
use crate::osinfo::OsVariant;
use crate::snapshot::{Snapshot, ensure_child, nth_child_mut, remove_nth_child};
use crate::storage::StorageRequest;

pub use devices::{
    Controller, Disk, Graphics, Hostdev, Input, Network, Rng, Sound, Video, Watchdog,
};
pub use guest::{Boot, Clock, Cpu, Features, Memory, Metadata, Vcpus};
pub use xpath::XmlPath;

/// Where instances of an element kind live in a domain document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Zero or more children of `<devices>`.
    Device,
    /// A single child of `<domain>`, such as `<os>` or `<cpu>`.
    Child,
    /// Values stored directly on `<domain>`.
    Root,
}

/// Inputs to default computation for freshly built elements.
#[derive(Debug, Clone, Copy)]
pub struct DefaultsContext<'a> {
    pub os: Option<&'static OsVariant>,
    /// Directory new disk images are placed in when no path is given.
    pub storage_dir: &'a Path,
}

impl DefaultsContext<'_> {
    pub(crate) fn virtio(&self) -> bool {
        self.os.is_none_or(|os| os.supports_virtio)
    }
}

pub trait ElementKind: fmt::Debug + Send + Sync {
    /// Command line flag name, without dashes.
    fn cli_name(&self) -> &'static str;

    /// XML tag of one instance.
    fn xml_tag(&self) -> &'static str;

    fn placement(&self) -> Placement;

    fn options(&self) -> &'static [SubOption];

    /// Key assigned to tokens that carry no `key=`.
    fn positional(&self) -> Option<&'static str> {
        None
    }

    /// Whether a guest can hold several instances (add/remove allowed).
    fn is_list(&self) -> bool {
        self.placement() == Placement::Device
    }

    /// Whether changes can be sent to a running guest as device updates.
    fn is_device(&self) -> bool {
        self.placement() == Placement::Device
    }

    /// Whether a standalone instance can be built without a domain.
    fn is_buildable(&self) -> bool {
        self.placement() != Placement::Root
    }

    /// Whether the kind is only meaningful with `--edit`.
    fn edit_only(&self) -> bool {
        false
    }

    /// Whether instances need storage preparation before use.
    fn needs_setup(&self) -> bool {
        false
    }

    fn apply_custom(&self, _element: &mut Element, name: &str, value: &str) -> Result<()> {
        Err(VmXmlError::InvalidOptionValue {
            kind: self.cli_name().to_string(),
            option: name.to_string(),
            value: value.to_string(),
            reason: "not supported".to_string(),
        })
    }

    fn read_custom(&self, _element: &Element, _name: &str) -> Option<String> {
        None
    }

    /// Normalize a user supplied value before comparing it during lookup.
    fn canonical_value(&self, _name: &str, value: &str) -> String {
        value.to_string()
    }

    /// Fill in whatever the user left out on a freshly built element.
    fn set_defaults(
        &self,
        _element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        Ok(())
    }

    /// Storage that must exist before this element is usable.
    fn storage_request(
        &self,
        _element: &Element,
        _parsed: &ParsedOptions,
    ) -> Result<Option<StorageRequest>> {
        Ok(None)
    }

    fn parse(&self, input: &str) -> Result<ParsedOptions> {
        options::parse(
            self.cli_name(),
            self.options(),
            self.positional(),
            self.placement() != Placement::Root,
            input,
        )
    }

    /// Apply one option string onto an element in place.
    fn apply_option_string(&self, element: &mut Element, input: &str) -> Result<ParsedOptions> {
        let parsed = self.parse(input)?;
        if parsed.clearxml {
            element.attributes.clear();
            element.children.clear();
        }
        for (opt, value) in parsed.ordered(self.options()) {
            match opt.target {
                Target::Custom => self.apply_custom(element, opt.name, value)?,
                _ => options::write_target(self.cli_name(), element, opt, value)?,
            }
        }
        Ok(parsed)
    }

    /// Whether `element` currently carries every value named in `input`.
    fn matches_option_string(&self, element: &Element, input: &str) -> Result<bool> {
        let parsed = self.parse(input)?;
        let all = parsed.ordered(self.options()).all(|(opt, value)| {
            let current = match opt.target {
                Target::Custom => self.read_custom(element, opt.name),
                _ => options::read_target(element, opt.target),
            };
            current
                .map(|c| self.canonical_value(opt.name, &c))
                .is_some_and(|c| c == self.canonical_value(opt.name, value))
        });
        Ok(all)
    }

    /// A fresh, empty instance.
    fn build(&self) -> Element {
        Element::new(self.xml_tag())
    }

    /// Existing instances; a single instance is a one element list.
    fn instances<'a>(&self, guest: &'a Snapshot) -> Vec<&'a Element> {
        match self.placement() {
            Placement::Device => guest.devices(self.xml_tag()),
            Placement::Child => guest.root().get_child(self.xml_tag()).into_iter().collect(),
            Placement::Root => vec![guest.root()],
        }
    }

    fn instance_mut<'a>(&self, guest: &'a mut Snapshot, pos: usize) -> Option<&'a mut Element> {
        match self.placement() {
            Placement::Device => guest.device_mut(self.xml_tag(), pos),
            Placement::Child => nth_child_mut(guest.root_mut(), self.xml_tag(), pos),
            Placement::Root if pos == 0 => Some(guest.root_mut()),
            Placement::Root => None,
        }
    }

    /// Make sure a single-instance kind exists so it can be edited.
    fn ensure_instance(&self, guest: &mut Snapshot) {
        if self.placement() == Placement::Child {
            ensure_child(guest.root_mut(), self.xml_tag());
        }
    }

    fn append(&self, guest: &mut Snapshot, element: Element) {
        match self.placement() {
            Placement::Device => guest.add_device(element),
            Placement::Child => {
                let root = guest.root_mut();
                root.children
                    .retain(|n| !matches!(n, XMLNode::Element(e) if e.name == element.name));
                root.children.push(XMLNode::Element(element));
            }
            Placement::Root => {}
        }
    }

    fn remove(&self, guest: &mut Snapshot, pos: usize) -> Option<Element> {
        match self.placement() {
            Placement::Device => guest.remove_device(self.xml_tag(), pos),
            Placement::Child => remove_nth_child(guest.root_mut(), self.xml_tag(), pos),
            Placement::Root => None,
        }
    }
}

static REGISTRY: &[&dyn ElementKind] = &[
    &Disk,
    &Network,
    &Graphics,
    &Video,
    &Sound,
    &Controller,
    &Input,
    &Hostdev,
    &Rng,
    &Watchdog,
    &Boot,
    &Cpu,
    &Features,
    &Clock,
    &Memory,
    &Vcpus,
    &Metadata,
    &XmlPath,
];

/// Every registered element kind, in command line order.
pub fn registry() -> &'static [&'static dyn ElementKind] {
    REGISTRY
}

pub fn lookup(cli_name: &str) -> Option<&'static dyn ElementKind> {
    REGISTRY.iter().copied().find(|k| k.cli_name() == cli_name)
}

/// Whether an option value asks for the sub-option listing instead.
pub fn is_introspection(value: &str) -> bool {
    matches!(value, "?" | "help")
}

/// Human readable listing of a kind's sub-options.
pub fn describe(kind: &dyn ElementKind) -> String {
    let mut names: Vec<String> = kind
        .options()
        .iter()
        .flat_map(|o| std::iter::once(o.name).chain(o.aliases.iter().copied()))
        .map(str::to_string)
        .collect();
    if kind.placement() != Placement::Root {
        names.push(options::CLEARXML.to_string());
    }
    names.sort();
    names.dedup();

    let mut out = format!("--{} options:\n", kind.cli_name());
    for name in names {
        out.push_str("  ");
        out.push_str(&name);
        out.push('\n');
    }
    out
}

/// Find an unused image path `<dir>/<name>[-N].qcow2`.
pub(crate) fn unique_image_path(dir: &Path, name: &str, taken: &[String]) -> PathBuf {
    (0..)
        .map(|n| match n {
            0 => dir.join(format!("{name}.qcow2")),
            n => dir.join(format!("{name}-{n}.qcow2")),
        })
        .find(|p| !p.exists() && !taken.iter().any(|t| Path::new(t) == p))
        .unwrap_or_else(|| dir.join(format!("{name}.qcow2")))
}
