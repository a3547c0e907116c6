use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::Result;

/// One mutable, owned domain configuration document.
///
/// The inactive and active snapshots of a domain are always two separate
/// `Snapshot` values parsed from their own XML, never views over one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    root: Element,
}

impl Snapshot {
    /// Parse domain XML into a fresh document.
    pub fn parse(xml: &str) -> Result<Self> {
        let root = Element::parse(xml.as_bytes())?;
        Ok(Self { root })
    }

    /// An empty guest used when building standalone XML fragments.
    pub fn new_guest() -> Self {
        let mut root = Element::new("domain");
        root.attributes.insert("type".to_owned(), "kvm".to_owned());
        root.children
            .push(XMLNode::Element(Element::new("devices")));
        Self { root }
    }

    pub fn to_xml(&self) -> Result<String> {
        element_to_xml(&self.root)
    }

    pub fn name(&self) -> Option<String> {
        self.root
            .get_child("name")
            .and_then(|n| n.get_text())
            .map(|t| t.trim().to_string())
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Device elements with the given tag, in document order.
    pub fn devices(&self, tag: &str) -> Vec<&Element> {
        self.root
            .get_child("devices")
            .map(|d| child_elements(d, tag).collect())
            .unwrap_or_default()
    }

    /// The `pos`th (0-based) device with the given tag.
    pub fn device_mut(&mut self, tag: &str, pos: usize) -> Option<&mut Element> {
        let devices = self.root.get_mut_child("devices")?;
        nth_child_mut(devices, tag, pos)
    }

    /// Append a device, keeping devices of the same tag grouped together.
    pub fn add_device(&mut self, device: Element) {
        let devices = ensure_child(&mut self.root, "devices");
        let last_same = devices
            .children
            .iter()
            .rposition(|n| matches!(n, XMLNode::Element(e) if e.name == device.name));
        match last_same {
            Some(idx) => devices.children.insert(idx + 1, XMLNode::Element(device)),
            None => devices.children.push(XMLNode::Element(device)),
        }
    }

    /// Remove the `pos`th (0-based) device with the given tag.
    pub fn remove_device(&mut self, tag: &str, pos: usize) -> Option<Element> {
        let devices = self.root.get_mut_child("devices")?;
        remove_nth_child(devices, tag, pos)
    }
}

/// Serialize one element the same way a whole snapshot is serialized.
pub fn element_to_xml(element: &Element) -> Result<String> {
    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .write_document_declaration(false);
    element.write_with_config(&mut buf, config)?;
    let mut xml = String::from_utf8_lossy(&buf).into_owned();
    if !xml.ends_with('\n') {
        xml.push('\n');
    }
    Ok(xml)
}

pub(crate) fn child_elements<'a, 't>(
    parent: &'a Element,
    tag: &'t str,
) -> impl Iterator<Item = &'a Element> + use<'a, 't> {
    parent.children.iter().filter_map(move |n| match n {
        XMLNode::Element(e) if e.name == tag => Some(e),
        _ => None,
    })
}

pub(crate) fn nth_child_mut<'a>(
    parent: &'a mut Element,
    tag: &str,
    pos: usize,
) -> Option<&'a mut Element> {
    parent
        .children
        .iter_mut()
        .filter_map(|n| match n {
            XMLNode::Element(e) if e.name == tag => Some(e),
            _ => None,
        })
        .nth(pos)
}

pub(crate) fn remove_nth_child(parent: &mut Element, tag: &str, pos: usize) -> Option<Element> {
    let idx = parent
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n, XMLNode::Element(e) if e.name == tag))
        .map(|(i, _)| i)
        .nth(pos)?;
    match parent.children.remove(idx) {
        XMLNode::Element(e) => Some(e),
        _ => None,
    }
}

/// Return the named child, creating it at the end when missing.
pub(crate) fn ensure_child<'a>(parent: &'a mut Element, tag: &str) -> &'a mut Element {
    if parent.get_child(tag).is_none() {
        parent.children.push(XMLNode::Element(Element::new(tag)));
    }
    // Just inserted if it was missing.
    parent
        .get_mut_child(tag)
        .unwrap_or_else(|| unreachable!("child {tag} exists"))
}

/// Replace all text content of an element.
pub(crate) fn set_text(element: &mut Element, text: &str) {
    element.children.retain(|n| !matches!(n, XMLNode::Text(_)));
    element.children.insert(0, XMLNode::Text(text.to_owned()));
}

pub(crate) fn text_of(element: &Element) -> Option<String> {
    element.get_text().map(|t| t.trim().to_string())
}
