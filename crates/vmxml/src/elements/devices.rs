use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use xmltree::Element;

use super::{DefaultsContext, ElementKind, Placement, unique_image_path};
use crate::error::{Result, VmXmlError};
use crate::options::{ParsedOptions, SubOption, ensure_path, find_path, parse_bool, remove_path};
use crate::snapshot::Snapshot;
use crate::storage::StorageRequest;

fn attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element.attributes.get(name).map(String::as_str)
}

fn path_attr<'a>(element: &'a Element, path: &str, name: &str) -> Option<&'a str> {
    find_path(element, path).and_then(|e| attr(e, name))
}

fn default_attr(element: &mut Element, name: &str, value: &str) {
    if !element.attributes.contains_key(name) {
        element.attributes.insert(name.to_string(), value.to_string());
    }
}

fn default_path_attr(element: &mut Element, path: &str, name: &str, value: &str) {
    if path_attr(element, path, name).is_none() {
        default_attr(ensure_path(element, path), name, value);
    }
}

fn invalid_value(kind: &str, option: &str, value: &str, reason: &str) -> VmXmlError {
    VmXmlError::InvalidOptionValue {
        kind: kind.to_string(),
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Point `<source>` at a network/bridge and switch the interface type.
fn set_source(element: &mut Element, kind: &str, attr_name: &str, value: &str) {
    if value.is_empty() {
        remove_path(element, "source");
        return;
    }
    element
        .attributes
        .insert("type".to_string(), kind.to_string());
    let source = ensure_path(element, "source");
    source.attributes.clear();
    source
        .attributes
        .insert(attr_name.to_string(), value.to_string());
}

// ── disk ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Disk;

static DISK_OPTIONS: &[SubOption] = &[
    SubOption::attr("device", "", "device"),
    SubOption::attr("type", "", "type"),
    SubOption::custom("path").alias(&["source.file", "source.dev"]),
    SubOption::attr("bus", "target", "bus").alias(&["target.bus"]),
    SubOption::attr("target", "target", "dev").alias(&["target.dev"]),
    SubOption::attr("driver.name", "driver", "name"),
    SubOption::attr("driver.type", "driver", "type").alias(&["format"]),
    SubOption::attr("cache", "driver", "cache").alias(&["driver.cache"]),
    SubOption::attr("discard", "driver", "discard").alias(&["driver.discard"]),
    SubOption::attr("io", "driver", "io").alias(&["driver.io"]),
    SubOption::flag("readonly", "readonly"),
    SubOption::flag("shareable", "shareable"),
    SubOption::text("serial", "serial"),
    SubOption::attr("boot.order", "boot", "order"),
    SubOption::storage("size"),
    SubOption::storage("sparse"),
];

impl Disk {
    fn path(element: &Element) -> Option<&str> {
        path_attr(element, "source", "file").or_else(|| path_attr(element, "source", "dev"))
    }

    fn set_path(element: &mut Element, value: &str) {
        if value.is_empty() {
            remove_path(element, "source");
            return;
        }
        let block = match attr(element, "type") {
            Some(t) => t == "block",
            None => value.starts_with("/dev/"),
        };
        if matches!(attr(element, "type"), None | Some("file") | Some("block")) {
            element.attributes.insert(
                "type".to_string(),
                if block { "block" } else { "file" }.to_string(),
            );
        }
        let source = ensure_path(element, "source");
        source.attributes.shift_remove("file");
        source.attributes.shift_remove("dev");
        source.attributes.insert(
            if block { "dev" } else { "file" }.to_string(),
            value.to_string(),
        );
    }

    fn target_prefix(bus: &str) -> &'static str {
        match bus {
            "virtio" => "vd",
            "ide" => "hd",
            "fdc" => "fd",
            "xen" => "xvd",
            _ => "sd",
        }
    }

    fn format_for(path: &str) -> &'static str {
        if Path::new(path)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("qcow2"))
        {
            "qcow2"
        } else {
            "raw"
        }
    }
}

/// `idx` 0 is `a`, 25 is `z`, 26 is `aa`.
pub(crate) fn target_name(prefix: &str, idx: usize) -> String {
    let mut n = idx + 1;
    let mut suffix = Vec::new();
    while n > 0 {
        n -= 1;
        suffix.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }
    let mut name = prefix.to_string();
    name.extend(suffix.iter().rev());
    name
}

fn next_target(prefix: &str, taken: &[&str]) -> String {
    let mut idx = 0;
    loop {
        let candidate = target_name(prefix, idx);
        if !taken.contains(&candidate.as_str()) {
            return candidate;
        }
        idx += 1;
    }
}

impl ElementKind for Disk {
    fn cli_name(&self) -> &'static str {
        "disk"
    }

    fn xml_tag(&self) -> &'static str {
        "disk"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        DISK_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("path")
    }

    fn needs_setup(&self) -> bool {
        true
    }

    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        match name {
            "path" => {
                Self::set_path(element, value);
                Ok(())
            }
            _ => Err(invalid_value("disk", name, value, "not supported")),
        }
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        match name {
            "path" => Self::path(element).map(str::to_string),
            _ => None,
        }
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        guest: &Snapshot,
        ctx: &DefaultsContext<'_>,
        parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "device", "disk");
        let device = attr(element, "device").unwrap_or("disk").to_string();

        if Self::path(element).is_none() && parsed.get("size").is_some() && device == "disk" {
            let taken: Vec<String> = guest
                .devices("disk")
                .into_iter()
                .filter_map(|d| Self::path(d).map(str::to_string))
                .collect();
            let name = guest.name().unwrap_or_else(|| "vm".to_string());
            let path = unique_image_path(ctx.storage_dir, &name, &taken);
            Self::set_path(element, &path.to_string_lossy());
        }

        default_attr(element, "type", "file");
        default_path_attr(element, "driver", "name", "qemu");
        if let Some(path) = Self::path(element) {
            let format = Self::format_for(path);
            default_path_attr(element, "driver", "type", format);
        }

        let bus = match device.as_str() {
            "cdrom" => "sata",
            "floppy" => "fdc",
            _ if ctx.virtio() => "virtio",
            _ => "sata",
        };
        default_path_attr(element, "target", "bus", bus);

        if path_attr(element, "target", "dev").is_none() {
            let bus = path_attr(element, "target", "bus").unwrap_or(bus);
            let prefix = Self::target_prefix(bus);
            let existing = guest.devices("disk");
            let taken: Vec<&str> = existing
                .iter()
                .filter_map(|d| path_attr(d, "target", "dev"))
                .collect();
            let dev = next_target(prefix, &taken);
            ensure_path(element, "target")
                .attributes
                .insert("dev".to_string(), dev);
        }

        if device == "cdrom" {
            ensure_path(element, "readonly");
        }
        Ok(())
    }

    fn storage_request(
        &self,
        element: &Element,
        parsed: &ParsedOptions,
    ) -> Result<Option<StorageRequest>> {
        let Some(size) = parsed.get("size") else {
            return Ok(None);
        };
        let size_gb: f64 = size
            .parse()
            .ok()
            .filter(|s: &f64| s.is_finite() && *s > 0.0)
            .ok_or_else(|| invalid_value("disk", "size", size, "expected a positive size in GiB"))?;
        let sparse = match parsed.get("sparse") {
            Some(v) => parse_bool(v).ok_or_else(|| invalid_value("disk", "sparse", v, "expected yes/no"))?,
            None => true,
        };
        let path = path_attr(element, "source", "file").ok_or_else(|| {
            invalid_value("disk", "size", size, "storage can only be created for file paths")
        })?;
        let format = path_attr(element, "driver", "type")
            .unwrap_or_else(|| Self::format_for(path))
            .to_string();

        Ok(Some(StorageRequest {
            path: path.into(),
            size_gb,
            format,
            sparse,
        }))
    }
}

// ── network ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Network;

static NETWORK_OPTIONS: &[SubOption] = &[
    SubOption::attr("type", "", "type"),
    SubOption::custom("network").alias(&["source.network"]),
    SubOption::custom("bridge").alias(&["source.bridge"]),
    SubOption::attr("source.mode", "source", "mode"),
    SubOption::attr("mac", "mac", "address").alias(&["mac.address"]),
    SubOption::attr("model", "model", "type").alias(&["model.type"]),
    SubOption::attr("target", "target", "dev").alias(&["target.dev"]),
    SubOption::attr("link.state", "link", "state"),
    SubOption::attr("mtu.size", "mtu", "size"),
    SubOption::attr("driver.name", "driver", "name"),
    SubOption::attr("driver.queues", "driver", "queues"),
    SubOption::attr("boot.order", "boot", "order"),
];

/// Generate a locally-administered unicast MAC address using random bytes.
fn rand_mac() -> [u8; 6] {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let s = RandomState::new();
    let mut h = s.build_hasher();
    h.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    let v = h.finish();

    let mut mac = [0u8; 6];
    mac[0] = 0x52; // locally administered, unicast
    mac[1] = 0x54;
    mac[2] = 0x00;
    mac[3] = (v >> 16) as u8;
    mac[4] = (v >> 8) as u8;
    mac[5] = v as u8;
    mac
}

/// A MAC address not already used by one of `taken`.
pub(crate) fn generate_mac(taken: &[&str]) -> String {
    loop {
        let b = rand_mac();
        let mac = format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        );
        if !taken.iter().any(|t| t.eq_ignore_ascii_case(&mac)) {
            return mac;
        }
    }
}

impl ElementKind for Network {
    fn cli_name(&self) -> &'static str {
        "network"
    }

    fn xml_tag(&self) -> &'static str {
        "interface"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        NETWORK_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("type")
    }

    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        match name {
            "network" => set_source(element, "network", "network", value),
            "bridge" => set_source(element, "bridge", "bridge", value),
            _ => return Err(invalid_value("network", name, value, "not supported")),
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        let wanted = match name {
            "network" | "bridge" => name,
            _ => return None,
        };
        (attr(element, "type") == Some(wanted))
            .then(|| path_attr(element, "source", wanted).map(str::to_string))
            .flatten()
    }

    fn canonical_value(&self, name: &str, value: &str) -> String {
        match name {
            "mac" => value.to_ascii_lowercase(),
            _ => value.to_string(),
        }
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        guest: &Snapshot,
        ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "type", "network");
        if attr(element, "type") == Some("network") && path_attr(element, "source", "network").is_none() {
            default_path_attr(element, "source", "network", "default");
        }
        let model = if ctx.virtio() { "virtio" } else { "e1000e" };
        default_path_attr(element, "model", "type", model);

        if path_attr(element, "mac", "address").is_none() {
            let existing = guest.devices("interface");
            let taken: Vec<&str> = existing
                .iter()
                .filter_map(|i| path_attr(i, "mac", "address"))
                .collect();
            let mac = generate_mac(&taken);
            ensure_path(element, "mac")
                .attributes
                .insert("address".to_string(), mac);
        }
        Ok(())
    }
}

// ── graphics ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Graphics;

static GRAPHICS_OPTIONS: &[SubOption] = &[
    SubOption::attr("type", "", "type"),
    SubOption::attr("port", "", "port"),
    SubOption::attr("tlsport", "", "tlsPort"),
    SubOption::attr("autoport", "", "autoport"),
    SubOption::attr("listen", "", "listen"),
    SubOption::attr("password", "", "passwd").alias(&["passwd"]),
    SubOption::attr("passwordvalidto", "", "passwdValidTo"),
    SubOption::attr("keymap", "", "keymap"),
    SubOption::attr("gl.enable", "gl", "enable"),
    SubOption::attr("gl.rendernode", "gl", "rendernode"),
    SubOption::attr("image.compression", "image", "compression"),
];

impl ElementKind for Graphics {
    fn cli_name(&self) -> &'static str {
        "graphics"
    }

    fn xml_tag(&self) -> &'static str {
        "graphics"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        GRAPHICS_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("type")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "type", "vnc");
        let remote = matches!(attr(element, "type"), Some("vnc") | Some("spice"));
        if remote && attr(element, "port").is_none() && attr(element, "autoport").is_none() {
            default_attr(element, "port", "-1");
            default_attr(element, "autoport", "yes");
        }
        Ok(())
    }
}

// ── video ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Video;

static VIDEO_OPTIONS: &[SubOption] = &[
    SubOption::attr("model", "model", "type").alias(&["model.type"]),
    SubOption::attr("model.heads", "model", "heads"),
    SubOption::attr("model.vram", "model", "vram"),
    SubOption::attr("model.ram", "model", "ram"),
    SubOption::attr("model.vgamem", "model", "vgamem"),
    SubOption::attr("model.accel3d", "model/acceleration", "accel3d"),
];

impl ElementKind for Video {
    fn cli_name(&self) -> &'static str {
        "video"
    }

    fn xml_tag(&self) -> &'static str {
        "video"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        VIDEO_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("model")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        let model = if ctx.virtio() { "virtio" } else { "vga" };
        default_path_attr(element, "model", "type", model);
        Ok(())
    }
}

// ── sound ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Sound;

static SOUND_OPTIONS: &[SubOption] = &[
    SubOption::attr("model", "", "model"),
    SubOption::attr("codec.type", "codec", "type"),
    SubOption::attr("audio.id", "audio", "id"),
];

impl ElementKind for Sound {
    fn cli_name(&self) -> &'static str {
        "sound"
    }

    fn xml_tag(&self) -> &'static str {
        "sound"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        SOUND_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("model")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "model", "ich9");
        Ok(())
    }
}

// ── controller ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Controller;

static CONTROLLER_OPTIONS: &[SubOption] = &[
    SubOption::attr("type", "", "type"),
    SubOption::attr("model", "", "model"),
    SubOption::attr("index", "", "index"),
    SubOption::attr("ports", "", "ports"),
    SubOption::attr("vectors", "", "vectors"),
    SubOption::attr("driver.queues", "driver", "queues"),
];

impl ElementKind for Controller {
    fn cli_name(&self) -> &'static str {
        "controller"
    }

    fn xml_tag(&self) -> &'static str {
        "controller"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        CONTROLLER_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("type")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        guest: &Snapshot,
        ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "type", "usb");
        let ctype = attr(element, "type").unwrap_or("usb").to_string();
        match ctype.as_str() {
            "usb" => default_attr(element, "model", "qemu-xhci"),
            "scsi" if ctx.virtio() => default_attr(element, "model", "virtio-scsi"),
            _ => {}
        }
        if attr(element, "index").is_none() {
            let existing = guest.devices("controller");
            let used: Vec<u32> = existing
                .iter()
                .filter(|c| attr(c, "type") == Some(ctype.as_str()))
                .filter_map(|c| attr(c, "index").and_then(|i| i.parse().ok()))
                .collect();
            let index = (0..).find(|i| !used.contains(i)).unwrap_or(0);
            element
                .attributes
                .insert("index".to_string(), index.to_string());
        }
        Ok(())
    }
}

// ── input ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Input;

static INPUT_OPTIONS: &[SubOption] = &[
    SubOption::attr("type", "", "type"),
    SubOption::attr("bus", "", "bus"),
];

impl ElementKind for Input {
    fn cli_name(&self) -> &'static str {
        "input"
    }

    fn xml_tag(&self) -> &'static str {
        "input"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        INPUT_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("type")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "type", "tablet");
        let bus = if attr(element, "type") == Some("tablet") { "usb" } else { "ps2" };
        default_attr(element, "bus", bus);
        Ok(())
    }
}

// ── hostdev ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Hostdev;

static HOSTDEV_OPTIONS: &[SubOption] = &[
    SubOption::attr("type", "", "type"),
    SubOption::attr("mode", "", "mode"),
    SubOption::attr("managed", "", "managed"),
    SubOption::custom("name"),
    SubOption::attr("address.domain", "source/address", "domain"),
    SubOption::attr("address.bus", "source/address", "bus"),
    SubOption::attr("address.slot", "source/address", "slot"),
    SubOption::attr("address.function", "source/address", "function"),
    SubOption::attr("driver.name", "driver", "name"),
    SubOption::attr("rom.bar", "rom", "bar"),
    SubOption::attr("boot.order", "boot", "order"),
];

static PCI_ADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([0-9a-fA-F]{1,4}):)?([0-9a-fA-F]{1,2}):([0-9a-fA-F]{1,2})\.([0-7])$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static USB_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0x[0-9a-fA-F]{4}):(0x[0-9a-fA-F]{4})$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PciAddress {
    domain: u16,
    bus: u8,
    slot: u8,
    function: u8,
}

impl PciAddress {
    fn parse(s: &str) -> Option<Self> {
        let caps = PCI_ADDR.captures(s)?;
        let hex = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("0");
        Some(Self {
            domain: u16::from_str_radix(hex(1), 16).ok()?,
            bus: u8::from_str_radix(hex(2), 16).ok()?,
            slot: u8::from_str_radix(hex(3), 16).ok()?,
            function: u8::from_str_radix(hex(4), 16).ok()?,
        })
    }

    fn from_element(element: &Element) -> Option<Self> {
        let addr = find_path(element, "source/address")?;
        let field = |name: &str| {
            let v = attr(addr, name)?;
            u16::from_str_radix(v.trim_start_matches("0x"), 16).ok()
        };
        Some(Self {
            domain: field("domain").unwrap_or(0),
            bus: u8::try_from(field("bus")?).ok()?,
            slot: u8::try_from(field("slot")?).ok()?,
            function: u8::try_from(field("function")?).ok()?,
        })
    }

    fn canonical(&self) -> String {
        format!(
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

impl ElementKind for Hostdev {
    fn cli_name(&self) -> &'static str {
        "hostdev"
    }

    fn xml_tag(&self) -> &'static str {
        "hostdev"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        HOSTDEV_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("name")
    }

    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        if name != "name" {
            return Err(invalid_value("hostdev", name, value, "not supported"));
        }
        if let Some(pci) = PciAddress::parse(value) {
            element
                .attributes
                .insert("type".to_string(), "pci".to_string());
            let source = ensure_path(element, "source");
            source.children.clear();
            let addr = ensure_path(source, "address");
            for (k, v) in [
                ("domain", format!("0x{:04x}", pci.domain)),
                ("bus", format!("0x{:02x}", pci.bus)),
                ("slot", format!("0x{:02x}", pci.slot)),
                ("function", format!("0x{:x}", pci.function)),
            ] {
                addr.attributes.insert(k.to_string(), v);
            }
            return Ok(());
        }
        if let Some(caps) = USB_ID.captures(value) {
            element
                .attributes
                .insert("type".to_string(), "usb".to_string());
            let source = ensure_path(element, "source");
            source.children.clear();
            ensure_path(source, "vendor")
                .attributes
                .insert("id".to_string(), caps[1].to_lowercase());
            ensure_path(source, "product")
                .attributes
                .insert("id".to_string(), caps[2].to_lowercase());
            return Ok(());
        }
        Err(invalid_value(
            "hostdev",
            name,
            value,
            "expected a PCI address (0000:00:1b.0) or USB vendor:product (0x1234:0x5678)",
        ))
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        if name != "name" {
            return None;
        }
        match attr(element, "type") {
            Some("usb") => Some(format!(
                "{}:{}",
                path_attr(element, "source/vendor", "id")?,
                path_attr(element, "source/product", "id")?
            )),
            _ => PciAddress::from_element(element).map(|p| p.canonical()),
        }
    }

    fn canonical_value(&self, name: &str, value: &str) -> String {
        match name {
            "name" => PciAddress::parse(value)
                .map(|p| p.canonical())
                .unwrap_or_else(|| value.to_ascii_lowercase()),
            _ => value.to_string(),
        }
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "mode", "subsystem");
        default_attr(element, "type", "pci");
        if attr(element, "type") == Some("pci") {
            default_attr(element, "managed", "yes");
        }
        Ok(())
    }
}

// ── rng ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Rng;

static RNG_OPTIONS: &[SubOption] = &[
    SubOption::attr("model", "", "model"),
    SubOption::attr("backend.model", "backend", "model"),
    SubOption::text("backend", "backend").alias(&["device"]),
    SubOption::attr("rate.bytes", "rate", "bytes"),
    SubOption::attr("rate.period", "rate", "period"),
];

impl ElementKind for Rng {
    fn cli_name(&self) -> &'static str {
        "rng"
    }

    fn xml_tag(&self) -> &'static str {
        "rng"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        RNG_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("backend")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "model", "virtio");
        default_path_attr(element, "backend", "model", "random");
        if path_attr(element, "backend", "model") == Some("random")
            && find_path(element, "backend").and_then(|b| b.get_text()).is_none()
        {
            crate::snapshot::set_text(ensure_path(element, "backend"), "/dev/urandom");
        }
        Ok(())
    }
}

// ── watchdog ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Watchdog;

static WATCHDOG_OPTIONS: &[SubOption] = &[
    SubOption::attr("model", "", "model"),
    SubOption::attr("action", "", "action"),
];

impl ElementKind for Watchdog {
    fn cli_name(&self) -> &'static str {
        "watchdog"
    }

    fn xml_tag(&self) -> &'static str {
        "watchdog"
    }

    fn placement(&self) -> Placement {
        Placement::Device
    }

    fn options(&self) -> &'static [SubOption] {
        WATCHDOG_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("model")
    }

    fn set_defaults(
        &self,
        element: &mut Element,
        _guest: &Snapshot,
        _ctx: &DefaultsContext<'_>,
        _parsed: &ParsedOptions,
    ) -> Result<()> {
        default_attr(element, "model", "i6300esb");
        default_attr(element, "action", "reset");
        Ok(())
    }
}
