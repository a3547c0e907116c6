use xmltree::{Element, XMLNode};

use super::{ElementKind, Placement};
use crate::error::{Result, VmXmlError};
use crate::options::{SubOption, ensure_path, find_path, parse_bool, remove_path};
use crate::snapshot::{child_elements, set_text, text_of};

fn invalid_value(kind: &str, option: &str, value: &str, reason: &str) -> VmXmlError {
    VmXmlError::InvalidOptionValue {
        kind: kind.to_string(),
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn unsupported_option(kind: &str, option: &str, value: &str) -> VmXmlError {
    invalid_value(kind, option, value, "not supported")
}

fn set_or_remove_text(element: &mut Element, path: &str, value: Option<String>) {
    match value {
        Some(v) => set_text(ensure_path(element, path), &v),
        None => remove_path(element, path),
    }
}

fn parse_count(kind: &str, option: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid_value(kind, option, value, "expected a positive integer"))
}

// ── boot (<os>) ────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Boot;

const BOOT_DEVICES: &[&str] = &["hd", "cdrom", "network", "fd"];

static BOOT_OPTIONS: &[SubOption] = &[
    SubOption::attr("arch", "type", "arch"),
    SubOption::attr("machine", "type", "machine"),
    SubOption::attr("firmware", "", "firmware"),
    SubOption::custom("order").multi().alias(&["boot_order"]),
    SubOption::text("kernel", "kernel"),
    SubOption::text("initrd", "initrd"),
    SubOption::text("cmdline", "cmdline").alias(&["kernel_args"]),
    SubOption::text("dtb", "dtb"),
    SubOption::text("loader", "loader"),
    SubOption::attr("loader.readonly", "loader", "readonly").alias(&["loader_ro"]),
    SubOption::attr("loader.type", "loader", "type").alias(&["loader_type"]),
    SubOption::attr("loader.secure", "loader", "secure"),
    SubOption::text("nvram", "nvram"),
    SubOption::attr("nvram.template", "nvram", "template"),
    SubOption::attr("bootmenu.enable", "bootmenu", "enable").alias(&["menu"]),
    SubOption::attr("bootmenu.timeout", "bootmenu", "timeout"),
    SubOption::attr("bios.useserial", "bios", "useserial"),
    SubOption::text("init", "init"),
];

impl ElementKind for Boot {
    fn cli_name(&self) -> &'static str {
        "boot"
    }

    fn xml_tag(&self) -> &'static str {
        "os"
    }

    fn placement(&self) -> Placement {
        Placement::Child
    }

    fn options(&self) -> &'static [SubOption] {
        BOOT_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("order")
    }

    /// Tokens replace every `<boot dev>` entry; `uefi` selects EFI firmware.
    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        if name != "order" {
            return Err(unsupported_option("boot", name, value));
        }
        let mut devs = Vec::new();
        let mut uefi = false;
        for token in value.split(',').filter(|t| !t.is_empty()) {
            match token {
                "uefi" => uefi = true,
                t if BOOT_DEVICES.contains(&t) => devs.push(t),
                t => {
                    return Err(invalid_value(
                        "boot",
                        "order",
                        t,
                        "expected one of hd, cdrom, network, fd, uefi",
                    ));
                }
            }
        }

        if uefi {
            element
                .attributes
                .insert("firmware".to_string(), "efi".to_string());
        }
        if !devs.is_empty() || value.is_empty() {
            element
                .children
                .retain(|n| !matches!(n, XMLNode::Element(e) if e.name == "boot"));
            for dev in devs {
                let mut boot = Element::new("boot");
                boot.attributes.insert("dev".to_string(), dev.to_string());
                element.children.push(XMLNode::Element(boot));
            }
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        if name != "order" {
            return None;
        }
        let devs: Vec<&str> = child_elements(element, "boot")
            .filter_map(|b| b.attributes.get("dev").map(String::as_str))
            .collect();
        (!devs.is_empty()).then(|| devs.join(","))
    }
}

// ── cpu ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Cpu;

const CPU_MODES: &[&str] = &["host-passthrough", "host-model", "maximum"];

static CPU_OPTIONS: &[SubOption] = &[
    SubOption::custom("model"),
    SubOption::attr("mode", "", "mode"),
    SubOption::attr("match", "", "match"),
    SubOption::attr("check", "", "check"),
    SubOption::attr("migratable", "", "migratable"),
    SubOption::attr("model.fallback", "model", "fallback"),
    SubOption::text("vendor", "vendor"),
    SubOption::attr("topology.sockets", "topology", "sockets").alias(&["sockets"]),
    SubOption::attr("topology.dies", "topology", "dies").alias(&["dies"]),
    SubOption::attr("topology.cores", "topology", "cores").alias(&["cores"]),
    SubOption::attr("topology.threads", "topology", "threads").alias(&["threads"]),
    SubOption::attr("cache.mode", "cache", "mode"),
    SubOption::custom("require").multi(),
    SubOption::custom("disable").multi(),
];

impl Cpu {
    fn features<'a>(element: &'a Element, policy: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        child_elements(element, "feature")
            .filter(move |f| f.attributes.get("policy").map(String::as_str) == Some(policy))
            .filter_map(|f| f.attributes.get("name").map(String::as_str))
    }

    fn set_feature(element: &mut Element, policy: &str, name: &str) {
        element.children.retain(|n| {
            !matches!(n, XMLNode::Element(e)
                if e.name == "feature"
                    && e.attributes.get("name").map(String::as_str) == Some(name))
        });
        let mut feature = Element::new("feature");
        feature
            .attributes
            .insert("policy".to_string(), policy.to_string());
        feature.attributes.insert("name".to_string(), name.to_string());
        element.children.push(XMLNode::Element(feature));
    }
}

impl ElementKind for Cpu {
    fn cli_name(&self) -> &'static str {
        "cpu"
    }

    fn xml_tag(&self) -> &'static str {
        "cpu"
    }

    fn placement(&self) -> Placement {
        Placement::Child
    }

    fn options(&self) -> &'static [SubOption] {
        CPU_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("model")
    }

    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        match name {
            "model" if value.is_empty() => remove_path(element, "model"),
            "model" if CPU_MODES.contains(&value) => {
                element
                    .attributes
                    .insert("mode".to_string(), value.to_string());
                element.attributes.shift_remove("match");
                remove_path(element, "model");
            }
            "model" => {
                element
                    .attributes
                    .insert("mode".to_string(), "custom".to_string());
                if !element.attributes.contains_key("match") {
                    element
                        .attributes
                        .insert("match".to_string(), "exact".to_string());
                }
                set_text(ensure_path(element, "model"), value);
            }
            "require" | "disable" => {
                for feature in value.split(',').filter(|f| !f.is_empty()) {
                    Self::set_feature(element, name, feature);
                }
            }
            _ => return Err(unsupported_option("cpu", name, value)),
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        match name {
            "model" => match element.attributes.get("mode").map(String::as_str) {
                Some(mode) if CPU_MODES.contains(&mode) => Some(mode.to_string()),
                _ => find_path(element, "model").and_then(text_of),
            },
            "require" | "disable" => {
                let names: Vec<&str> = Self::features(element, name).collect();
                (!names.is_empty()).then(|| names.join(","))
            }
            _ => None,
        }
    }
}

// ── features ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Features;

static FEATURES_OPTIONS: &[SubOption] = &[
    SubOption::flag("acpi", "acpi"),
    SubOption::flag("apic", "apic"),
    SubOption::flag("pae", "pae"),
    SubOption::flag("hap", "hap"),
    SubOption::flag("privnet", "privnet"),
    SubOption::flag("vmcoreinfo", "vmcoreinfo"),
    SubOption::attr("smm", "smm", "state"),
    SubOption::attr("pmu", "pmu", "state"),
    SubOption::attr("vmport", "vmport", "state"),
    SubOption::attr("kvm.hidden.state", "kvm/hidden", "state").alias(&["kvm_hidden"]),
    SubOption::attr("kvm.hint-dedicated.state", "kvm/hint-dedicated", "state"),
    SubOption::attr("hyperv.relaxed.state", "hyperv/relaxed", "state")
        .alias(&["hyperv_relaxed"]),
    SubOption::attr("hyperv.vapic.state", "hyperv/vapic", "state").alias(&["hyperv_vapic"]),
    SubOption::attr("hyperv.spinlocks.state", "hyperv/spinlocks", "state")
        .alias(&["hyperv_spinlocks"]),
    SubOption::attr("hyperv.spinlocks.retries", "hyperv/spinlocks", "retries")
        .alias(&["hyperv_spinlocks_retries"]),
    SubOption::attr("hyperv.synic.state", "hyperv/synic", "state"),
    SubOption::attr("ioapic.driver", "ioapic", "driver"),
    SubOption::attr("gic.version", "gic", "version"),
];

impl ElementKind for Features {
    fn cli_name(&self) -> &'static str {
        "features"
    }

    fn xml_tag(&self) -> &'static str {
        "features"
    }

    fn placement(&self) -> Placement {
        Placement::Child
    }

    fn options(&self) -> &'static [SubOption] {
        FEATURES_OPTIONS
    }
}

// ── clock ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Clock;

static CLOCK_OPTIONS: &[SubOption] = &[
    SubOption::attr("offset", "", "offset"),
    SubOption::attr("timezone", "", "timezone"),
    SubOption::attr("basis", "", "basis"),
    SubOption::attr("adjustment", "", "adjustment"),
    SubOption::custom("rtc_tickpolicy"),
    SubOption::custom("rtc_present"),
    SubOption::custom("pit_tickpolicy"),
    SubOption::custom("pit_present"),
    SubOption::custom("hpet_present"),
    SubOption::custom("kvmclock_present"),
    SubOption::custom("hypervclock_present"),
];

impl Clock {
    fn timer<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
        child_elements(element, "timer")
            .find(|t| t.attributes.get("name").map(String::as_str) == Some(name))
    }

    fn timer_mut<'a>(element: &'a mut Element, name: &str) -> &'a mut Element {
        let pos = element.children.iter().position(|n| {
            matches!(n, XMLNode::Element(e)
                if e.name == "timer" && e.attributes.get("name").map(String::as_str) == Some(name))
        });
        let pos = pos.unwrap_or_else(|| {
            let mut timer = Element::new("timer");
            timer.attributes.insert("name".to_string(), name.to_string());
            element.children.push(XMLNode::Element(timer));
            element.children.len() - 1
        });
        match &mut element.children[pos] {
            XMLNode::Element(e) => e,
            _ => unreachable!("timer position points at an element"),
        }
    }

    fn drop_empty_timers(element: &mut Element) {
        element.children.retain(|n| {
            !matches!(n, XMLNode::Element(e) if e.name == "timer" && e.attributes.len() <= 1)
        });
    }
}

impl ElementKind for Clock {
    fn cli_name(&self) -> &'static str {
        "clock"
    }

    fn xml_tag(&self) -> &'static str {
        "clock"
    }

    fn placement(&self) -> Placement {
        Placement::Child
    }

    fn options(&self) -> &'static [SubOption] {
        CLOCK_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("offset")
    }

    /// `<timer>_<attr>` keys edit `<timer name="<timer>" <attr>=.../>`.
    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        let Some((timer, attr)) = name.split_once('_') else {
            return Err(unsupported_option("clock", name, value));
        };
        let value = match attr {
            _ if value.is_empty() => None,
            "present" => {
                let on = parse_bool(value)
                    .ok_or_else(|| invalid_value("clock", name, value, "expected yes/no"))?;
                Some(if on { "yes" } else { "no" }.to_string())
            }
            _ => Some(value.to_string()),
        };
        match value {
            Some(v) => {
                Self::timer_mut(element, timer)
                    .attributes
                    .insert(attr.to_string(), v);
            }
            None => {
                Self::timer_mut(element, timer).attributes.shift_remove(attr);
                Self::drop_empty_timers(element);
            }
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        let (timer, attr) = name.split_once('_')?;
        Self::timer(element, timer)?.attributes.get(attr).cloned()
    }

    fn canonical_value(&self, name: &str, value: &str) -> String {
        match parse_bool(value) {
            Some(b) if name.ends_with("_present") => if b { "yes" } else { "no" }.to_string(),
            _ => value.to_string(),
        }
    }
}

// ── memory ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Memory;

static MEMORY_OPTIONS: &[SubOption] = &[
    SubOption::custom("memory"),
    SubOption::custom("currentMemory").alias(&["currentmemory"]),
    SubOption::custom("maxmemory").alias(&["hotplugmemorymax"]),
    SubOption::attr("maxmemory.slots", "maxMemory", "slots").alias(&["hotplugmemoryslots"]),
];

const KIB_PER_MIB: u64 = 1024;

impl Memory {
    fn element_for(option: &str) -> &'static str {
        match option {
            "maxmemory" => "maxMemory",
            "currentMemory" => "currentMemory",
            _ => "memory",
        }
    }

    fn set_kib(root: &mut Element, tag: &str, kib: Option<u64>) {
        match kib {
            Some(kib) => {
                let el = ensure_path(root, tag);
                el.attributes.insert("unit".to_string(), "KiB".to_string());
                set_text(el, &kib.to_string());
            }
            None => remove_path(root, tag),
        }
    }

    /// Value of a memory element in MiB, honoring its `unit`.
    fn read_mib(root: &Element, tag: &str) -> Option<u64> {
        let el = find_path(root, tag)?;
        let value: u64 = text_of(el)?.parse().ok()?;
        let kib = match el.attributes.get("unit").map(String::as_str) {
            None | Some("KiB") | Some("k") => value,
            Some("b") | Some("bytes") => value / 1024,
            Some("MiB") | Some("M") => value * KIB_PER_MIB,
            Some("GiB") | Some("G") => value * KIB_PER_MIB * 1024,
            Some(_) => return None,
        };
        Some(kib / KIB_PER_MIB)
    }
}

impl ElementKind for Memory {
    fn cli_name(&self) -> &'static str {
        "memory"
    }

    fn xml_tag(&self) -> &'static str {
        "domain"
    }

    fn placement(&self) -> Placement {
        Placement::Root
    }

    fn options(&self) -> &'static [SubOption] {
        MEMORY_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("memory")
    }

    /// Values are MiB; libvirt stores KiB. `memory` also sets the
    /// current allocation.
    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        let kib = match value {
            "" => None,
            v => Some(parse_count("memory", name, v)? * KIB_PER_MIB),
        };
        match name {
            "memory" => {
                Self::set_kib(element, "memory", kib);
                Self::set_kib(element, "currentMemory", kib);
            }
            "currentMemory" | "maxmemory" => Self::set_kib(element, Self::element_for(name), kib),
            _ => return Err(unsupported_option("memory", name, value)),
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        Self::read_mib(element, Self::element_for(name)).map(|m| m.to_string())
    }
}

// ── vcpus ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Vcpus;

static VCPUS_OPTIONS: &[SubOption] = &[
    SubOption::custom("vcpus"),
    SubOption::custom("maxvcpus"),
    SubOption::attr("placement", "vcpu", "placement"),
    SubOption::attr("cpuset", "vcpu", "cpuset"),
];

impl Vcpus {
    fn maximum(root: &Element) -> Option<u64> {
        find_path(root, "vcpu").and_then(text_of)?.parse().ok()
    }

    fn current(root: &Element) -> Option<u64> {
        let vcpu = find_path(root, "vcpu")?;
        match vcpu.attributes.get("current") {
            Some(c) => c.parse().ok(),
            None => Self::maximum(root),
        }
    }
}

impl ElementKind for Vcpus {
    fn cli_name(&self) -> &'static str {
        "vcpus"
    }

    fn xml_tag(&self) -> &'static str {
        "domain"
    }

    fn placement(&self) -> Placement {
        Placement::Root
    }

    fn options(&self) -> &'static [SubOption] {
        VCPUS_OPTIONS
    }

    fn positional(&self) -> Option<&'static str> {
        Some("vcpus")
    }

    /// `<vcpu current="N">MAX</vcpu>`: `vcpus` sets the active count,
    /// `maxvcpus` the ceiling.
    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            remove_path(element, "vcpu");
            return Ok(());
        }
        let count = parse_count("vcpus", name, value)?;
        match name {
            "vcpus" => {
                let max = Self::maximum(element);
                let has_current = find_path(element, "vcpu")
                    .is_some_and(|v| v.attributes.contains_key("current"));
                let vcpu = ensure_path(element, "vcpu");
                match max {
                    Some(max) if has_current && count < max => {
                        vcpu.attributes
                            .insert("current".to_string(), count.to_string());
                    }
                    _ => {
                        vcpu.attributes.shift_remove("current");
                        set_text(vcpu, &count.to_string());
                    }
                }
            }
            "maxvcpus" => {
                let current = Self::current(element);
                let vcpu = ensure_path(element, "vcpu");
                set_text(vcpu, &count.to_string());
                match current {
                    Some(cur) if cur < count => {
                        vcpu.attributes
                            .insert("current".to_string(), cur.to_string());
                    }
                    _ => {
                        vcpu.attributes.shift_remove("current");
                    }
                }
            }
            _ => return Err(unsupported_option("vcpus", name, value)),
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        match name {
            "vcpus" => Self::current(element),
            "maxvcpus" => Self::maximum(element),
            _ => None,
        }
        .map(|n| n.to_string())
    }
}

// ── metadata ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Metadata;

static METADATA_OPTIONS: &[SubOption] = &[
    SubOption::custom("name"),
    SubOption::custom("uuid"),
    SubOption::text("title", "title"),
    SubOption::text("description", "description"),
    SubOption::text("genid", "genid"),
];

impl ElementKind for Metadata {
    fn cli_name(&self) -> &'static str {
        "metadata"
    }

    fn xml_tag(&self) -> &'static str {
        "domain"
    }

    fn placement(&self) -> Placement {
        Placement::Root
    }

    fn options(&self) -> &'static [SubOption] {
        METADATA_OPTIONS
    }

    fn apply_custom(&self, element: &mut Element, name: &str, value: &str) -> Result<()> {
        match name {
            "name" if value.is_empty() => {
                return Err(invalid_value("metadata", name, value, "a domain needs a name"));
            }
            "name" => set_or_remove_text(element, "name", Some(value.to_string())),
            "uuid" if value.is_empty() => remove_path(element, "uuid"),
            "uuid" => {
                let uuid = uuid::Uuid::try_parse(value)
                    .map_err(|e| invalid_value("metadata", name, value, &e.to_string()))?;
                set_or_remove_text(element, "uuid", Some(uuid.hyphenated().to_string()));
            }
            _ => return Err(unsupported_option("metadata", name, value)),
        }
        Ok(())
    }

    fn read_custom(&self, element: &Element, name: &str) -> Option<String> {
        match name {
            "name" | "uuid" => find_path(element, name).and_then(text_of),
            _ => None,
        }
    }

    fn canonical_value(&self, name: &str, value: &str) -> String {
        match name {
            "uuid" => uuid::Uuid::try_parse(value)
                .map(|u| u.hyphenated().to_string())
                .unwrap_or_else(|_| value.to_ascii_lowercase()),
            _ => value.to_string(),
        }
    }
}
