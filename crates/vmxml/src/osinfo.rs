use crate::error::{Result, VmXmlError};

/// A guest operating system known to the device defaulting code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsVariant {
    pub name: &'static str,
    pub label: &'static str,
    pub supports_virtio: bool,
}

const fn os(name: &'static str, label: &'static str, supports_virtio: bool) -> OsVariant {
    OsVariant {
        name,
        label,
        supports_virtio,
    }
}

static VARIANTS: &[OsVariant] = &[
    os("generic", "Generic OS", false),
    os("linux2022", "Generic Linux 2022", true),
    os("linux2024", "Generic Linux 2024", true),
    os("fedora40", "Fedora Linux 40", true),
    os("fedora41", "Fedora Linux 41", true),
    os("rhel9.4", "Red Hat Enterprise Linux 9.4", true),
    os("centos-stream9", "CentOS Stream 9", true),
    os("debian12", "Debian 12", true),
    os("ubuntu22.04", "Ubuntu 22.04 LTS", true),
    os("ubuntu24.04", "Ubuntu 24.04 LTS", true),
    os("freebsd14.0", "FreeBSD 14.0", true),
    os("win10", "Microsoft Windows 10", false),
    os("win11", "Microsoft Windows 11", false),
    os("win2k22", "Microsoft Windows Server 2022", false),
];

pub fn variants() -> &'static [OsVariant] {
    VARIANTS
}

pub fn find(name: &str) -> Result<&'static OsVariant> {
    VARIANTS
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| VmXmlError::UnknownOsVariant {
            name: name.to_string(),
        })
}

/// Table printed for `--os-variant list`.
pub fn listing() -> String {
    let mut out = format!("{:<20} {:<36} VIRTIO\n", "NAME", "DESCRIPTION");
    out.push_str(&"-".repeat(64));
    out.push('\n');
    for v in VARIANTS {
        out.push_str(&format!(
            "{:<20} {:<36} {}\n",
            v.name,
            v.label,
            if v.supports_virtio { "yes" } else { "no" }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known_and_unknown() {
        assert!(find("fedora41").unwrap().supports_virtio);
        assert!(!find("win11").unwrap().supports_virtio);
        let err = find("plan9").unwrap_err();
        assert_eq!(err.to_string(), "Unknown OS name 'plan9'");
    }

    #[test]
    fn listing_has_every_variant() {
        let text = listing();
        assert_eq!(text.lines().count(), variants().len() + 2);
        assert!(text.contains("debian12"));
    }
}
