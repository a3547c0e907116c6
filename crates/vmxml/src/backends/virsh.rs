use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Result, VmXmlError};
use crate::snapshot::Snapshot;
use crate::traits::Connection;
use crate::types::{DomainHandle, DomainState};

/// Connection that drives libvirt through the `virsh` client.
///
/// XML documents are handed over in temporary files.
#[derive(Debug, Clone)]
pub struct VirshConnection {
    binary: PathBuf,
    uri: Option<String>,
}

impl VirshConnection {
    pub fn new(uri: Option<String>) -> Self {
        Self {
            binary: "virsh".into(),
            uri,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["-q".to_string()];
        if let Some(uri) = &self.uri {
            args.push("-c".into());
            args.push(uri.clone());
        }
        args
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|a| a.to_string()));
        debug!(args = ?full, "virsh command line");

        let output = tokio::process::Command::new(&self.binary)
            .args(&full)
            .output()
            .await
            .map_err(|source| VmXmlError::SpawnFailed {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .map(|l| l.trim_start_matches("error: ").trim())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(": ");
            return Err(VmXmlError::CommandFailed {
                command: format!("virsh {}", args.first().copied().unwrap_or_default()),
                detail,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a command whose last argument is a file holding `xml`.
    async fn run_with_xml(&self, args: &[&str], xml: &str) -> Result<String> {
        let file = tempfile::Builder::new()
            .prefix("virt-xml-")
            .suffix(".xml")
            .tempfile()?;
        tokio::fs::write(file.path(), xml).await?;
        let path = file.path().to_string_lossy().into_owned();

        let mut full: Vec<&str> = args.to_vec();
        full.insert(args.len().min(2), path.as_str());
        self.run(&full).await
    }

    async fn describe(&self, ident: &str) -> Result<DomainHandle> {
        let name = self.run(&["domname", ident]).await?.trim().to_string();
        let uuid = self.run(&["domuuid", ident]).await?.trim().to_string();
        let id = self.run(&["domid", ident]).await?.trim().parse().ok();
        Ok(DomainHandle { name, id, uuid })
    }

    fn not_found(kind: &str, value: &str) -> VmXmlError {
        VmXmlError::CommandFailed {
            command: "virsh lookup".to_string(),
            detail: format!("Domain not found: no domain with matching {kind} '{value}'"),
        }
    }

    fn name_of(xml: &str) -> Result<String> {
        Snapshot::parse(xml)?
            .name()
            .ok_or_else(|| VmXmlError::unsupported("domain XML has no <name>"))
    }
}

impl Connection for VirshConnection {
    async fn lookup_by_name(&self, name: &str) -> Result<DomainHandle> {
        let handle = self.describe(name).await?;
        if handle.name != name {
            return Err(Self::not_found("name", name));
        }
        Ok(handle)
    }

    async fn lookup_by_id(&self, id: u32) -> Result<DomainHandle> {
        let handle = self.describe(&id.to_string()).await?;
        if handle.id != Some(id) {
            return Err(Self::not_found("id", &id.to_string()));
        }
        Ok(handle)
    }

    async fn lookup_by_uuid(&self, uuid: &str) -> Result<DomainHandle> {
        let handle = self.describe(uuid).await?;
        if !handle.uuid.eq_ignore_ascii_case(uuid) {
            return Err(Self::not_found("uuid", uuid));
        }
        Ok(handle)
    }

    async fn state(&self, dom: &DomainHandle) -> Result<DomainState> {
        let out = self.run(&["domstate", &dom.uuid]).await?;
        Ok(DomainState::from_virsh(&out))
    }

    async fn xml_desc(&self, dom: &DomainHandle, inactive: bool) -> Result<String> {
        let mut args = vec!["dumpxml", dom.uuid.as_str()];
        if inactive {
            args.push("--inactive");
        }
        self.run(&args).await
    }

    async fn define_xml(&self, xml: &str) -> Result<DomainHandle> {
        let name = Self::name_of(xml)?;
        self.run_with_xml(&["define"], xml).await?;
        info!(domain = %name, "virsh: defined");
        self.describe(&name).await
    }

    async fn create_xml(&self, xml: &str) -> Result<DomainHandle> {
        let name = Self::name_of(xml)?;
        self.run_with_xml(&["create"], xml).await?;
        info!(domain = %name, "virsh: created transient domain");
        self.describe(&name).await
    }

    async fn create(&self, dom: &DomainHandle) -> Result<()> {
        self.run(&["start", &dom.uuid]).await?;
        info!(domain = %dom.name, "virsh: started");
        Ok(())
    }

    async fn attach_device(&self, dom: &DomainHandle, xml: &str) -> Result<()> {
        self.run_with_xml(&["attach-device", &dom.uuid, "--live"], xml)
            .await?;
        info!(domain = %dom.name, "virsh: device attached");
        Ok(())
    }

    async fn detach_device(&self, dom: &DomainHandle, xml: &str) -> Result<()> {
        self.run_with_xml(&["detach-device", &dom.uuid, "--live"], xml)
            .await?;
        info!(domain = %dom.name, "virsh: device detached");
        Ok(())
    }

    async fn update_device(&self, dom: &DomainHandle, xml: &str) -> Result<()> {
        self.run_with_xml(&["update-device", &dom.uuid, "--live"], xml)
            .await?;
        info!(domain = %dom.name, "virsh: device updated");
        Ok(())
    }
}
