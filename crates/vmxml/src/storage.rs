use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, VmXmlError};

/// Default directory for disk images created without an explicit path.
pub const DEFAULT_STORAGE_DIR: &str = "/var/lib/libvirt/images";

/// Backing storage a new disk needs before the hypervisor can use it.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRequest {
    pub path: PathBuf,
    pub size_gb: f64,
    /// Image format as passed to `qemu-img create -f`.
    pub format: String,
    pub sparse: bool,
}

impl StorageRequest {
    /// Size argument in KiB, which `qemu-img` accepts with a `K` suffix.
    fn size_arg(&self) -> String {
        let kib = (self.size_gb * 1024.0 * 1024.0).round() as u64;
        format!("{kib}K")
    }
}

/// Creates disk images.
pub trait StorageBuilder: Send + Sync {
    fn create(&self, request: &StorageRequest) -> impl Future<Output = Result<()>> + Send;
}

/// Storage builder backed by `qemu-img create`.
#[derive(Debug, Clone)]
pub struct QemuImg {
    binary: PathBuf,
}

impl Default for QemuImg {
    fn default() -> Self {
        Self {
            binary: "qemu-img".into(),
        }
    }
}

impl QemuImg {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| "qemu-img".into()),
        }
    }

    fn create_args(request: &StorageRequest) -> Vec<String> {
        let mut args = vec!["create".to_string(), "-f".into(), request.format.clone()];
        if !request.sparse {
            args.extend(["-o".into(), "preallocation=falloc".into()]);
        }
        args.push(request.path.to_string_lossy().into_owned());
        args.push(request.size_arg());
        args
    }
}

impl StorageBuilder for QemuImg {
    async fn create(&self, request: &StorageRequest) -> Result<()> {
        let path = &request.path;
        if path.exists() {
            info!(path = %path.display(), "storage already present; skipping creation");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = Self::create_args(request);
        info!(
            path = %path.display(),
            size_gb = request.size_gb,
            format = %request.format,
            "creating storage"
        );
        debug!(args = ?args, "qemu-img command line");

        let output = tokio::process::Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| storage_error(path, format!("{} not found: {e}", self.binary.display())))?;

        if !output.status.success() {
            return Err(storage_error(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        info!(path = %path.display(), "storage created");
        Ok(())
    }
}

fn storage_error(path: &Path, detail: String) -> VmXmlError {
    VmXmlError::StorageCreationFailed {
        path: path.into(),
        detail,
    }
}
