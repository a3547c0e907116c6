//! Apply a computed change to a domain.
//!
//! The same change is computed against the live snapshot for `--update` and
//! against the persistent snapshot for define and start. Live updates always
//! happen before the definition is replaced.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::diff::xml_diff;
use crate::engine::{ChangeContext, PendingElement, action_build_xml, apply_action};
use crate::error::{Result, VmXmlError};
use crate::osinfo::OsVariant;
use crate::prompt::Prompt;
use crate::resolve::resolve_domain;
use crate::select::{Action, Selection};
use crate::snapshot::Snapshot;
use crate::storage::StorageBuilder;
use crate::traits::Connection;
use crate::types::{DeviceAction, DomainHandle};

/// Where the domain configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Name, id or UUID of a domain on the connection.
    Domain(String),
    /// A complete domain document read from standard input.
    Stdin(String),
    /// Nothing given; only `--build-xml` works without a domain.
    None,
}

/// Apply and preview switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyFlags {
    pub update: bool,
    /// `None` unless `--define` or `--no-define` was given.
    pub define: Option<bool>,
    pub start: bool,
    pub print_diff: bool,
    pub print_xml: bool,
    pub confirm: bool,
    pub quiet: bool,
}

impl ApplyFlags {
    /// Fill in the switches implied by the others.
    ///
    /// Defining is the default unless a preview was asked for or the XML came
    /// from standard input, in which case the altered XML is printed instead.
    pub fn normalize(&mut self, stdin: bool) {
        if !self.print_xml && !self.print_diff {
            if stdin {
                if self.define != Some(true) {
                    self.print_xml = true;
                }
            } else if self.define.is_none() {
                self.define = Some(true);
            }
        }
        if self.confirm && !self.print_xml {
            self.print_diff = true;
        }
        if self.confirm || self.print_xml || self.print_diff {
            self.quiet = false;
        }
    }

    fn define(&self) -> bool {
        self.define.unwrap_or(false)
    }
}

/// One complete invocation.
#[derive(Debug, Clone)]
pub struct Request {
    pub action: Action,
    pub selection: Selection,
    pub os: Option<&'static OsVariant>,
    pub flags: ApplyFlags,
    pub input: Input,
    /// Directory for disk images created without an explicit path.
    pub storage_dir: PathBuf,
}

/// Non-fatal conditions reported while applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    NotRunning,
    NoDiff,
    UnchangedAfterDefine,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NotRunning => write!(f, "The VM is not running, --update is inapplicable."),
            Warning::NoDiff => write!(
                f,
                "No XML diff was generated. The requested changes will have no effect."
            ),
            Warning::UnchangedAfterDefine => write!(
                f,
                "XML did not change after domain define. You may have changed a value that libvirt is setting by default."
            ),
        }
    }
}

/// What an invocation actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub updated: bool,
    pub defined: bool,
    pub started: bool,
    pub warnings: Vec<Warning>,
}

struct Session<'a, C, B> {
    conn: &'a C,
    prompt: &'a dyn Prompt,
    storage: &'a B,
    out: &'a mut (dyn Write + Send),
    flags: ApplyFlags,
    outcome: Outcome,
}

impl<C: Connection, B: StorageBuilder> Session<'_, C, B> {
    fn confirm(&self, question: &str) -> Result<bool> {
        if !self.flags.confirm {
            return Ok(true);
        }
        self.prompt.confirm(question)
    }

    fn print(&mut self, text: &str) -> Result<()> {
        if self.flags.quiet {
            return Ok(());
        }
        self.out.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Each warning is reported at most once per invocation.
    fn warn(&mut self, warning: Warning) {
        if self.outcome.warnings.contains(&warning) {
            return;
        }
        warn!("{warning}");
        self.outcome.warnings.push(warning);
    }

    async fn setup_all(&self, devs: &mut [PendingElement]) -> Result<()> {
        for dev in devs.iter_mut() {
            dev.setup(self.storage).await?;
        }
        Ok(())
    }

    /// Mutate `guest` in place and preview the result.
    fn prepare_changes(
        &mut self,
        guest: &mut Snapshot,
        action: &Action,
        ctx: &ChangeContext<'_>,
        reuse: Option<&[PendingElement]>,
    ) -> Result<Vec<PendingElement>> {
        let origxml = guest.to_xml()?;
        let devs = apply_action(guest, action, ctx, reuse)?;
        let newxml = guest.to_xml()?;

        let (diff, stats) = xml_diff(&origxml, &newxml);
        debug!(
            added = stats.lines_added,
            removed = stats.lines_removed,
            "computed xml diff"
        );
        if stats.is_empty() {
            self.warn(Warning::NoDiff);
        }

        if self.flags.print_diff {
            if !diff.is_empty() {
                self.print(&diff)?;
            }
        } else if self.flags.print_xml {
            self.print(&newxml)?;
        }
        Ok(devs)
    }

    /// Send each element to the running domain.
    async fn update_changes(
        &mut self,
        dom: &DomainHandle,
        name: &str,
        devs: &mut [PendingElement],
        op: DeviceAction,
    ) -> Result<()> {
        for dev in devs.iter_mut() {
            let xml = dev.to_xml()?;
            let question = match op {
                DeviceAction::Hotplug => {
                    format!("{xml}\n\nHotplug this device to the guest '{name}'?")
                }
                DeviceAction::Hotunplug => {
                    format!("{xml}\n\nHot unplug this device from the guest '{name}'?")
                }
                DeviceAction::Update => {
                    format!("{xml}\n\nUpdate this device for the guest '{name}'?")
                }
            };
            if !self.confirm(&question)? {
                continue;
            }

            if op == DeviceAction::Hotplug {
                dev.setup(self.storage).await?;
            }
            let result = match op {
                DeviceAction::Hotplug => self.conn.attach_device(dom, &xml).await,
                DeviceAction::Hotunplug => self.conn.detach_device(dom, &xml).await,
                DeviceAction::Update => self.conn.update_device(dom, &xml).await,
            };
            result.map_err(|e| VmXmlError::DeviceOperation {
                action: op,
                detail: e.to_string(),
            })?;
            info!(domain = %name, action = %op, "live device change applied");

            self.print(&format!("Device {op} successful."))?;
            if self.flags.confirm {
                self.print("")?;
            }
        }
        Ok(())
    }

    /// Persist `guest`; `None` when the user declined.
    async fn define_changes(
        &mut self,
        name: &str,
        guest: &Snapshot,
        devs: &mut [PendingElement],
        hotplug: bool,
    ) -> Result<Option<DomainHandle>> {
        if !self.confirm(&format!("Define '{name}' with the changed XML?"))? {
            return Ok(None);
        }
        if hotplug {
            self.setup_all(devs).await?;
        }

        let dom = self
            .conn
            .define_xml(&guest.to_xml()?)
            .await
            .map_err(|e| VmXmlError::DefineFailed {
                domain: name.to_string(),
                detail: e.to_string(),
            })?;
        self.outcome.defined = true;
        self.print(&format!("Domain '{name}' defined successfully."))?;
        Ok(Some(dom))
    }

    /// Run `guest` as a transient domain without defining it.
    async fn start_domain_transient(
        &mut self,
        name: &str,
        guest: &Snapshot,
        devs: &mut [PendingElement],
        hotplug: bool,
    ) -> Result<()> {
        if !self.confirm(&format!("Start '{name}' with the changed XML?"))? {
            return Ok(());
        }
        if hotplug {
            self.setup_all(devs).await?;
        }

        self.conn
            .create_xml(&guest.to_xml()?)
            .await
            .map_err(|e| VmXmlError::StartFailed {
                domain: name.to_string(),
                detail: e.to_string(),
            })?;
        self.outcome.started = true;
        self.print(&format!("Domain '{name}' started successfully."))
    }

    async fn start_defined(&mut self, name: &str, dom: &DomainHandle) -> Result<()> {
        self.conn
            .create(dom)
            .await
            .map_err(|e| VmXmlError::StartFailed {
                domain: name.to_string(),
                detail: e.to_string(),
            })?;
        self.outcome.started = true;
        self.print(&format!("Domain '{name}' started successfully."))
    }

    async fn defined_xml_is_unchanged(&self, dom: &DomainHandle, origxml: &str) -> Result<bool> {
        let fetched = self.conn.xml_desc(dom, true).await?;
        Ok(Snapshot::parse(&fetched)?.to_xml()? == origxml)
    }
}

/// Run one invocation end to end, writing user-facing output to `out`.
pub async fn run<C: Connection, B: StorageBuilder>(
    conn: &C,
    prompt: &dyn Prompt,
    storage: &B,
    request: Request,
    out: &mut (dyn Write + Send),
) -> Result<Outcome> {
    let Request {
        action,
        selection,
        os,
        mut flags,
        input,
        storage_dir,
    } = request;

    let stdin = matches!(input, Input::Stdin(_));
    if stdin && flags.confirm {
        return Err(VmXmlError::unsupported("Can't use --confirm with stdin input."));
    }
    if stdin && flags.update {
        return Err(VmXmlError::unsupported("Can't use --update with stdin input."));
    }
    flags.normalize(stdin);

    let kind = selection.kind;
    if flags.update && !kind.is_device() {
        return Err(VmXmlError::unsupported(format!(
            "Don't know how to --update for --{}",
            kind.cli_name()
        )));
    }
    if flags.update && flags.start {
        return Err(VmXmlError::ConflictingOptions {
            first: "--update".to_string(),
            second: "--start".to_string(),
        });
    }

    let ctx = ChangeContext {
        kind,
        values: &selection.values,
        os,
        storage_dir: &storage_dir,
    };
    let mut session = Session {
        conn,
        prompt,
        storage,
        out,
        flags,
        outcome: Outcome::default(),
    };

    if action == Action::BuildXml {
        session.flags.quiet = false;
        for dev in action_build_xml(&ctx)? {
            session.print(&dev.to_xml()?)?;
        }
        return Ok(session.outcome);
    }

    let (handle, mut inactive, mut active) = match input {
        Input::Domain(ident) => {
            let resolved = resolve_domain(conn, &ident).await?;
            (Some(resolved.handle), resolved.inactive, resolved.active)
        }
        Input::Stdin(xml) => (None, Snapshot::parse(&xml)?, None),
        Input::None => return Err(VmXmlError::unsupported("A domain must be specified")),
    };
    let name = inactive
        .name()
        .or_else(|| handle.as_ref().map(|h| h.name.clone()))
        .unwrap_or_default();
    let running = active.is_some();

    let mut reuse = None;
    if session.flags.update {
        match (active.as_mut(), handle.as_ref(), action.device_action()) {
            (Some(live), Some(dom), Some(op)) => {
                let mut devs = session.prepare_changes(live, &action, &ctx, None)?;
                session.update_changes(dom, &name, &mut devs, op).await?;
                session.outcome.updated = true;
                reuse = Some(devs);
            }
            _ => session.warn(Warning::NotRunning),
        }
        if !session.flags.define() {
            return Ok(session.outcome);
        }
    }

    let origxml = inactive.to_xml()?;
    let mut devs = session.prepare_changes(&mut inactive, &action, &ctx, reuse.as_deref())?;
    let hotplug = action == Action::AddDevice;

    if !session.flags.define() {
        if session.flags.start {
            session
                .start_domain_transient(&name, &inactive, &mut devs, hotplug)
                .await?;
        }
        return Ok(session.outcome);
    }

    let Some(dom) = session
        .define_changes(&name, &inactive, &mut devs, hotplug)
        .await?
    else {
        return Ok(session.outcome);
    };

    if session.flags.start {
        session.start_defined(&name, &dom).await?;
    } else if running && !session.outcome.updated {
        session.print("Changes will take effect after the domain is fully powered off.")?;
    } else if let Some(original) = handle.as_ref() {
        if session.defined_xml_is_unchanged(original, &origxml).await? {
            session.warn(Warning::UnchangedAfterDefine);
        }
    }
    Ok(session.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test::live_devices;
    use crate::backends::{Call, Operation, TestConnection};
    use crate::elements::lookup;
    use crate::options::find_path;
    use crate::select::ActionFlags;
    use crate::testing::{CountingStorage, ScriptedPrompt};
    use crate::types::DomainState;

    const MYVM: &str = r#"<domain type="kvm">
  <name>myvm</name>
  <uuid>0b3f0a2e-8c4d-4c35-9d0e-6f1c2a3b4c5d</uuid>
  <memory unit="KiB">1048576</memory>
  <vcpu>1</vcpu>
  <devices>
    <disk type="file" device="disk">
      <driver name="qemu" type="qcow2" cache="none"/>
      <source file="/var/lib/libvirt/images/myvm.qcow2"/>
      <target dev="vda" bus="virtio"/>
    </disk>
  </devices>
</domain>"#;

    struct Harness {
        conn: TestConnection,
        prompt: ScriptedPrompt,
        storage: CountingStorage,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                conn: TestConnection::new(),
                prompt: ScriptedPrompt::default(),
                storage: CountingStorage::default(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn with_myvm(state: DomainState) -> Self {
            let h = Self::new();
            h.conn.add_domain(MYVM, state);
            h
        }

        fn request(&self, action: Action, kind: &str, values: &[&str], input: Input) -> Request {
            Request {
                action,
                selection: Selection {
                    kind: lookup(kind).unwrap(),
                    values: values.iter().map(|v| v.to_string()).collect(),
                },
                os: None,
                flags: ApplyFlags::default(),
                input,
                storage_dir: self.dir.path().to_path_buf(),
            }
        }

        async fn run(&self, request: Request) -> (Result<Outcome>, String) {
            let mut out = Vec::new();
            let result = run(&self.conn, &self.prompt, &self.storage, request, &mut out).await;
            (result, String::from_utf8(out).unwrap())
        }
    }

    fn domain(name: &str) -> Input {
        Input::Domain(name.to_string())
    }

    fn macs(xml: &str) -> Vec<String> {
        live_devices(xml, "interface")
            .iter()
            .filter_map(|i| find_path(i, "mac")?.attributes.get("address").cloned())
            .collect()
    }

    #[test]
    fn define_is_the_default() {
        let mut flags = ApplyFlags::default();
        flags.normalize(false);
        assert_eq!(flags.define, Some(true));
        assert!(!flags.print_xml);

        let mut preview = ApplyFlags {
            print_diff: true,
            ..Default::default()
        };
        preview.normalize(false);
        assert_eq!(preview.define, None);

        let mut stdin = ApplyFlags::default();
        stdin.normalize(true);
        assert!(stdin.print_xml);
        assert!(!stdin.define());

        let mut confirm = ApplyFlags {
            confirm: true,
            quiet: true,
            ..Default::default()
        };
        confirm.normalize(false);
        assert!(confirm.print_diff);
        assert!(!confirm.quiet);
    }

    #[tokio::test]
    async fn edit_shutoff_domain_defines() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let req = h.request(Action::Edit(None), "disk", &["path=/tmp/x.img"], domain("myvm"));
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.defined);
        assert!(outcome.warnings.is_empty());
        assert_eq!(out, "Domain 'myvm' defined successfully.\n");
        assert!(h.conn.inactive_xml("myvm").unwrap().contains("/tmp/x.img"));
        assert!(h.prompt.questions().is_empty());
    }

    #[tokio::test]
    async fn update_on_shutoff_domain_still_defines() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let mut req = h.request(Action::AddDevice, "disk", &["size=5"], domain("myvm"));
        req.flags.update = true;
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.warnings, [Warning::NotRunning]);
        assert!(!outcome.updated);
        assert!(outcome.defined);
        assert!(out.contains("Domain 'myvm' defined successfully."));

        assert_eq!(h.storage.calls(), 1);
        let requests = h.storage.requests();
        assert_eq!(requests[0].path, h.dir.path().join("myvm.qcow2"));
        assert_eq!(requests[0].size_gb, 5.0);
        assert!(
            !h.conn
                .calls()
                .iter()
                .any(|c| matches!(c, Call::AttachDevice(_)))
        );
    }

    #[test]
    fn conflicting_actions_fail_before_any_lookup() {
        let h = Harness::new();
        let flags = ActionFlags {
            edit: Some(None),
            remove_device: true,
            ..Default::default()
        };
        let err = flags.select().unwrap_err();
        assert_eq!(err.to_string(), "Conflicting options --edit, --remove-device");
        assert!(h.conn.calls().is_empty());
    }

    #[tokio::test]
    async fn build_xml_never_contacts_the_connection() {
        let h = Harness {
            conn: TestConnection::empty(),
            ..Harness::new()
        };
        let mut req = h.request(Action::BuildXml, "disk", &["size=5"], Input::None);
        req.flags.quiet = true;
        let (result, out) = h.run(req).await;

        result.unwrap();
        assert!(out.starts_with("<disk"));
        assert!(out.contains(r#"dev="vda""#));
        assert!(h.conn.calls().is_empty());
        assert_eq!(h.storage.calls(), 0);
    }

    #[tokio::test]
    async fn hotplug_then_define_share_the_device() {
        let h = Harness::new();
        let mut req = h.request(Action::AddDevice, "network", &[""], domain("test"));
        req.flags.update = true;
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.updated);
        assert!(outcome.defined);
        assert_eq!(
            out,
            "Device hotplug successful.\nDomain 'test' defined successfully.\n"
        );

        let live = macs(&h.conn.active_xml("test").unwrap());
        let persistent = macs(&h.conn.inactive_xml("test").unwrap());
        assert_eq!(live.len(), 2);
        assert_eq!(live, persistent);

        let calls = h.conn.calls();
        let attach = calls
            .iter()
            .position(|c| *c == Call::AttachDevice("test".into()))
            .unwrap();
        let define = calls
            .iter()
            .position(|c| *c == Call::DefineXml("test".into()))
            .unwrap();
        assert!(attach < define);
    }

    #[tokio::test]
    async fn hotplug_failure_is_fatal() {
        let h = Harness::new();
        h.conn.fail_on(Operation::Attach, "boom");
        let mut req = h.request(Action::AddDevice, "network", &[""], domain("test"));
        req.flags.update = true;
        let (result, out) = h.run(req).await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Error attempting device hotplug: attach failed: boom");
        assert!(out.is_empty());
        assert!(!h.conn.calls().iter().any(|c| matches!(c, Call::DefineXml(_))));
    }

    #[tokio::test]
    async fn hotunplug_failure_is_fatal() {
        let h = Harness::new();
        h.conn.fail_on(Operation::Detach, "device busy");
        let mut req = h.request(Action::RemoveDevice, "network", &["1"], domain("test"));
        req.flags.update = true;
        let (result, out) = h.run(req).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Error attempting device hotunplug: detach failed: device busy"
        );
        assert!(out.is_empty());
        assert!(!h.conn.calls().iter().any(|c| matches!(c, Call::DefineXml(_))));
    }

    #[tokio::test]
    async fn live_update_reports_success_then_defines() {
        let h = Harness::new();
        let mut req = h.request(Action::Edit(None), "network", &["model=e1000e"], domain("test"));
        req.flags.update = true;
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.updated);
        assert!(outcome.defined);
        assert_eq!(
            out,
            "Device update successful.\nDomain 'test' defined successfully.\n"
        );
        assert!(h.conn.active_xml("test").unwrap().contains("e1000e"));
        assert!(h.conn.calls().contains(&Call::UpdateDevice("test".into())));
    }

    #[tokio::test]
    async fn live_update_failure_is_fatal() {
        let h = Harness::new();
        h.conn.fail_on(Operation::Update, "unsupported change");
        let mut req = h.request(Action::Edit(None), "network", &["model=e1000e"], domain("test"));
        req.flags.update = true;
        let (result, _) = h.run(req).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Error attempting device update: update failed: unsupported change"
        );
        assert!(!h.conn.inactive_xml("test").unwrap().contains("e1000e"));
    }

    #[tokio::test]
    async fn no_diff_is_reported_once_across_snapshots() {
        let h = Harness::new();
        let mut req = h.request(Action::Edit(None), "disk", &["path=/guest/diskimage1"], domain("test"));
        req.flags.update = true;
        let (result, _) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.updated);
        let no_diff = outcome.warnings.iter().filter(|w| **w == Warning::NoDiff).count();
        assert_eq!(no_diff, 1);
    }

    #[tokio::test]
    async fn remove_all_from_empty_list_does_not_define() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let req = h.request(Action::RemoveDevice, "network", &["all"], domain("myvm"));
        let (result, out) = h.run(req).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "No --network objects found in the XML"
        );
        assert!(out.is_empty());
        assert!(!h.conn.calls().iter().any(|c| matches!(c, Call::DefineXml(_))));
    }

    #[tokio::test]
    async fn hotunplug_with_no_define_stops_after_update() {
        let h = Harness::new();
        let mut req = h.request(Action::RemoveDevice, "network", &["1"], domain("test"));
        req.flags.update = true;
        req.flags.define = Some(false);
        let (result, out) = h.run(req).await;

        assert!(result.unwrap().updated);
        assert_eq!(out, "Device hotunplug successful.\n");
        assert!(macs(&h.conn.active_xml("test").unwrap()).is_empty());
        assert_eq!(macs(&h.conn.inactive_xml("test").unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn declined_confirm_skips_define() {
        let h = Harness {
            prompt: ScriptedPrompt::answering(&[false]),
            ..Harness::with_myvm(DomainState::Shutoff)
        };
        let mut req = h.request(Action::Edit(None), "disk", &["cache=writeback"], domain("myvm"));
        req.flags.confirm = true;
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(!outcome.defined);
        assert_eq!(h.prompt.questions(), ["Define 'myvm' with the changed XML?"]);
        assert!(out.contains("--- Original XML"));
        assert!(out.contains("writeback"));
        assert!(!h.conn.calls().iter().any(|c| matches!(c, Call::DefineXml(_))));
    }

    #[tokio::test]
    async fn declined_device_prompt_skips_only_that_device() {
        let h = Harness {
            prompt: ScriptedPrompt::answering(&[false, true]),
            ..Harness::new()
        };
        let mut req = h.request(Action::Edit(None), "network", &["model=e1000e"], domain("test"));
        req.flags.update = true;
        req.flags.confirm = true;
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.defined);
        let questions = h.prompt.questions();
        assert!(questions[0].ends_with("Update this device for the guest 'test'?"));
        assert_eq!(questions[1], "Define 'test' with the changed XML?");
        assert!(!out.contains("Device update successful."));
        assert!(
            !h.conn
                .calls()
                .iter()
                .any(|c| matches!(c, Call::UpdateDevice(_)))
        );
    }

    #[tokio::test]
    async fn unchanged_definition_warns() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let req = h.request(Action::Edit(None), "disk", &["cache=none"], domain("myvm"));
        let (result, _) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.defined);
        assert_eq!(
            outcome.warnings,
            [Warning::NoDiff, Warning::UnchangedAfterDefine]
        );
    }

    #[tokio::test]
    async fn running_domain_without_update_waits_for_poweroff() {
        let h = Harness::new();
        let req = h.request(Action::Edit(None), "memory", &["4096"], domain("test"));
        let (result, out) = h.run(req).await;

        result.unwrap();
        assert_eq!(
            out,
            "Domain 'test' defined successfully.\nChanges will take effect after the domain is fully powered off.\n"
        );
    }

    #[tokio::test]
    async fn define_then_start() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let mut req = h.request(Action::Edit(None), "vcpus", &["2"], domain("myvm"));
        req.flags.start = true;
        let (result, out) = h.run(req).await;

        assert!(result.unwrap().started);
        assert!(out.ends_with("Domain 'myvm' started successfully.\n"));
        assert!(h.conn.calls().contains(&Call::Create("myvm".into())));
    }

    #[tokio::test]
    async fn define_failure_is_fatal() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        h.conn.fail_on(Operation::Define, "disk full");
        let req = h.request(Action::Edit(None), "vcpus", &["2"], domain("myvm"));
        let (result, out) = h.run(req).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Failed to define domain 'myvm': define failed: disk full"
        );
        assert!(out.is_empty());
        assert!(!h.conn.inactive_xml("myvm").unwrap().contains("<vcpu>2</vcpu>"));
    }

    #[tokio::test]
    async fn start_failure_after_define_keeps_the_definition() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        h.conn.fail_on(Operation::Create, "no memory");
        let mut req = h.request(Action::Edit(None), "vcpus", &["2"], domain("myvm"));
        req.flags.start = true;
        let (result, out) = h.run(req).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Failed starting domain 'myvm': create failed: no memory"
        );
        assert_eq!(out, "Domain 'myvm' defined successfully.\n");
        assert!(h.conn.calls().contains(&Call::DefineXml("myvm".into())));
        assert!(h.conn.inactive_xml("myvm").unwrap().contains("<vcpu>2</vcpu>"));
    }

    #[tokio::test]
    async fn start_transient_without_define() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let mut req = h.request(Action::AddDevice, "disk", &["size=1"], domain("myvm"));
        req.flags.start = true;
        req.flags.define = Some(false);
        let (result, out) = h.run(req).await;

        let outcome = result.unwrap();
        assert!(outcome.started);
        assert!(!outcome.defined);
        assert_eq!(out, "Domain 'myvm' started successfully.\n");
        assert_eq!(h.storage.calls(), 1);
        assert!(h.conn.calls().contains(&Call::CreateXml("myvm".into())));
        assert_eq!(live_devices(&h.conn.inactive_xml("myvm").unwrap(), "disk").len(), 1);
    }

    #[tokio::test]
    async fn transient_start_failure_is_fatal() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        h.conn.fail_on(Operation::CreateXml, "no memory");
        let mut req = h.request(Action::Edit(None), "vcpus", &["2"], domain("myvm"));
        req.flags.start = true;
        req.flags.define = Some(false);
        let (result, _) = h.run(req).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Failed starting domain 'myvm': createxml failed: no memory"
        );
    }

    #[tokio::test]
    async fn stdin_input_prints_altered_xml() {
        let h = Harness {
            conn: TestConnection::empty(),
            ..Harness::new()
        };
        let req = h.request(
            Action::Edit(None),
            "metadata",
            &["title=hello"],
            Input::Stdin(MYVM.to_string()),
        );
        let (result, out) = h.run(req).await;

        result.unwrap();
        assert!(out.contains("<title>hello</title>"));
        assert!(h.conn.calls().is_empty());
    }

    #[tokio::test]
    async fn stdin_input_can_be_defined() {
        let h = Harness {
            conn: TestConnection::empty(),
            ..Harness::new()
        };
        let mut req = h.request(Action::Edit(None), "vcpus", &["4"], Input::Stdin(MYVM.to_string()));
        req.flags.define = Some(true);
        let (result, out) = h.run(req).await;

        assert!(result.unwrap().defined);
        assert_eq!(out, "Domain 'myvm' defined successfully.\n");
        assert!(h.conn.inactive_xml("myvm").is_some());
    }

    #[tokio::test]
    async fn usage_errors() {
        let h = Harness::new();

        let mut req = h.request(Action::Edit(None), "disk", &["1"], Input::Stdin(MYVM.into()));
        req.flags.confirm = true;
        let (result, _) = h.run(req).await;
        assert_eq!(result.unwrap_err().to_string(), "Can't use --confirm with stdin input.");

        let mut req = h.request(Action::Edit(None), "disk", &["1"], Input::Stdin(MYVM.into()));
        req.flags.update = true;
        let (result, _) = h.run(req).await;
        assert_eq!(result.unwrap_err().to_string(), "Can't use --update with stdin input.");

        let req = h.request(Action::Edit(None), "disk", &["1"], Input::None);
        let (result, _) = h.run(req).await;
        assert_eq!(result.unwrap_err().to_string(), "A domain must be specified");

        let mut req = h.request(Action::Edit(None), "memory", &["512"], domain("test"));
        req.flags.update = true;
        let (result, _) = h.run(req).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Don't know how to --update for --memory"
        );

        let mut req = h.request(Action::AddDevice, "disk", &["size=1"], domain("test"));
        req.flags.update = true;
        req.flags.start = true;
        let (result, _) = h.run(req).await;
        assert_eq!(result.unwrap_err().to_string(), "Cannot use --update with --start");

        assert!(h.conn.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_domain_is_a_lookup_error() {
        let h = Harness::new();
        let req = h.request(Action::Edit(None), "disk", &["cache=none"], domain("ghost"));
        let (result, _) = h.run(req).await;
        assert!(matches!(result.unwrap_err(), VmXmlError::DomainNotFound { .. }));
    }

    #[tokio::test]
    async fn quiet_suppresses_status_lines() {
        let h = Harness::with_myvm(DomainState::Shutoff);
        let mut req = h.request(Action::Edit(None), "vcpus", &["2"], domain("myvm"));
        req.flags.quiet = true;
        let (result, out) = h.run(req).await;
        assert!(result.unwrap().defined);
        assert!(out.is_empty());
    }
}
