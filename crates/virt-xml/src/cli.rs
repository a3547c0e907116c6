use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, FromArgMatches, Parser};
use miette::{IntoDiagnostic, Result};
use tokio::io::AsyncReadExt;
use tracing::debug;
use vmxml::elements::{self, ElementKind};
use vmxml::storage::DEFAULT_STORAGE_DIR;
use vmxml::{
    ActionFlags, ApplyFlags, AssumeYes, ConsolePrompt, Input, Prompt, QemuImg, Request,
    RouterConnection, VmXmlError, osinfo, select, workflow,
};

#[derive(Parser, Debug)]
#[command(
    name = "virt-xml",
    about = "Edit libvirt XML using command line options",
    version
)]
pub struct Cli {
    /// Domain name, id or UUID
    domain: Option<String>,

    /// Hypervisor connection URI
    #[arg(short = 'c', long = "connect", value_name = "URI", env = "LIBVIRT_DEFAULT_URI")]
    connect: Option<String>,

    /// Edit an existing element; optionally pick it by number, 'all' or a match
    #[arg(
        long,
        value_name = "SELECTOR",
        num_args = 0..=1,
        allow_negative_numbers = true,
        help_heading = "Action"
    )]
    edit: Option<Option<String>>,

    /// Add a new device
    #[arg(long, help_heading = "Action")]
    add_device: bool,

    /// Remove an existing device
    #[arg(long, help_heading = "Action")]
    remove_device: bool,

    /// Print the element XML without touching any domain
    #[arg(long, help_heading = "Action")]
    build_xml: bool,

    /// Apply the change to the running guest
    #[arg(long, help_heading = "Apply")]
    update: bool,

    /// Persist the changed XML as the new definition (the default)
    #[arg(long, overrides_with = "no_define", help_heading = "Apply")]
    define: bool,

    /// Do not persist the changed XML
    #[arg(long, overrides_with = "define", help_heading = "Apply")]
    no_define: bool,

    /// Start the domain after the change
    #[arg(long, help_heading = "Apply")]
    start: bool,

    /// Print a diff of the changed XML
    #[arg(long, conflicts_with = "print_xml", help_heading = "Output")]
    print_diff: bool,

    /// Print the complete changed XML
    #[arg(long, help_heading = "Output")]
    print_xml: bool,

    /// Ask before each change is applied
    #[arg(long, help_heading = "Output")]
    confirm: bool,

    /// Guest OS used to pick device defaults; 'list' shows known names
    #[arg(long = "os-variant", visible_alias = "osinfo", value_name = "NAME")]
    os_variant: Option<String>,

    /// Directory for disk images created without an explicit path
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STORAGE_DIR)]
    image_dir: PathBuf,

    /// Print debugging information
    #[arg(short, long)]
    debug: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,

    #[arg(long, hide = true, env = "VIRT_XML_ASSUME_YES")]
    assume_yes: bool,
}

fn element_arg(kind: &'static dyn ElementKind) -> Arg {
    let name = kind.cli_name();
    Arg::new(name)
        .long(name)
        .value_name("OPTIONS")
        .action(ArgAction::Append)
        .allow_hyphen_values(true)
        .help_heading("Elements")
        .help(format!("Configure <{}>; '--{name} help' lists the options", kind.xml_tag()))
}

/// The clap command with one flag per registered element type.
pub fn command() -> Command {
    elements::registry()
        .iter()
        .fold(Cli::command(), |cmd, kind| cmd.arg(element_arg(*kind)))
}

/// Parsed command line: static flags plus the values of every element flag.
#[derive(Debug)]
pub struct Invocation {
    cli: Cli,
    elements: Vec<(&'static dyn ElementKind, Vec<String>)>,
}

impl Invocation {
    pub fn parse() -> Result<Self> {
        Self::from_matches(&command().get_matches())
    }

    #[cfg(test)]
    fn try_parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args).into_diagnostic()?;
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let cli = Cli::from_arg_matches(matches).into_diagnostic()?;
        let elements = elements::registry()
            .iter()
            .map(|kind| {
                let values = matches
                    .get_many::<String>(kind.cli_name())
                    .map(|v| v.cloned().collect())
                    .unwrap_or_default();
                (*kind, values)
            })
            .collect();
        Ok(Self { cli, elements })
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        let cli = &self.cli;
        let previewing = cli.confirm || cli.print_xml || cli.print_diff || cli.build_xml;
        if cli.debug {
            "debug"
        } else if cli.quiet && !previewing {
            "error"
        } else {
            "warn"
        }
    }

    /// Text for `--os-variant list` or `--<type> help`, if one was asked for.
    fn introspection(&self) -> Option<String> {
        if self.cli.os_variant.as_deref() == Some("list") {
            return Some(osinfo::listing());
        }
        self.elements
            .iter()
            .find(|(_, values)| values.iter().any(|v| elements::is_introspection(v)))
            .map(|(kind, _)| elements::describe(*kind))
    }

    fn action_flags(&self) -> ActionFlags {
        ActionFlags {
            edit: self.cli.edit.clone(),
            add_device: self.cli.add_device,
            remove_device: self.cli.remove_device,
            build_xml: self.cli.build_xml,
        }
    }

    fn apply_flags(&self) -> ApplyFlags {
        let cli = &self.cli;
        let define = if cli.define {
            Some(true)
        } else if cli.no_define {
            Some(false)
        } else {
            None
        };
        ApplyFlags {
            update: cli.update,
            define,
            start: cli.start,
            print_diff: cli.print_diff,
            print_xml: cli.print_xml,
            confirm: cli.confirm,
            quiet: cli.quiet,
        }
    }

    async fn input(&self) -> Result<Input> {
        if let Some(domain) = &self.cli.domain {
            return Ok(Input::Domain(domain.clone()));
        }
        if self.cli.build_xml || std::io::stdin().is_terminal() {
            return Ok(Input::None);
        }
        let mut xml = String::new();
        tokio::io::stdin()
            .read_to_string(&mut xml)
            .await
            .into_diagnostic()?;
        debug!(bytes = xml.len(), "read domain XML from stdin");
        Ok(Input::Stdin(xml))
    }

    async fn request(self) -> Result<Request> {
        let action = self.action_flags().select()?;
        let os = self
            .cli
            .os_variant
            .as_deref()
            .map(osinfo::find)
            .transpose()?;
        let input = self.input().await?;
        let flags = self.apply_flags();
        let selection = select::select_kind(self.elements)?;
        Ok(Request {
            action,
            selection,
            os,
            flags,
            input,
            storage_dir: self.cli.image_dir,
        })
    }

    pub async fn run(self) -> Result<()> {
        if let Some(text) = self.introspection() {
            print!("{text}");
            return Ok(());
        }

        let conn = RouterConnection::from_uri(self.cli.connect.as_deref());
        let prompt: Box<dyn Prompt> = if self.cli.assume_yes {
            Box::new(AssumeYes)
        } else {
            Box::new(ConsolePrompt)
        };
        let storage = QemuImg::default();
        let request = self.request().await?;

        let mut stdout = std::io::stdout();
        tokio::select! {
            result = workflow::run(&conn, &*prompt, &storage, request, &mut stdout) => {
                let outcome = result?;
                debug!(?outcome, "virt-xml finished");
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => Err(VmXmlError::Aborted.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmxml::Action;

    fn parse(args: &[&str]) -> Invocation {
        Invocation::try_parse_from(std::iter::once("virt-xml").chain(args.iter().copied())).unwrap()
    }

    fn values<'a>(inv: &'a Invocation, kind: &str) -> &'a [String] {
        inv.elements
            .iter()
            .find(|(k, _)| k.cli_name() == kind)
            .map(|(_, v)| v.as_slice())
            .unwrap()
    }

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn every_element_type_gets_a_flag() {
        let cmd = command();
        for kind in elements::registry() {
            assert!(
                cmd.get_arguments().any(|a| a.get_long() == Some(kind.cli_name())),
                "missing --{}",
                kind.cli_name()
            );
        }
    }

    #[test]
    fn edit_takes_an_optional_selector() {
        let inv = parse(&["myvm", "--edit", "--disk", "path=/tmp/x.img"]);
        assert_eq!(inv.action_flags().select().unwrap(), Action::Edit(None));
        assert_eq!(values(&inv, "disk"), ["path=/tmp/x.img"]);

        let inv = parse(&["myvm", "--edit", "-1", "--network", "model=e1000e"]);
        assert_eq!(
            inv.action_flags().select().unwrap(),
            Action::Edit(Some("-1".into()))
        );
    }

    #[test]
    fn element_flags_repeat() {
        let inv = parse(&["myvm", "--add-device", "--disk", "size=1", "--disk", "size=2"]);
        assert_eq!(values(&inv, "disk"), ["size=1", "size=2"]);
        assert!(values(&inv, "network").is_empty());
    }

    #[test]
    fn define_and_no_define_last_wins() {
        assert_eq!(parse(&["myvm", "--edit"]).apply_flags().define, None);
        assert_eq!(
            parse(&["myvm", "--edit", "--no-define"]).apply_flags().define,
            Some(false)
        );
        assert_eq!(
            parse(&["myvm", "--edit", "--no-define", "--define"]).apply_flags().define,
            Some(true)
        );
    }

    #[test]
    fn introspection_requests() {
        let inv = parse(&["--disk", "help"]);
        assert!(inv.introspection().unwrap().starts_with("--disk options:"));
        let inv = parse(&["--network=?"]);
        assert!(inv.introspection().unwrap().starts_with("--network options:"));
        let inv = parse(&["--os-variant", "list"]);
        assert!(inv.introspection().unwrap().contains("fedora41"));
        assert!(parse(&["myvm", "--edit", "--disk", "cache=none"]).introspection().is_none());
    }

    #[test]
    fn quiet_only_applies_without_previews() {
        assert_eq!(parse(&["-q"]).log_level(), "error");
        assert_eq!(parse(&["-q", "--print-xml"]).log_level(), "warn");
        assert_eq!(parse(&["-q", "--debug"]).log_level(), "debug");
        assert_eq!(parse(&[]).log_level(), "warn");
    }

    #[test]
    fn print_diff_conflicts_with_print_xml() {
        let err = Invocation::try_parse_from(["virt-xml", "myvm", "--print-diff", "--print-xml"]);
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn build_xml_request_has_no_input() {
        let inv = parse(&["--build-xml", "--disk", "size=5", "--image-dir", "/tmp/images"]);
        let request = inv.request().await.unwrap();
        assert_eq!(request.action, Action::BuildXml);
        assert_eq!(request.input, Input::None);
        assert_eq!(request.selection.kind.cli_name(), "disk");
        assert_eq!(request.storage_dir, PathBuf::from("/tmp/images"));
    }

    #[tokio::test]
    async fn request_validation_errors() {
        let err = parse(&["myvm", "--remove-device", "--disk", "1", "--edit"])
            .request()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Conflicting options --edit, --remove-device");

        let err = parse(&["myvm", "--edit", "--disk", "1", "--memory", "512"])
            .request()
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Only one change operation"));

        let err = parse(&["myvm", "--add-device", "--disk", "1", "--os-variant", "plan9"])
            .request()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown OS name 'plan9'");
    }
}
