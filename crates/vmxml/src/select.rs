//! Validation of which action and which element type an invocation targets.

use crate::elements::ElementKind;
use crate::error::{Result, VmXmlError};
use crate::types::DeviceAction;

const ACTION_FLAGS: [&str; 4] = ["--edit", "--add-device", "--remove-device", "--build-xml"];

/// The structural change requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `--edit[=SELECTOR]`.
    Edit(Option<String>),
    AddDevice,
    RemoveDevice,
    BuildXml,
}

impl Action {
    /// Flag name without dashes, as used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Edit(_) => "edit",
            Action::AddDevice => "add-device",
            Action::RemoveDevice => "remove-device",
            Action::BuildXml => "build-xml",
        }
    }

    /// The live device operation this action maps to, if any.
    pub fn device_action(&self) -> Option<DeviceAction> {
        match self {
            Action::Edit(_) => Some(DeviceAction::Update),
            Action::AddDevice => Some(DeviceAction::Hotplug),
            Action::RemoveDevice => Some(DeviceAction::Hotunplug),
            Action::BuildXml => None,
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self, Action::Edit(_))
    }
}

/// Raw action flags as parsed from the command line.
#[derive(Debug, Clone, Default)]
pub struct ActionFlags {
    /// `None` when `--edit` is absent, `Some(None)` for a bare `--edit`.
    pub edit: Option<Option<String>>,
    pub add_device: bool,
    pub remove_device: bool,
    pub build_xml: bool,
}

impl ActionFlags {
    /// Exactly one action must be present.
    pub fn select(&self) -> Result<Action> {
        let present = [
            self.edit.is_some(),
            self.add_device,
            self.remove_device,
            self.build_xml,
        ];
        let set: Vec<&str> = ACTION_FLAGS
            .iter()
            .zip(present)
            .filter_map(|(flag, on)| on.then_some(*flag))
            .collect();

        match set.as_slice() {
            [] => Err(VmXmlError::MissingAction {
                actions: ACTION_FLAGS.join(", "),
            }),
            ["--edit"] => Ok(Action::Edit(self.edit.clone().flatten())),
            ["--add-device"] => Ok(Action::AddDevice),
            ["--remove-device"] => Ok(Action::RemoveDevice),
            ["--build-xml"] => Ok(Action::BuildXml),
            _ => Err(VmXmlError::ConflictingActions {
                flags: set.join(", "),
            }),
        }
    }
}

/// The one element type an invocation changes, with every value given for it.
#[derive(Debug, Clone)]
pub struct Selection {
    pub kind: &'static dyn ElementKind,
    pub values: Vec<String>,
}

/// Pick the single element type that received values.
pub fn select_kind<I>(requested: I) -> Result<Selection>
where
    I: IntoIterator<Item = (&'static dyn ElementKind, Vec<String>)>,
{
    let mut chosen: Vec<Selection> = requested
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(kind, values)| Selection { kind, values })
        .collect();

    match chosen.len() {
        0 => Err(VmXmlError::NoChange),
        1 => Ok(chosen.remove(0)),
        _ => Err(VmXmlError::ConflictingChanges {
            flags: format!(
                "[{}]",
                chosen
                    .iter()
                    .map(|s| format!("'--{}'", s.kind.cli_name()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::lookup;

    fn kind(name: &str) -> &'static dyn ElementKind {
        lookup(name).unwrap()
    }

    #[test]
    fn exactly_one_action() {
        let none = ActionFlags::default();
        assert_eq!(
            none.select().unwrap_err().to_string(),
            "One of --edit, --add-device, --remove-device, --build-xml must be specified."
        );

        let edit = ActionFlags {
            edit: Some(Some("2".into())),
            ..Default::default()
        };
        assert_eq!(edit.select().unwrap(), Action::Edit(Some("2".into())));

        let bare = ActionFlags {
            edit: Some(None),
            ..Default::default()
        };
        assert_eq!(bare.select().unwrap(), Action::Edit(None));
    }

    #[test]
    fn remove_with_edit_conflicts() {
        let flags = ActionFlags {
            edit: Some(None),
            remove_device: true,
            ..Default::default()
        };
        let err = flags.select().unwrap_err();
        assert!(matches!(err, VmXmlError::ConflictingActions { .. }));
        assert_eq!(err.to_string(), "Conflicting options --edit, --remove-device");
    }

    #[test]
    fn exactly_one_kind() {
        let err = select_kind([(kind("disk"), vec![]), (kind("network"), vec![])]).unwrap_err();
        assert_eq!(err.to_string(), "No change specified.");

        let sel = select_kind([
            (kind("disk"), vec!["path=/tmp/x.img".to_string()]),
            (kind("network"), vec![]),
        ])
        .unwrap();
        assert_eq!(sel.kind.cli_name(), "disk");
        assert_eq!(sel.values, ["path=/tmp/x.img"]);

        let err = select_kind([
            (kind("disk"), vec!["1".to_string()]),
            (kind("memory"), vec!["512".to_string()]),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Only one change operation may be specified (conflicting options ['--disk', '--memory'])"
        );
    }

    #[test]
    fn device_actions() {
        assert_eq!(Action::Edit(None).device_action(), Some(DeviceAction::Update));
        assert_eq!(Action::AddDevice.device_action(), Some(DeviceAction::Hotplug));
        assert_eq!(Action::RemoveDevice.device_action(), Some(DeviceAction::Hotunplug));
        assert_eq!(Action::BuildXml.device_action(), None);
    }
}
