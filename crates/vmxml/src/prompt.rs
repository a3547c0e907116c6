use std::io;

use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use tracing::debug;

use crate::error::{Result, VmXmlError};

/// Yes/no confirmation before a step that changes real state.
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Interactive prompt on the controlling terminal.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        let theme = ColorfulTheme::default();
        let answer = Confirm::with_theme(&theme)
            .with_prompt(question)
            .default(false)
            .interact()
            .map_err(prompt_error)?;
        Ok(answer)
    }
}

/// The terminal turns `^C` into an interrupted read while a prompt is open.
fn prompt_error(err: dialoguer::Error) -> VmXmlError {
    match err {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => VmXmlError::Aborted,
        other => other.into(),
    }
}

/// Answers every question with yes, for unattended runs.
#[derive(Debug, Default)]
pub struct AssumeYes;

impl Prompt for AssumeYes {
    fn confirm(&self, question: &str) -> Result<bool> {
        debug!(question, "auto-confirming");
        Ok(true)
    }
}
