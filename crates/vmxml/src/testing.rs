//! Doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::prompt::Prompt;
use crate::storage::{StorageBuilder, StorageRequest};

/// Storage builder that only counts how often it ran.
#[derive(Debug, Default)]
pub(crate) struct CountingStorage {
    calls: AtomicUsize,
    requests: Mutex<Vec<StorageRequest>>,
}

impl CountingStorage {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<StorageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl StorageBuilder for CountingStorage {
    async fn create(&self, request: &StorageRequest) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Prompt that replays canned answers and remembers every question.
///
/// Once the answers run out every further question is answered yes.
#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub(crate) fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            questions: Mutex::default(),
        }
    }

    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(true))
    }
}
