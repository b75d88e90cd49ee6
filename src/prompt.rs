use anyhow::{anyhow, Result};
use dialoguer::{Confirm, Input};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Every interactive decision the orchestration needs goes through this
/// trait, so the core pipeline runs headless under test.
pub trait DecisionProvider {
    /// Free-form text entry with a pre-filled default.
    fn input_with_default(&self, prompt: &str, default: &str) -> Result<String>;

    /// Yes/no confirmation.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

/// Live-terminal implementation backed by dialoguer.
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl DecisionProvider for TerminalPrompter {
    fn input_with_default(&self, prompt: &str, default: &str) -> Result<String> {
        let value: String = Input::new()
            .with_prompt(prompt)
            .default(default.to_string())
            .allow_empty(true)
            .interact_text()?;
        Ok(value)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }
}

/// Scripted provider for tests: answers are consumed in order and running
/// out of answers is an error, never a hang.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    inputs: RefCell<VecDeque<String>>,
    confirms: RefCell<VecDeque<bool>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I, S>(self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs
            .borrow_mut()
            .extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn with_confirms<I>(self, confirms: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        self.confirms.borrow_mut().extend(confirms);
        self
    }
}

impl DecisionProvider for ScriptedPrompter {
    fn input_with_default(&self, prompt: &str, default: &str) -> Result<String> {
        match self.inputs.borrow_mut().pop_front() {
            // Empty scripted answer means "accept the default", mirroring
            // a user pressing enter.
            Some(answer) if answer.is_empty() => Ok(default.to_string()),
            Some(answer) => Ok(answer),
            None => Err(anyhow!("no scripted input left for prompt: {}", prompt)),
        }
    }

    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool> {
        self.confirms
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted confirmation left for prompt: {}", prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompter_consumes_in_order() {
        let prompter = ScriptedPrompter::new()
            .with_inputs(["alice", "", "s3://bucket/git/alice/demo.git"])
            .with_confirms([true, false]);

        assert_eq!(
            prompter.input_with_default("username", "root").unwrap(),
            "alice"
        );
        assert_eq!(prompter.input_with_default("repo", "demo").unwrap(), "demo");
        assert_eq!(
            prompter.input_with_default("url", "").unwrap(),
            "s3://bucket/git/alice/demo.git"
        );
        assert!(prompter.confirm("create?", false).unwrap());
        assert!(!prompter.confirm("again?", false).unwrap());
    }

    #[test]
    fn test_scripted_prompter_exhaustion_is_an_error() {
        let prompter = ScriptedPrompter::new();
        assert!(prompter.input_with_default("anything", "").is_err());
        assert!(prompter.confirm("anything", true).is_err());
    }
}
