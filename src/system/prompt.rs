// src/system/prompt.rs

use crate::CancellationToken;
use crate::system::executor::check_for_cancellation;
use anyhow::{Context, Result, anyhow};
use dialoguer::{Input, Password, Select, theme::ColorfulTheme};
use regex::Regex;
use std::io::IsTerminal;

/// What the resolver asks for when a required option has no value.
#[derive(Debug, Clone, Default)]
pub struct Question<'a> {
    pub option: &'a str,
    pub description: &'a str,
    pub choices: &'a [String],
    pub validation_pattern: &'a str,
    pub validation_message: &'a str,
    pub password: bool,
}

impl Question<'_> {
    pub fn text(&self) -> String {
        format!("Please enter a value for {}", self.option)
    }
}

/// Asks the user for missing values.
pub trait Prompter: Send + Sync {
    /// Whether a user can answer at all.
    fn is_interactive(&self) -> bool;

    /// Asks `question`. Fails once `cancellation_token` is set, the same
    /// flag that stops running commands.
    fn ask(
        &self,
        question: &Question<'_>,
        cancellation_token: &CancellationToken,
    ) -> Result<String>;
}

/// Prompts on the attached terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn ask(&self, question: &Question<'_>, cancellation_token: &CancellationToken) -> Result<String> {
        check_for_cancellation(cancellation_token)?;
        let answer = self.interact(question)?;
        // A Ctrl+C while the prompt was open wins over whatever was typed.
        check_for_cancellation(cancellation_token)?;
        Ok(answer)
    }
}

impl TerminalPrompter {
    fn interact(&self, question: &Question<'_>) -> Result<String> {
        let theme = ColorfulTheme::default();
        if !question.description.is_empty() {
            log::info!("{}", question.description);
        }

        if !question.choices.is_empty() {
            let selection = Select::with_theme(&theme)
                .with_prompt(question.text())
                .items(question.choices)
                .default(0)
                .interact()
                .with_context(|| format!("Failed to read a choice for {}", question.option))?;
            return question
                .choices
                .get(selection)
                .cloned()
                .ok_or_else(|| anyhow!("Invalid choice for {}", question.option));
        }

        let matcher = if question.validation_pattern.is_empty() {
            None
        } else {
            Some(Regex::new(question.validation_pattern).with_context(|| {
                format!(
                    "Invalid validation pattern '{}' for {}",
                    question.validation_pattern, question.option
                )
            })?)
        };
        let failure = if question.validation_message.is_empty() {
            format!("Has to match {}", question.validation_pattern)
        } else {
            question.validation_message.to_string()
        };
        let validate = |input: &String| -> Result<(), String> {
            match &matcher {
                Some(re) if !re.is_match(input) => Err(failure.clone()),
                _ => Ok(()),
            }
        };

        let answer = if question.password {
            Password::with_theme(&theme)
                .with_prompt(question.text())
                .validate_with(validate)
                .interact()
        } else {
            Input::<String>::with_theme(&theme)
                .with_prompt(question.text())
                .validate_with(validate)
                .interact_text()
        };
        answer.with_context(|| format!("Failed to read a value for {}", question.option))
    }
}

/// Never prompts; used for non-interactive runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn is_interactive(&self) -> bool {
        false
    }

    fn ask(&self, question: &Question<'_>, _cancellation_token: &CancellationToken) -> Result<String> {
        Err(anyhow!(
            "option {} is required, but no terminal is attached",
            question.option
        ))
    }
}
