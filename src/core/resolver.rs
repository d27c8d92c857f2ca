// src/core/resolver.rs

//! Resolves option values in dependency order.
//!
//! A [`Resolver`] is configured once and can run any number of independent
//! passes. Every call to [`Resolver::resolve`] builds its own graph from the
//! given definitions, walks it with [`Graph::next_from_top`] and returns the
//! resolved values together with the sub-option definitions that are
//! currently attached.
//!
//! [`Graph::next_from_top`]: crate::core::graph::Graph::next_from_top

use crate::CancellationToken;
use crate::core::dependencies::{DependencySource, OptionGraph, build_graph};
use crate::core::graph::GraphError;
use crate::core::validation::{DurationError, ValidationError, parse_duration, validate_value};
use crate::core::variables::resolve_default_value;
use crate::models::{OptionDefinition, OptionDefinitions, OptionValue, OptionValues};
use crate::system::executor::{ExecutionError, ShellRunner, SystemShell, check_for_cancellation};
use crate::system::prompt::{Prompter, Question, TerminalPrompter};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(
        "global option '{dependent}' cannot use non-global option '{dependency}' (referenced in its {via})"
    )]
    GlobalDependsOnNonGlobal {
        dependent: String,
        dependency: String,
        via: DependencySource,
    },
    #[error(
        "non-local option '{dependent}' cannot use local option '{dependency}' (referenced in its {via})"
    )]
    NonLocalDependsOnLocal {
        dependent: String,
        dependency: String,
        via: DependencySource,
    },
    #[error(transparent)]
    InvalidValue(#[from] ValidationError),
    #[error("parse cache duration of option '{option}': {source}")]
    InvalidCache {
        option: String,
        #[source]
        source: DurationError,
    },
    #[error("run {what} of option '{option}': {source}")]
    Command {
        option: String,
        what: &'static str,
        #[source]
        source: ExecutionError,
    },
    #[error("parse subOptionsCommand output of option '{option}': {source}: {output}")]
    SubOptionsParse {
        option: String,
        output: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("option {option} is required, but no value provided")]
    RequiredMissing { option: String },
    #[error("could not ask for a value of option '{option}': {message}")]
    Prompt { option: String, message: String },
    #[error("Operation was cancelled by the user while resolving option '{option}'.")]
    Cancelled { option: String },
}

/// Computes option values from definitions, previous values and user input.
pub struct Resolver {
    user_options: BTreeMap<String, String>,
    extra_values: BTreeMap<String, String>,
    resolve_local: bool,
    resolve_global: bool,
    skip_required: bool,
    resolve_sub_options: bool,
    runner: Box<dyn ShellRunner>,
    prompter: Box<dyn Prompter>,
}

impl Resolver {
    /// `user_options` are overrides that always win and are marked as user
    /// provided. `extra_values` are visible to templates and commands but
    /// never part of the result.
    pub fn new(
        user_options: BTreeMap<String, String>,
        extra_values: BTreeMap<String, String>,
    ) -> Self {
        Self {
            user_options,
            extra_values,
            resolve_local: false,
            resolve_global: false,
            skip_required: false,
            resolve_sub_options: false,
            runner: Box::new(SystemShell::default()),
            prompter: Box::new(TerminalPrompter),
        }
    }

    /// Resolve non-required options marked `local`.
    pub fn with_resolve_local(mut self, enabled: bool) -> Self {
        self.resolve_local = enabled;
        self
    }

    /// Resolve non-required options marked `global`.
    pub fn with_resolve_global(mut self, enabled: bool) -> Self {
        self.resolve_global = enabled;
        self
    }

    /// Leave required options without a value (and everything depending on
    /// them) unresolved instead of prompting.
    pub fn with_skip_required(mut self, enabled: bool) -> Self {
        self.skip_required = enabled;
        self
    }

    /// Run `subOptionsCommand`s and attach the options they print.
    pub fn with_resolve_sub_options(mut self, enabled: bool) -> Self {
        self.resolve_sub_options = enabled;
        self
    }

    pub fn with_runner(mut self, runner: impl ShellRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    /// Resolves every option of `static_definitions` and of the previously
    /// discovered `dynamic_definitions`, starting from `previous` values.
    ///
    /// Returns the resolved values and the definitions of all sub-options
    /// that are attached after this pass. Static definitions win over
    /// dynamic ones with the same name.
    pub fn resolve(
        &self,
        cancellation_token: &CancellationToken,
        dynamic_definitions: &OptionDefinitions,
        static_definitions: &OptionDefinitions,
        previous: &OptionValues,
    ) -> Result<(OptionValues, OptionDefinitions), ResolveError> {
        let mut definitions = dynamic_definitions.clone();
        definitions.extend(
            static_definitions
                .iter()
                .map(|(name, definition)| (name.clone(), definition.clone())),
        );

        let graph = build_graph(&definitions, previous)?;
        log::debug!("Resolution order: {:?}", graph.resolution_order());

        let mut pass = ResolvePass {
            resolver: self,
            cancellation_token,
            static_definitions,
            graph,
            values: previous.clone(),
            used_overrides: BTreeSet::new(),
        };
        pass.run()?;
        Ok(pass.finish())
    }
}

/// State of a single resolution pass. The graph changes while it is walked
/// when sub-options are attached or dropped.
pub(crate) struct ResolvePass<'a> {
    pub(crate) resolver: &'a Resolver,
    pub(crate) cancellation_token: &'a CancellationToken,
    pub(crate) static_definitions: &'a OptionDefinitions,
    pub(crate) graph: OptionGraph,
    pub(crate) values: OptionValues,
    used_overrides: BTreeSet<String>,
}

impl ResolvePass<'_> {
    fn run(&mut self) -> Result<(), ResolveError> {
        while let Some(name) = self.graph.next_from_top() {
            check_for_cancellation(self.cancellation_token).map_err(|_| ResolveError::Cancelled {
                option: name.clone(),
            })?;
            self.resolve_option(&name)?;
            if self.resolver.resolve_sub_options {
                self.refresh_sub_options(&name)?;
            }
        }
        Ok(())
    }

    fn resolve_option(&mut self, name: &str) -> Result<(), ResolveError> {
        let Some(definition) = self.graph.get(name).map(|node| node.data.clone()) else {
            return Ok(());
        };

        let user_value = self.resolver.user_options.get(name).cloned();
        if let Some(user_value) = &user_value {
            self.used_overrides.insert(name.to_string());
            validate_value(name, user_value, &definition)?;
        }
        let before = self.previous_value(name, &definition);

        if user_value.is_none() {
            if let Some(before) = &before
                && self.keeps_previous(name, &definition, before)?
            {
                log::debug!("Keeping previous value of {}", name);
                return Ok(());
            }

            if !definition.required {
                if definition.global && !self.resolver.resolve_global {
                    log::debug!("Skipping global option {}", name);
                    return Ok(());
                }
                if definition.local && !self.resolver.resolve_local {
                    log::debug!("Skipping local option {}", name);
                    return Ok(());
                }
            }
        }

        let (before_value, children) = before
            .map(|before| (before.value, before.children))
            .unwrap_or_default();

        let mut value = match user_value {
            Some(user_value) => OptionValue::user_provided(user_value),
            None => self.compute_value(name, &definition)?,
        };
        value.children = children;

        if !value.user_provided && definition.required && value.value.is_empty() {
            if self.resolver.skip_required {
                log::debug!("Skipping required option {} without a value", name);
                self.values.remove(name);
                return self.drop_dependents(name);
            }
            let answer = self.ask(name, &definition)?;
            value = OptionValue {
                children: value.children,
                ..OptionValue::user_provided(answer)
            };
        }

        let changed = before_value != value.value;
        self.values.insert(name.to_string(), value);
        if changed {
            self.invalidate_dependents(name);
        }
        Ok(())
    }

    /// The carried-over value, unless it no longer validates or has expired.
    fn previous_value(&mut self, name: &str, definition: &OptionDefinition) -> Option<OptionValue> {
        let before = self.values.get(name)?;
        let expired = before.expires.is_some_and(|expires| expires <= Utc::now());
        if expired || validate_value(name, &before.value, definition).is_err() {
            log::debug!("Discarding stale value of {}", name);
            self.values.remove(name);
            return None;
        }
        Some(before.clone())
    }

    fn keeps_previous(
        &self,
        name: &str,
        definition: &OptionDefinition,
        before: &OptionValue,
    ) -> Result<bool, ResolveError> {
        if before.user_provided || definition.cache.is_empty() {
            return Ok(true);
        }
        let ttl = parse_duration(&definition.cache).map_err(|source| ResolveError::InvalidCache {
            option: name.to_string(),
            source,
        })?;
        let now = Utc::now();
        Ok(before
            .filled
            .and_then(|filled| filled.checked_add_signed(ttl))
            .is_some_and(|valid_until| valid_until > now))
    }

    fn compute_value(
        &self,
        name: &str,
        definition: &OptionDefinition,
    ) -> Result<OptionValue, ResolveError> {
        if !definition.default.is_empty() {
            return Ok(OptionValue::new(resolve_default_value(
                &definition.default,
                &self.variables(),
            )));
        }

        if !definition.command.is_empty() {
            let output = self.run_command(name, "command", &definition.command)?;
            return Ok(OptionValue {
                value: output.trim().to_string(),
                filled: Some(Utc::now()),
                ..Default::default()
            });
        }

        match definition.enum_values.as_slice() {
            [only] => Ok(OptionValue::new(only.clone())),
            _ => Ok(OptionValue::default()),
        }
    }

    fn ask(&self, name: &str, definition: &OptionDefinition) -> Result<String, ResolveError> {
        let prompter = &self.resolver.prompter;
        if !prompter.is_interactive() {
            return Err(ResolveError::RequiredMissing {
                option: name.to_string(),
            });
        }

        let question = Question {
            option: name,
            description: &definition.description,
            choices: &definition.enum_values,
            validation_pattern: &definition.validation_pattern,
            validation_message: &definition.validation_message,
            password: definition.password,
        };
        let cancelled = || ResolveError::Cancelled {
            option: name.to_string(),
        };
        check_for_cancellation(self.cancellation_token).map_err(|_| cancelled())?;
        let answer = prompter
            .ask(&question, self.cancellation_token)
            .map_err(|e| match check_for_cancellation(self.cancellation_token) {
                Err(_) => cancelled(),
                Ok(()) => ResolveError::Prompt {
                    option: name.to_string(),
                    message: format!("{:#}", e),
                },
            })?;
        validate_value(name, &answer, definition)?;
        Ok(answer)
    }

    /// Extra values overlaid with everything resolved so far.
    pub(crate) fn variables(&self) -> BTreeMap<String, String> {
        let mut variables = self.resolver.extra_values.clone();
        variables.extend(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.value.clone())),
        );
        variables
    }

    pub(crate) fn run_command(
        &self,
        name: &str,
        what: &'static str,
        script: &str,
    ) -> Result<String, ResolveError> {
        self.resolver
            .runner
            .run(script, &self.variables(), self.cancellation_token)
            .map(|output| output.stdout)
            .map_err(|source| match source {
                ExecutionError::Cancelled => ResolveError::Cancelled {
                    option: name.to_string(),
                },
                source => ResolveError::Command {
                    option: name.to_string(),
                    what,
                    source,
                },
            })
    }

    /// Forces direct dependents to recompute on their own turn.
    fn invalidate_dependents(&mut self, name: &str) {
        let Some(node) = self.graph.get(name) else {
            return;
        };
        for child in &node.children {
            if self.values.get(child).is_some_and(|value| !value.user_provided) {
                log::debug!("Invalidating {} because {} changed", child, name);
                self.values.remove(child);
            }
        }
    }

    /// Removes everything depending on `name` from this pass, user-provided
    /// values included.
    fn drop_dependents(&mut self, name: &str) -> Result<(), ResolveError> {
        let children = self
            .graph
            .get(name)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in children {
            for id in self.graph.remove_sub_graph(&child)? {
                log::debug!("Dropping {} because {} has no value", id, name);
                self.values.remove(&id);
            }
        }
        Ok(())
    }

    /// Drops the computed values of options that left the graph.
    pub(crate) fn forget(&mut self, removed: &[String]) {
        for id in removed {
            if self.values.get(id).is_some_and(|value| !value.user_provided) {
                self.values.remove(id);
            }
        }
    }

    /// Keeps the values of static options and of sub-options reachable from
    /// them, and collects the definitions of every attached sub-option.
    fn finish(mut self) -> (OptionValues, OptionDefinitions) {
        let mut kept = BTreeSet::new();
        let mut dynamic_definitions = OptionDefinitions::new();
        let mut pending: Vec<String> = self
            .static_definitions
            .keys()
            .filter(|name| self.values.contains_key(*name))
            .cloned()
            .collect();

        while let Some(name) = pending.pop() {
            if !kept.insert(name.clone()) {
                continue;
            }
            let Some(value) = self.values.get(&name) else {
                continue;
            };
            for child in &value.children {
                if self.static_definitions.contains_key(child) {
                    continue;
                }
                if let Some(node) = self.graph.get(child) {
                    dynamic_definitions.insert(child.clone(), node.data.clone());
                }
                if self.values.contains_key(child) {
                    pending.push(child.clone());
                }
            }
        }

        self.values.retain(|name, _| kept.contains(name));

        for name in self.resolver.user_options.keys() {
            if !self.used_overrides.contains(name) {
                log::warn!("Option {} was provided but is not used", name);
            }
        }

        (self.values, dynamic_definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubOptions;
    use crate::system::executor::CapturedOutput;
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn definitions(entries: Vec<(&str, OptionDefinition)>) -> OptionDefinitions {
        entries
            .into_iter()
            .map(|(name, definition)| (name.to_string(), definition))
            .collect()
    }

    fn with_default(default: &str) -> OptionDefinition {
        OptionDefinition {
            default: default.to_string(),
            ..Default::default()
        }
    }

    fn with_command(command: &str) -> OptionDefinition {
        OptionDefinition {
            command: command.to_string(),
            ..Default::default()
        }
    }

    fn required() -> OptionDefinition {
        OptionDefinition {
            required: true,
            ..Default::default()
        }
    }

    /// A script printing `options` as a sub-options document.
    fn sub_command(options: OptionDefinitions) -> String {
        let json = serde_json::to_string(&SubOptions { options }).unwrap();
        format!("cat <<'EOF'\n{json}\nEOF")
    }

    fn with_sub_options(default: &str, options: OptionDefinitions) -> OptionDefinition {
        OptionDefinition {
            sub_options_command: sub_command(options),
            ..with_default(default)
        }
    }

    fn plain(values: &OptionValues) -> BTreeMap<String, String> {
        values
            .iter()
            .map(|(name, value)| (name.clone(), value.value.clone()))
            .collect()
    }

    fn resolver() -> Resolver {
        Resolver::new(BTreeMap::new(), BTreeMap::new())
            .with_resolve_local(true)
            .with_resolve_sub_options(true)
    }

    /// Runs scripts by looking them up in a table and records every call.
    #[derive(Default)]
    struct FakeRunner {
        outputs: BTreeMap<String, String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ShellRunner for FakeRunner {
        fn run(
            &self,
            script: &str,
            _env: &BTreeMap<String, String>,
            cancellation_token: &CancellationToken,
        ) -> Result<CapturedOutput, ExecutionError> {
            check_for_cancellation(cancellation_token)?;
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(script.to_string());
            }
            match self.outputs.get(script) {
                Some(stdout) => Ok(CapturedOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                }),
                None => Err(ExecutionError::NonZeroExitStatus {
                    status: "exit status: 1".to_string(),
                    output: format!("{script}: not found"),
                }),
            }
        }
    }

    struct FixedAnswer {
        answer: String,
        asked: Arc<Mutex<Vec<String>>>,
    }

    impl Prompter for FixedAnswer {
        fn is_interactive(&self) -> bool {
            true
        }

        fn ask(
            &self,
            question: &Question<'_>,
            _cancellation_token: &CancellationToken,
        ) -> anyhow::Result<String> {
            if let Ok(mut asked) = self.asked.lock() {
                asked.push(question.option.to_string());
            }
            Ok(self.answer.clone())
        }
    }

    struct NoTerminal;

    impl Prompter for NoTerminal {
        fn is_interactive(&self) -> bool {
            false
        }

        fn ask(
            &self,
            _question: &Question<'_>,
            _cancellation_token: &CancellationToken,
        ) -> anyhow::Result<String> {
            anyhow::bail!("no terminal")
        }
    }

    /// Behaves like a user pressing Ctrl+C while the prompt is open.
    struct Interrupted;

    impl Prompter for Interrupted {
        fn is_interactive(&self) -> bool {
            true
        }

        fn ask(
            &self,
            _question: &Question<'_>,
            cancellation_token: &CancellationToken,
        ) -> anyhow::Result<String> {
            cancellation_token.store(true, Ordering::SeqCst);
            anyhow::bail!("read interrupted")
        }
    }

    #[cfg(unix)]
    mod shell {
        use super::*;

        #[test]
        fn test_default_uses_extra_values() {
            let resolver = Resolver::new(BTreeMap::new(), map(&[("WORKSPACE_ID", "test")]));
            let defs = definitions(vec![("TEST", with_default("${WORKSPACE_ID}-test"))]);

            let (values, dynamic) = resolver
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(plain(&values), map(&[("TEST", "test-test")]));
            assert!(dynamic.is_empty());
        }

        #[test]
        fn test_dependency_on_command() {
            let resolver = Resolver::new(BTreeMap::new(), map(&[("WORKSPACE_ID", "test")]));
            let defs = definitions(vec![
                ("TEST", with_default("${WORKSPACE_ID}-test-${COMMAND}-$COMMAND")),
                ("COMMAND", with_command("echo bar")),
            ]);

            let (values, _) = resolver
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("TEST", "test-test-bar-bar"), ("COMMAND", "bar")])
            );
            assert!(values["COMMAND"].filled.is_some());
            assert!(values["TEST"].filled.is_none());
        }

        #[test]
        fn test_commands_see_resolved_values() {
            let defs = definitions(vec![
                ("COMMAND1", with_command("echo ${COMMAND2}-test")),
                ("COMMAND2", with_command("echo bar")),
            ]);

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("COMMAND1", "bar-test"), ("COMMAND2", "bar")])
            );
        }

        #[test]
        fn test_cycle_aborts_resolution() {
            let defs = definitions(vec![
                ("COMMAND1", with_command("echo ${COMMAND2}")),
                ("COMMAND2", with_command("echo ${COMMAND1}")),
            ]);

            let err = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap_err();
            assert!(matches!(err, ResolveError::Graph(GraphError::Cyclic(_))));
        }

        #[test]
        fn test_user_provided_previous_value_is_kept() {
            let previous = OptionValues::from([(
                "COMMAND".to_string(),
                OptionValue::user_provided("foo"),
            )]);
            let defs = definitions(vec![
                ("COMMAND", with_command("echo bar")),
                ("COMMAND1", with_command("echo ${COMMAND}-foo-${UNDEFINED}")),
                ("DEFAULT1", with_default("${COMMAND}-foo-${UNDEFINED}")),
            ]);

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
                .unwrap();

            // The shell expands unknown variables, templates keep them.
            assert_eq!(
                plain(&values),
                map(&[
                    ("COMMAND", "foo"),
                    ("COMMAND1", "foo-foo-"),
                    ("DEFAULT1", "foo-foo-${UNDEFINED}"),
                ])
            );
        }

        #[test]
        fn test_cached_command_values_expire() {
            let now = Utc::now();
            let previous = OptionValues::from([
                (
                    "EXPIRE".to_string(),
                    OptionValue {
                        filled: Some(now - TimeDelta::hours(2)),
                        ..OptionValue::new("foo")
                    },
                ),
                (
                    "NOTEXPIRE".to_string(),
                    OptionValue {
                        filled: Some(now),
                        ..OptionValue::new("foo")
                    },
                ),
            ]);
            let cached = OptionDefinition {
                cache: "10m".to_string(),
                ..with_command("echo bar")
            };
            let defs = definitions(vec![("EXPIRE", cached.clone()), ("NOTEXPIRE", cached)]);

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("EXPIRE", "bar"), ("NOTEXPIRE", "foo")])
            );
            assert!(values["EXPIRE"].filled.unwrap() >= now);
        }

        #[test]
        fn test_self_reference_is_not_a_dependency() {
            let defs = definitions(vec![("SELF", with_command("SELF=test; echo ${SELF}"))]);

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();
            assert_eq!(plain(&values), map(&[("SELF", "test")]));
        }

        #[test]
        fn test_changed_parent_recomputes_children() {
            let resolver = Resolver::new(map(&[("PARENT", "foo")]), BTreeMap::new());
            let previous = OptionValues::from([
                ("PARENT".to_string(), OptionValue::user_provided("test")),
                ("CHILD1".to_string(), OptionValue::new("test-child1")),
                ("CHILD2".to_string(), OptionValue::new("test-child2")),
            ]);
            let defs = definitions(vec![
                ("PARENT", OptionDefinition::default()),
                ("CHILD1", with_command("echo ${PARENT}-child1")),
                ("CHILD2", with_default("${PARENT}-child2")),
            ]);

            let (values, _) = resolver
                .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[
                    ("PARENT", "foo"),
                    ("CHILD1", "foo-child1"),
                    ("CHILD2", "foo-child2"),
                ])
            );
            assert!(values["PARENT"].user_provided);
        }

        #[test]
        fn test_staged_resolution_skips_local_options() {
            let defs = definitions(vec![
                ("PARENT", with_default("test")),
                (
                    "CHILD1",
                    OptionDefinition {
                        local: true,
                        ..with_default("${PARENT}")
                    },
                ),
            ]);

            let staged = Resolver::new(BTreeMap::new(), BTreeMap::new());
            let (values, _) = staged
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();
            assert_eq!(plain(&values), map(&[("PARENT", "test")]));

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();
            assert_eq!(plain(&values), map(&[("PARENT", "test"), ("CHILD1", "test")]));
        }

        #[test]
        fn test_staged_resolution_skips_global_options() {
            let defs = definitions(vec![(
                "GLOBAL",
                OptionDefinition {
                    global: true,
                    ..with_default("shared")
                },
            )]);

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();
            assert!(values.is_empty());

            let (values, _) = resolver()
                .with_resolve_global(true)
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();
            assert_eq!(plain(&values), map(&[("GLOBAL", "shared")]));
        }

        #[test]
        fn test_skip_required_drops_dependents() {
            let defs = definitions(vec![
                ("PARENT", required()),
                ("CHILD1", with_default("${PARENT}")),
                (
                    "PARENT2",
                    OptionDefinition {
                        required: true,
                        ..with_default("test")
                    },
                ),
                ("CHILD2", with_default("${PARENT2}")),
            ]);

            let (values, _) = resolver()
                .with_skip_required(true)
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("PARENT2", "test"), ("CHILD2", "test")])
            );
        }

        #[test]
        fn test_skip_required_drops_user_provided_dependents() {
            let defs = definitions(vec![
                ("C", required()),
                ("D", with_default("${C}-d")),
                ("E", with_default("e")),
            ]);
            let previous = OptionValues::from([(
                "D".to_string(),
                OptionValue::user_provided("mine"),
            )]);

            let (values, _) = resolver()
                .with_skip_required(true)
                .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
                .unwrap();

            assert_eq!(plain(&values), map(&[("E", "e")]));
        }

        #[test]
        fn test_sub_options_are_attached() {
            let defs = definitions(vec![
                (
                    "TEST",
                    with_sub_options(
                        "test",
                        definitions(vec![("TEST2", with_default("test2"))]),
                    ),
                ),
                ("FOO", with_command("echo bar")),
            ]);

            let (values, dynamic) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("TEST", "test"), ("TEST2", "test2"), ("FOO", "bar")])
            );
            assert_eq!(values["TEST"].children, vec!["TEST2"]);
            assert_eq!(dynamic, definitions(vec![("TEST2", with_default("test2"))]));
        }

        #[test]
        fn test_user_provided_sub_option_survives_refresh() {
            let defs = definitions(vec![
                (
                    "TEST",
                    with_sub_options(
                        "test",
                        definitions(vec![("TEST2", with_default("test2"))]),
                    ),
                ),
                ("FOO", with_command("echo bar")),
            ]);
            let stored = definitions(vec![("TEST2", with_default("test5"))]);
            let previous = OptionValues::from([
                (
                    "TEST".to_string(),
                    OptionValue {
                        children: vec!["TEST2".to_string()],
                        ..OptionValue::user_provided("test3")
                    },
                ),
                ("TEST2".to_string(), OptionValue::user_provided("test4")),
            ]);

            let (values, dynamic) = resolver()
                .resolve(&token(), &stored, &defs, &previous)
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("TEST", "test3"), ("TEST2", "test4"), ("FOO", "bar")])
            );
            assert_eq!(dynamic, definitions(vec![("TEST2", with_default("test2"))]));
        }

        #[test]
        fn test_changed_parent_replaces_sub_options() {
            let resolver = Resolver {
                user_options: map(&[("TEST", "test1")]),
                ..resolver()
            };
            let defs = definitions(vec![
                (
                    "TEST",
                    with_sub_options(
                        "test",
                        definitions(vec![("TEST3", with_default("test2"))]),
                    ),
                ),
                ("FOO", with_command("echo bar")),
            ]);
            let stored = definitions(vec![("TEST2", with_default("test5"))]);
            let previous = OptionValues::from([
                (
                    "TEST".to_string(),
                    OptionValue {
                        children: vec!["TEST2".to_string()],
                        ..OptionValue::new("test3")
                    },
                ),
                ("TEST2".to_string(), OptionValue::new("test4")),
            ]);

            let (values, dynamic) = resolver
                .resolve(&token(), &stored, &defs, &previous)
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("TEST", "test1"), ("TEST3", "test2"), ("FOO", "bar")])
            );
            assert_eq!(values["TEST"].children, vec!["TEST3"]);
            assert_eq!(dynamic, definitions(vec![("TEST3", with_default("test2"))]));
        }

        fn nested(test4_default: &str, test2: OptionDefinition) -> OptionDefinitions {
            let test3 = with_sub_options(
                "test3",
                definitions(vec![("TEST4", with_default(test4_default))]),
            );
            let test2 = OptionDefinition {
                sub_options_command: sub_command(definitions(vec![("TEST3", test3)])),
                ..test2
            };
            definitions(vec![
                (
                    "TEST",
                    with_sub_options("test1", definitions(vec![("TEST2", test2)])),
                ),
                ("FOO", with_command("echo bar")),
            ])
        }

        #[test]
        fn test_nested_sub_options() {
            let defs = nested("${TEST3}-${FOO}-4", with_default("test2"));

            let (values, dynamic) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[
                    ("TEST", "test1"),
                    ("TEST2", "test2"),
                    ("TEST3", "test3"),
                    ("TEST4", "test3-bar-4"),
                    ("FOO", "bar"),
                ])
            );
            assert_eq!(
                dynamic.keys().collect::<Vec<_>>(),
                vec!["TEST2", "TEST3", "TEST4"]
            );
            assert_eq!(dynamic["TEST4"], with_default("${TEST3}-${FOO}-4"));
        }

        #[test]
        fn test_nested_sub_options_skip_required() {
            let defs = nested("${TEST3}-${FOO}-4", required());

            let (values, dynamic) = resolver()
                .with_skip_required(true)
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(plain(&values), map(&[("TEST", "test1"), ("FOO", "bar")]));
            // The required sub-option stays attached so it can be filled later.
            assert_eq!(dynamic.keys().collect::<Vec<_>>(), vec!["TEST2"]);
            assert!(dynamic["TEST2"].required);
        }

        #[test]
        fn test_nested_sub_options_use_user_value() {
            let resolver = Resolver {
                user_options: map(&[("TEST2", "test2")]),
                ..resolver().with_skip_required(true)
            };
            let defs = nested("${TEST2}-${FOO}-4", required());

            let (values, dynamic) = resolver
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[
                    ("TEST", "test1"),
                    ("TEST2", "test2"),
                    ("TEST3", "test3"),
                    ("TEST4", "test2-bar-4"),
                    ("FOO", "bar"),
                ])
            );
            assert_eq!(dynamic.len(), 3);
        }

        #[test]
        fn test_unused_values_are_pruned() {
            let defs = definitions(vec![
                (
                    "TEST",
                    with_sub_options(
                        "test1",
                        definitions(vec![("TEST2", with_default("test2"))]),
                    ),
                ),
                ("FOO", with_command("echo bar")),
            ]);
            let stored = definitions(vec![("TEST5", with_default("test2"))]);
            let previous =
                OptionValues::from([("TEST5".to_string(), OptionValue::new("test5"))]);

            let (values, dynamic) = resolver()
                .resolve(&token(), &stored, &defs, &previous)
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("TEST", "test1"), ("TEST2", "test2"), ("FOO", "bar")])
            );
            assert_eq!(dynamic, definitions(vec![("TEST2", with_default("test2"))]));
        }

        #[test]
        fn test_changed_sub_option_default_recomputes() {
            let defs = definitions(vec![
                (
                    "TEST",
                    with_sub_options(
                        "test1",
                        definitions(vec![("TEST2", with_default("test3"))]),
                    ),
                ),
                ("FOO", with_command("echo bar")),
            ]);
            let stored = definitions(vec![("TEST2", with_default("test2"))]);
            let previous = OptionValues::from([
                ("TEST".to_string(), OptionValue::new("test1")),
                ("TEST2".to_string(), OptionValue::new("test2")),
            ]);

            let (values, dynamic) = resolver()
                .resolve(&token(), &stored, &defs, &previous)
                .unwrap();

            assert_eq!(
                plain(&values),
                map(&[("TEST", "test1"), ("TEST2", "test3"), ("FOO", "bar")])
            );
            assert_eq!(dynamic, definitions(vec![("TEST2", with_default("test3"))]));
        }

        #[test]
        fn test_static_option_waits_for_sub_option() {
            let defs = definitions(vec![
                (
                    "A_PARENT",
                    with_sub_options(
                        "parent",
                        definitions(vec![("Z_SUB", with_default("sub"))]),
                    ),
                ),
                ("B_USER", with_default("${Z_SUB}-user")),
            ]);

            let (values, _) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();

            assert_eq!(values["B_USER"].value, "sub-user");
        }

        #[test]
        fn test_static_option_sorted_before_parent_waits_for_sub_option() {
            // --- Setup ---
            let defs = definitions(vec![
                ("A_USER", with_default("${Z_SUB}-user")),
                (
                    "B_PARENT",
                    with_sub_options(
                        "parent",
                        definitions(vec![("Z_SUB", with_default("sub"))]),
                    ),
                ),
            ]);

            // --- Execute ---
            let (first, dynamic) = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap();
            let (second, _) = resolver()
                .resolve(&token(), &dynamic, &defs, &first)
                .unwrap();

            // --- Assert ---
            assert_eq!(first["A_USER"].value, "sub-user");
            assert_eq!(first["Z_SUB"].value, "sub");
            assert_eq!(second["A_USER"].value, "sub-user");
        }

        #[test]
        fn test_failing_command_reports_output() {
            let defs = definitions(vec![("BROKEN", with_command("echo oops >&2; exit 2"))]);

            let err = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap_err();

            match &err {
                ResolveError::Command { option, source, .. } => {
                    assert_eq!(option, "BROKEN");
                    assert!(source.output().contains("oops"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn test_invalid_sub_options_output() {
            let defs = definitions(vec![(
                "TEST",
                OptionDefinition {
                    sub_options_command: "echo not-json".to_string(),
                    ..with_default("x")
                },
            )]);

            let err = resolver()
                .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
                .unwrap_err();
            assert!(matches!(err, ResolveError::SubOptionsParse { .. }));
            assert!(err.to_string().contains("not-json"));
        }
    }

    #[test]
    fn test_scope_violations_abort() {
        let global_child = definitions(vec![
            ("PARENT", with_default("test")),
            (
                "CHILD1",
                OptionDefinition {
                    global: true,
                    ..with_default("${PARENT}")
                },
            ),
        ]);
        let local_parent = definitions(vec![
            (
                "PARENT",
                OptionDefinition {
                    local: true,
                    ..with_default("test")
                },
            ),
            ("CHILD1", with_default("${PARENT}")),
        ]);

        for defs in [global_child, local_parent] {
            let result =
                resolver().resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new());
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_invalid_override_is_fatal() {
        let resolver = Resolver::new(map(&[("SIZE", "huge")]), BTreeMap::new());
        let defs = definitions(vec![(
            "SIZE",
            OptionDefinition {
                enum_values: vec!["small".to_string(), "large".to_string()],
                ..Default::default()
            },
        )]);

        let err = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidValue(ValidationError::NotInEnum { .. })
        ));
    }

    #[test]
    fn test_custom_validation_message_names_the_option() {
        let resolver = Resolver::new(map(&[("NAME", "ABC")]), BTreeMap::new());
        let defs = definitions(vec![(
            "NAME",
            OptionDefinition {
                validation_pattern: "^[a-z]+$".to_string(),
                validation_message: "only lowercase letters".to_string(),
                ..Default::default()
            },
        )]);

        let err = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for option 'NAME': only lowercase letters"
        );
    }

    #[test]
    fn test_invalid_history_is_recomputed() {
        let defs = definitions(vec![(
            "PORT",
            OptionDefinition {
                value_type: Some(crate::models::OptionType::Number),
                ..with_default("8080")
            },
        )]);
        let previous = OptionValues::from([(
            "PORT".to_string(),
            OptionValue::user_provided("eighty"),
        )]);

        let (values, _) = resolver()
            .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
            .unwrap();
        assert_eq!(values["PORT"], OptionValue::new("8080"));
    }

    #[test]
    fn test_expired_history_is_recomputed() {
        let defs = definitions(vec![("TOKEN", with_default("fresh"))]);
        let previous = OptionValues::from([(
            "TOKEN".to_string(),
            OptionValue {
                expires: Some(Utc::now() - TimeDelta::minutes(1)),
                ..OptionValue::new("stale")
            },
        )]);

        let (values, _) = resolver()
            .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
            .unwrap();
        assert_eq!(values["TOKEN"].value, "fresh");
    }

    #[test]
    fn test_single_enum_member_is_adopted() {
        let defs = definitions(vec![(
            "ARCH",
            OptionDefinition {
                enum_values: vec!["amd64".to_string()],
                ..Default::default()
            },
        )]);

        let (values, _) = resolver()
            .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
            .unwrap();
        assert_eq!(values["ARCH"].value, "amd64");
    }

    #[test]
    fn test_cache_window() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = FakeRunner {
            outputs: BTreeMap::from([("fetch".to_string(), "new\n".to_string())]),
            calls: Arc::clone(&calls),
        };
        let resolver = resolver().with_runner(runner);
        let defs = definitions(vec![(
            "ZONE",
            OptionDefinition {
                cache: "1h".to_string(),
                ..with_command("fetch")
            },
        )]);
        let filled_at = |ago: TimeDelta| {
            OptionValues::from([(
                "ZONE".to_string(),
                OptionValue {
                    filled: Some(Utc::now() - ago),
                    ..OptionValue::new("old")
                },
            )])
        };

        let (values, _) = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &filled_at(TimeDelta::minutes(30)))
            .unwrap();
        assert_eq!(values["ZONE"].value, "old");
        assert!(calls.lock().unwrap().is_empty());

        let (values, _) = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &filled_at(TimeDelta::hours(2)))
            .unwrap();
        assert_eq!(values["ZONE"].value, "new");
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_cache_duration() {
        let resolver = resolver().with_runner(FakeRunner::default());
        let defs = definitions(vec![(
            "ZONE",
            OptionDefinition {
                cache: "soon".to_string(),
                ..with_command("fetch")
            },
        )]);
        let previous = OptionValues::from([("ZONE".to_string(), OptionValue::new("old"))]);

        let err = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &previous)
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidCache { .. }));
    }

    #[test]
    fn test_required_option_is_prompted() {
        let asked = Arc::new(Mutex::new(Vec::new()));
        let resolver = resolver().with_prompter(FixedAnswer {
            answer: "secret".to_string(),
            asked: Arc::clone(&asked),
        });
        let defs = definitions(vec![
            (
                "PASSWORD",
                OptionDefinition {
                    password: true,
                    ..required()
                },
            ),
            ("LOGIN", with_default("user:${PASSWORD}")),
        ]);

        let (values, _) = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
            .unwrap();

        assert_eq!(*asked.lock().unwrap(), vec!["PASSWORD"]);
        assert!(values["PASSWORD"].user_provided);
        assert_eq!(values["LOGIN"].value, "user:secret");
    }

    #[test]
    fn test_prompt_answer_is_validated() {
        let resolver = resolver().with_prompter(FixedAnswer {
            answer: "UPPER".to_string(),
            asked: Arc::default(),
        });
        let defs = definitions(vec![(
            "NAME",
            OptionDefinition {
                validation_pattern: "^[a-z]+$".to_string(),
                ..required()
            },
        )]);

        let result =
            resolver.resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new());
        assert!(matches!(result, Err(ResolveError::InvalidValue(_))));
    }

    #[test]
    fn test_required_without_terminal_fails() {
        let resolver = resolver().with_prompter(NoTerminal);
        let defs = definitions(vec![("REGION", required())]);

        let err = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "option REGION is required, but no value provided"
        );
    }

    #[test]
    fn test_cancelled_pass_stops() {
        let token = token();
        token.store(true, Ordering::SeqCst);
        let resolver = resolver().with_runner(FakeRunner::default());
        let defs = definitions(vec![("ZONE", with_command("fetch"))]);

        let result = resolver.resolve(&token, &OptionDefinitions::new(), &defs, &OptionValues::new());
        match result {
            Err(ResolveError::Cancelled { option }) => assert_eq!(option, "ZONE"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn test_interrupted_prompt_is_a_cancellation() {
        let resolver = resolver().with_prompter(Interrupted);
        let defs = definitions(vec![("REGION", required())]);

        let result = resolver.resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new());

        match result {
            Err(ResolveError::Cancelled { option }) => assert_eq!(option, "REGION"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn test_unused_override_is_not_an_error() {
        let resolver = Resolver::new(map(&[("UNKNOWN", "x")]), BTreeMap::new());
        let defs = definitions(vec![("KNOWN", with_default("y"))]);

        let (values, _) = resolver
            .resolve(&token(), &OptionDefinitions::new(), &defs, &OptionValues::new())
            .unwrap();
        assert_eq!(plain(&values), map(&[("KNOWN", "y")]));
    }
}
