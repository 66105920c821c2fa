//! Scripted [`CommandRunner`] that records invocations instead of running them.

use super::{CommandOutput, CommandRunner};
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Test double for the process boundary.
///
/// Responses are keyed by command-line prefix (`"systemctl is-active nginx"`);
/// the longest matching prefix wins and anything unscripted succeeds with
/// empty output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    programs: Mutex<HashMap<String, PathBuf>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the output for every command line starting with `prefix`.
    /// A later call for the same prefix replaces the earlier one.
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        let mut responses = self.responses.lock().unwrap();
        responses.retain(|(p, _)| p != prefix);
        responses.push((prefix.to_string(), output));
    }

    pub fn fail(&self, prefix: &str) {
        self.respond(prefix, CommandOutput::failed(1, format!("{prefix}: failed")));
    }

    /// Make `find(program)` resolve to `path`.
    pub fn install(&self, program: &str, path: impl AsRef<Path>) {
        self.programs
            .lock()
            .unwrap()
            .insert(program.to_string(), path.as_ref().to_path_buf());
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded command lines starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        let responses = self.responses.lock().unwrap();
        let scripted = responses
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone());

        Ok(scripted.unwrap_or_else(|| CommandOutput::ok("")))
    }

    fn find(&self, program: &str) -> Option<PathBuf> {
        self.programs.lock().unwrap().get(program).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let fake = FakeRunner::new();
        fake.fail("systemctl");
        fake.respond("systemctl is-active nginx", CommandOutput::ok("active\n"));

        assert!(fake.run("systemctl", &["is-active", "nginx"]).unwrap().success);
        assert!(!fake.run("systemctl", &["start", "nginx"]).unwrap().success);
        assert_eq!(fake.count("systemctl"), 2);
    }

    #[test]
    fn test_unscripted_commands_succeed() {
        let fake = FakeRunner::new();
        let out = fake.run("apt-get", &["update"]).unwrap();
        assert!(out.success);
        assert_eq!(fake.calls(), vec!["apt-get update".to_string()]);
    }
}
