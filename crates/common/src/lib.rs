// # -----------------------------
// # crates/common/src/lib.rs
// # -----------------------------
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod command;

pub use command::{parse_command_line, ParsedCommand, ToolCommand};

/// Logger name shared by every line the harness emits.
pub const LOG_TARGET: &str = "SYS_TEST";

/// Seconds a tool is given to exit on its own before it is killed.
pub const DEFAULT_GRACE_SECS: u64 = 5;

pub const ENV_SUITE: &str = "FASTDDSSPY_SYSTEST_SUITE";
pub const ENV_TIMEOUT_SECS: &str = "FASTDDSSPY_SYSTEST_TIMEOUT_SECS";
pub const ENV_PEER: &str = "FASTDDSSPY_SYSTEST_PEER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessCfg {
    pub grace: Duration,
    pub suite_path: Option<PathBuf>,
    /// argv of the DDS peer process; empty means no peer is launched.
    pub peer: Vec<String>,
}

impl Default for HarnessCfg {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            suite_path: None,
            peer: Vec::new(),
        }
    }
}

impl HarnessCfg {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = lookup(ENV_TIMEOUT_SECS)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_GRACE_SECS);
        let suite_path = lookup(ENV_SUITE)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let peer = lookup(ENV_PEER)
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            grace: Duration::from_secs(secs),
            suite_path,
            peer,
        }
    }
}

/// Declarative description of one test scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSpec {
    pub name: String,
    #[serde(default)]
    pub one_shot: bool,
    #[serde(default)]
    pub dds: bool,
    #[serde(default)]
    pub arguments: String,
}

impl CaseSpec {
    pub fn new(name: impl Into<String>, one_shot: bool, dds: bool, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            one_shot,
            dds,
            arguments: arguments.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(rename = "case", default)]
    pub cases: Vec<CaseSpec>,
}

pub fn parse_suite(text: &str) -> Result<Vec<CaseSpec>> {
    let suite: SuiteFile = toml::from_str(text)?;
    if suite.cases.is_empty() {
        return Err(anyhow!("suite declares no [[case]]"));
    }
    let mut seen = HashSet::new();
    for case in &suite.cases {
        if case.name.trim().is_empty() {
            return Err(anyhow!("case with empty name"));
        }
        if !seen.insert(case.name.clone()) {
            return Err(anyhow!("duplicate case name: {}", case.name));
        }
        match parse_command_line(&case.arguments) {
            Some(parsed) if !parsed.is_well_formed() => tracing::warn!(
                target: LOG_TARGET,
                "case {}: <{}> has the wrong number of arguments",
                case.name,
                case.arguments
            ),
            None if !case.one_shot => tracing::warn!(
                target: LOG_TARGET,
                "case {}: <{}> is not a command the tool knows",
                case.name,
                case.arguments
            ),
            _ => {}
        }
    }
    Ok(suite.cases)
}

pub fn load_suite(path: &Path) -> Result<Vec<CaseSpec>> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read suite {}", path.display()))?;
    parse_suite(&s).with_context(|| format!("parse suite {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = HarnessCfg::from_lookup(|_| None);
        assert_eq!(cfg, HarnessCfg::default());
        assert_eq!(cfg.grace, Duration::from_secs(5));
    }

    #[test]
    fn env_overrides() {
        let cfg = HarnessCfg::from_lookup(lookup_from(&[
            (ENV_TIMEOUT_SECS, "2"),
            (ENV_SUITE, "/tmp/suite.toml"),
            (ENV_PEER, "  BasicHelloWorld publisher "),
        ]));
        assert_eq!(cfg.grace, Duration::from_secs(2));
        assert_eq!(cfg.suite_path, Some(PathBuf::from("/tmp/suite.toml")));
        assert_eq!(cfg.peer, vec!["BasicHelloWorld", "publisher"]);
    }

    #[test]
    fn bad_timeout_falls_back() {
        let cfg = HarnessCfg::from_lookup(lookup_from(&[(ENV_TIMEOUT_SECS, "soon")]));
        assert_eq!(cfg.grace, Duration::from_secs(DEFAULT_GRACE_SECS));
    }

    #[test]
    fn parse_suite_with_defaults() {
        let cases = parse_suite(
            r#"
[[case]]
name = "tool_participants"
one_shot = true
arguments = "participants"

[[case]]
name = "tool_exit"
"#,
        )
        .unwrap();
        assert_eq!(cases.len(), 2);
        assert!(cases[0].one_shot);
        assert!(!cases[0].dds);
        assert_eq!(cases[1], CaseSpec::new("tool_exit", false, false, ""));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = parse_suite("[[case]]\nname = \"a\"\n[[case]]\nname = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("duplicate case name"));
    }

    #[test]
    fn empty_suite_rejected() {
        assert!(parse_suite("").is_err());
    }

    #[test]
    fn load_suite_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_suite(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));

        let path = dir.path().join("suite.toml");
        fs::write(&path, "[[case]]\nname = \"tool_help\"\narguments = \"help\"\n").unwrap();
        let cases = load_suite(&path).unwrap();
        assert_eq!(cases[0].arguments, "help");
    }
}
