use anyhow::Result;
use std::path::{Path, PathBuf};
use systest_common::{load_suite, CaseSpec, HarnessCfg, ToolCommand};

fn covered_commands() -> impl Iterator<Item = ToolCommand> {
    ToolCommand::ALL
        .into_iter()
        .filter(|c| c.is_query() || *c == ToolCommand::Help)
}

/// Default catalogue: every query command plus `help`, once as a one-shot
/// argument and once typed at the prompt, then explicit exit and a peer run.
pub fn builtin_cases() -> Vec<CaseSpec> {
    let mut cases: Vec<CaseSpec> = covered_commands()
        .map(|c| CaseSpec::new(format!("tool_{}", c.keyword()), true, false, c.keyword()))
        .collect();
    cases.extend(covered_commands().map(|c| {
        CaseSpec::new(format!("tool_{}_interactive", c.keyword()), false, false, c.keyword())
    }));
    cases.push(CaseSpec::new(
        "tool_exit_interactive",
        false,
        false,
        ToolCommand::Exit.keyword(),
    ));
    cases.push(CaseSpec::new(
        "tool_participants_dds",
        false,
        true,
        ToolCommand::Participant.keyword(),
    ));
    cases
}

pub fn select_cases(cfg: &HarnessCfg) -> Result<Vec<CaseSpec>> {
    match &cfg.suite_path {
        Some(path) => load_suite(path),
        None => Ok(builtin_cases()),
    }
}

/// Bare names are looked up in PATH; anything with a directory part is kept
/// as given so a bad path fails at spawn time.
pub fn resolve_exe(raw: &Path) -> PathBuf {
    let bare = raw.parent().map_or(true, |p| p.as_os_str().is_empty());
    if bare {
        if let Ok(found) = which::which(raw) {
            return found;
        }
    }
    raw.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalogue_names_are_unique() {
        let cases = builtin_cases();
        let names: HashSet<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), cases.len());
        assert!(cases.iter().any(|c| c.name == "tool_participants" && c.one_shot));
        assert!(cases.iter().any(|c| c.name == "tool_topics_interactive" && !c.one_shot));
        assert_eq!(cases.iter().filter(|c| c.dds).count(), 1);
    }

    #[test]
    fn catalogue_uses_known_commands() {
        for case in builtin_cases() {
            let parsed = systest_common::parse_command_line(&case.arguments).unwrap();
            assert!(parsed.is_well_formed(), "{}", case.name);
        }
    }

    #[test]
    fn explicit_paths_are_not_resolved() {
        let p = Path::new("./build/fastddsspy");
        assert_eq!(resolve_exe(p), p);
        let p = Path::new("/no/such/fastddsspy");
        assert_eq!(resolve_exe(p), p);
    }

    #[cfg(unix)]
    #[test]
    fn bare_names_use_path() {
        let resolved = resolve_exe(Path::new("sh"));
        assert!(resolved.is_absolute());
        assert_eq!(resolve_exe(Path::new("no-such-fastddsspy-bin")), Path::new("no-such-fastddsspy-bin"));
    }

    #[test]
    fn suite_path_overrides_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.toml");
        std::fs::write(&path, "[[case]]\nname = \"only\"\none_shot = true\narguments = \"topics\"\n").unwrap();
        let cfg = HarnessCfg {
            suite_path: Some(path),
            ..HarnessCfg::default()
        };
        let cases = select_cases(&cfg).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "only");
        assert_eq!(select_cases(&HarnessCfg::default()).unwrap(), builtin_cases());
    }
}
