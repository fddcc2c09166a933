//! GNU screen backend.
//!
//! screen has no way to move an attached client between sessions, so
//! `switch` is unsupported and so is attaching from inside screen.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::info;

use super::command::ScreenCommand;
use super::{Attach, SessionBackend, SessionEnv};
use crate::process::CommandRunner;
use crate::{Error, Result};

pub struct ScreenBackend {
    runner: Arc<dyn CommandRunner>,
    env: SessionEnv,
}

impl ScreenBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, env: SessionEnv) -> Self {
        Self { runner, env }
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.exists(name)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("screen session '{}'", name)))
        }
    }
}

impl SessionBackend for ScreenBackend {
    fn name(&self) -> String {
        "screen".to_string()
    }

    fn create(&self, name: &str, path: &Path) -> Result<()> {
        if self.exists(name)? {
            return Err(Error::AlreadyExists(format!("screen session '{}'", name)));
        }
        info!(session = name, path = %path.display(), "creating screen session");
        self.runner
            .run(&ScreenCommand::new_session(name, path))?
            .into_result("screen")?;
        Ok(())
    }

    fn attach(&self, name: &str) -> Result<Attach> {
        self.require(name)?;
        if self.is_inside_session() {
            return Err(Error::Unsupported(
                "already inside a screen session; screen cannot switch sessions, detach first"
                    .to_string(),
            ));
        }
        Ok(Attach::Exec(ScreenCommand::attach(name)))
    }

    fn switch(&self, _name: &str) -> Result<()> {
        Err(Error::Unsupported(
            "screen does not support switching between sessions".to_string(),
        ))
    }

    fn list(&self) -> Result<Vec<String>> {
        // `screen -ls` exits non-zero in several normal situations; the
        // listing itself is authoritative
        let out = self.runner.run(&ScreenCommand::list_sessions())?;
        Ok(parse_session_list(&out.stdout))
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.require(name)?;
        info!(session = name, "quitting screen session");
        self.runner
            .run(&ScreenCommand::quit(name))?
            .into_result("screen")?;
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|s| s == name))
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.runner.is_available("screen"))
    }

    fn is_inside_session(&self) -> bool {
        self.env.inside_screen()
    }

    fn current_session_name(&self) -> Result<Option<String>> {
        match &self.env.sty {
            None => Ok(None),
            Some(sty) => match sty.split_once('.') {
                Some((_, name)) if !name.is_empty() => Ok(Some(name.to_string())),
                _ => Err(Error::InvalidInput(format!("invalid STY format: {}", sty))),
            },
        }
    }

    fn run_in_session(&self, name: &str, command: &str) -> Result<()> {
        self.require(name)?;
        self.runner
            .run(&ScreenCommand::stuff(name, &format!("{}\n", command)))?
            .into_result("screen")?;
        Ok(())
    }
}

static SESSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\.(\S+)\s+(?:\([^)]*\)\s+)*\((?:Attached|Detached|Multi)")
        .expect("valid screen -ls pattern")
});

/// Parse `screen -ls` output into session names.
pub fn parse_session_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| SESSION_LINE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::process::CommandOutput;
    use crate::session::testing::ScriptedRunner;

    const LISTING: &str = "There are screens on:\n\
\t12345.repo-main\t(Detached)\n\
\t67890.other-dev\t(01/02/2026 10:00:00 AM)\t(Attached)\n\
2 Sockets in /run/screen/S-user.\n";

    fn backend(runner: ScriptedRunner, sty: Option<&str>) -> (ScreenBackend, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let env = SessionEnv {
            sty: sty.map(String::from),
            ..Default::default()
        };
        (ScreenBackend::new(runner.clone(), env), runner)
    }

    fn listing() -> ScriptedRunner {
        ScriptedRunner::new().respond("screen -ls", CommandOutput::ok(LISTING))
    }

    #[test]
    fn test_parse_session_list() {
        assert_eq!(parse_session_list(LISTING), vec!["repo-main", "other-dev"]);
        assert!(parse_session_list("No Sockets found in /run/screen/S-user.\n").is_empty());
    }

    #[test]
    fn test_parse_shared_session() {
        let output = "\t4242.pair-main\t(Multi, attached)\n\t99.stray\n";
        assert_eq!(parse_session_list(output), vec!["pair-main"]);
    }

    #[test]
    fn test_list_ignores_exit_status() {
        let runner = ScriptedRunner::new().respond(
            "screen -ls",
            CommandOutput {
                code: Some(1),
                stdout: LISTING.to_string(),
                stderr: String::new(),
            },
        );
        let (screen, _) = backend(runner, None);
        assert_eq!(screen.list().unwrap().len(), 2);
    }

    #[test]
    fn test_switch_is_unsupported() {
        let (screen, _) = backend(listing(), None);
        assert_eq!(
            screen.switch("repo-main").unwrap_err().kind(),
            ErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn test_attach_inside_screen_is_unsupported() {
        let (screen, _) = backend(listing(), Some("12345.repo-main"));
        assert_eq!(
            screen.attach("other-dev").unwrap_err().kind(),
            ErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn test_attach_outside_screen_execs() {
        let (screen, _) = backend(listing(), None);
        assert_eq!(
            screen.attach("repo-main").unwrap(),
            Attach::Exec(ScreenCommand::attach("repo-main"))
        );
    }

    #[test]
    fn test_create_existing_and_delete_missing() {
        let (screen, runner) = backend(listing(), None);
        assert_eq!(
            screen.create("repo-main", Path::new("/w")).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            screen.delete("nope-x").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(!runner.called("screen -dmS"));
        assert!(!runner.called("screen -S nope-x"));
    }

    #[test]
    fn test_create_sets_working_directory() {
        let (screen, runner) = backend(listing(), None);
        screen.create("repo-feature", Path::new("/w/repo/feature")).unwrap();
        let calls = runner.calls.lock().unwrap();
        let create = calls
            .iter()
            .find(|c| c.build() == "screen -dmS repo-feature")
            .unwrap();
        assert_eq!(create.get_current_dir(), Some(Path::new("/w/repo/feature")));
    }

    #[test]
    fn test_current_session_from_sty() {
        let (screen, _) = backend(listing(), Some("12345.repo-main"));
        assert_eq!(
            screen.current_session_name().unwrap(),
            Some("repo-main".to_string())
        );
        let (outside, _) = backend(listing(), None);
        assert_eq!(outside.current_session_name().unwrap(), None);
        let (bad, _) = backend(listing(), Some("garbage"));
        assert!(bad.current_session_name().is_err());
    }
}
