//! tmux backend.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::command::TmuxCommand;
use super::{Attach, SessionBackend, SessionEnv};
use crate::process::{CommandOutput, CommandRunner};
use crate::{Error, Result};

pub struct TmuxBackend {
    runner: Arc<dyn CommandRunner>,
    env: SessionEnv,
}

impl TmuxBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, env: SessionEnv) -> Self {
        Self { runner, env }
    }

    fn run(&self, cmd: TmuxCommand) -> Result<CommandOutput> {
        self.runner.run(&cmd.into_spec())
    }

    fn run_ok(&self, cmd: TmuxCommand) -> Result<CommandOutput> {
        self.run(cmd)?.into_result("tmux")
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.exists(name)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("tmux session '{}'", name)))
        }
    }
}

impl SessionBackend for TmuxBackend {
    fn name(&self) -> String {
        "tmux".to_string()
    }

    fn create(&self, name: &str, path: &Path) -> Result<()> {
        if self.exists(name)? {
            return Err(Error::AlreadyExists(format!("tmux session '{}'", name)));
        }
        info!(session = name, path = %path.display(), "creating tmux session");
        self.run_ok(TmuxCommand::new_session(name, true, Some(path)))?;
        Ok(())
    }

    fn attach(&self, name: &str) -> Result<Attach> {
        self.require(name)?;
        if self.is_inside_session() {
            self.run_ok(TmuxCommand::switch_client(name))?;
            return Ok(Attach::Switched);
        }
        Ok(Attach::Exec(TmuxCommand::attach_session(name).into_spec()))
    }

    fn switch(&self, name: &str) -> Result<()> {
        self.require(name)?;
        if !self.is_inside_session() {
            return Err(Error::InvalidInput(
                "not inside a tmux session, attach instead".to_string(),
            ));
        }
        self.run_ok(TmuxCommand::switch_client(name))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let out = self.run(TmuxCommand::list_sessions())?;
        match out.code {
            Some(0) => Ok(parse_session_list(&out.stdout)),
            // no server running
            Some(1) => Ok(Vec::new()),
            _ => Err(Error::Command {
                program: "tmux".to_string(),
                detail: out.describe_failure(),
            }),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.require(name)?;
        info!(session = name, "killing tmux session");
        self.run_ok(TmuxCommand::kill_session(name))?;
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let out = self.run(TmuxCommand::has_session(name))?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::Command {
                program: "tmux".to_string(),
                detail: out.describe_failure(),
            }),
        }
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.runner.is_available("tmux"))
    }

    fn is_inside_session(&self) -> bool {
        self.env.inside_tmux()
    }

    fn current_session_name(&self) -> Result<Option<String>> {
        if !self.is_inside_session() {
            return Ok(None);
        }
        let out = self.run_ok(TmuxCommand::current_session())?;
        let name = out.stdout.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    fn run_in_session(&self, name: &str, command: &str) -> Result<()> {
        self.require(name)?;
        self.run_ok(TmuxCommand::send_keys(name, command, true))?;
        self.run_ok(TmuxCommand::send_keys(name, "Enter", false))?;
        Ok(())
    }
}

/// One session name per line; blank lines and padding are ignored.
pub fn parse_session_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::session::testing::ScriptedRunner;

    fn backend(runner: ScriptedRunner, inside: bool) -> (TmuxBackend, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let env = SessionEnv {
            tmux: inside.then(|| "/tmp/tmux-1000/default,1,0".to_string()),
            ..Default::default()
        };
        (TmuxBackend::new(runner.clone(), env), runner)
    }

    fn absent() -> CommandOutput {
        CommandOutput::failed(1, "can't find session")
    }

    #[test]
    fn test_create_rejects_existing_session() {
        let (tmux, runner) = backend(ScriptedRunner::new(), false);
        let err = tmux.create("repo-main", Path::new("/w")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(!runner.called("tmux new-session"));
    }

    #[test]
    fn test_create_new_session() {
        let runner = ScriptedRunner::new().respond("tmux has-session", absent());
        let (tmux, runner) = backend(runner, false);
        tmux.create("repo-main", Path::new("/w/repo/main")).unwrap();
        assert!(runner.called("tmux new-session -d -s repo-main -c /w/repo/main"));
    }

    #[test]
    fn test_attach_outside_tmux_execs() {
        let (tmux, _) = backend(ScriptedRunner::new(), false);
        match tmux.attach("repo-main").unwrap() {
            Attach::Exec(spec) => assert_eq!(spec.build(), "tmux attach-session -t =repo-main"),
            other => panic!("unexpected attach: {:?}", other),
        }
    }

    #[test]
    fn test_attach_inside_tmux_switches() {
        let (tmux, runner) = backend(ScriptedRunner::new(), true);
        assert_eq!(tmux.attach("repo-main").unwrap(), Attach::Switched);
        assert!(runner.called("tmux switch-client -t =repo-main"));
    }

    #[test]
    fn test_missing_session_is_not_found() {
        let runner = ScriptedRunner::new().respond("tmux has-session", absent());
        let (tmux, runner) = backend(runner, true);
        assert_eq!(tmux.attach("x-y").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(tmux.switch("x-y").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(tmux.delete("x-y").unwrap_err().kind(), ErrorKind::NotFound);
        assert!(!runner.called("tmux kill-session"));
        assert!(!runner.called("tmux switch-client"));
    }

    #[test]
    fn test_switch_outside_tmux_is_rejected() {
        let (tmux, _) = backend(ScriptedRunner::new(), false);
        assert_eq!(
            tmux.switch("repo-main").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_list_parses_and_tolerates_blank_lines() {
        let runner = ScriptedRunner::new().respond(
            "tmux list-sessions",
            CommandOutput::ok("repo-main\n\n  other-dev  \n\n"),
        );
        let (tmux, _) = backend(runner, false);
        assert_eq!(tmux.list().unwrap(), vec!["repo-main", "other-dev"]);
    }

    #[test]
    fn test_list_without_server_is_empty() {
        let runner = ScriptedRunner::new().respond(
            "tmux list-sessions",
            CommandOutput::failed(1, "no server running on /tmp/tmux-1000/default"),
        );
        let (tmux, _) = backend(runner, false);
        assert!(tmux.list().unwrap().is_empty());
    }

    #[test]
    fn test_exists_propagates_unexpected_failure() {
        let runner =
            ScriptedRunner::new().respond("tmux has-session", CommandOutput::failed(2, "boom"));
        let (tmux, _) = backend(runner, false);
        assert_eq!(
            tmux.exists("repo-main").unwrap_err().kind(),
            ErrorKind::ExternalCommandFailure
        );
    }

    #[test]
    fn test_current_session_name() {
        let runner = ScriptedRunner::new()
            .respond("tmux display-message", CommandOutput::ok("repo-main\n"));
        let (tmux, _) = backend(runner, true);
        assert_eq!(
            tmux.current_session_name().unwrap(),
            Some("repo-main".to_string())
        );

        let (outside, _) = backend(ScriptedRunner::new(), false);
        assert_eq!(outside.current_session_name().unwrap(), None);
    }

    #[test]
    fn test_run_in_session_sends_literal_then_enter() {
        let (tmux, runner) = backend(ScriptedRunner::new(), false);
        tmux.run_in_session("repo-main", "make dev").unwrap();
        let calls = runner.rendered_calls();
        assert!(calls.contains(&"tmux send-keys -t =repo-main: -l make dev".to_string()));
        assert!(calls.contains(&"tmux send-keys -t =repo-main: Enter".to_string()));
    }
}
