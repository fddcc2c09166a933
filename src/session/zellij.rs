//! zellij backend.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::command::ZellijCommand;
use super::{Attach, SessionBackend, SessionEnv};
use crate::process::CommandRunner;
use crate::{Error, Result};

pub struct ZellijBackend {
    runner: Arc<dyn CommandRunner>,
    env: SessionEnv,
}

impl ZellijBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, env: SessionEnv) -> Self {
        Self { runner, env }
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.exists(name)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("zellij session '{}'", name)))
        }
    }
}

impl SessionBackend for ZellijBackend {
    fn name(&self) -> String {
        "zellij".to_string()
    }

    fn create(&self, name: &str, path: &Path) -> Result<()> {
        if self.exists(name)? {
            return Err(Error::AlreadyExists(format!("zellij session '{}'", name)));
        }
        info!(session = name, path = %path.display(), "creating zellij session");
        self.runner
            .run(&ZellijCommand::new_session(name, path))?
            .into_result("zellij")?;
        Ok(())
    }

    fn attach(&self, name: &str) -> Result<Attach> {
        self.require(name)?;
        if self.is_inside_session() {
            self.runner
                .run(&ZellijCommand::switch_session(name))?
                .into_result("zellij")?;
            return Ok(Attach::Switched);
        }
        Ok(Attach::Exec(ZellijCommand::attach(name)))
    }

    fn switch(&self, name: &str) -> Result<()> {
        self.require(name)?;
        if !self.is_inside_session() {
            return Err(Error::InvalidInput(
                "not inside a zellij session, attach instead".to_string(),
            ));
        }
        self.runner
            .run(&ZellijCommand::switch_session(name))?
            .into_result("zellij")?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let out = self.runner.run(&ZellijCommand::list_sessions())?;
        match out.code {
            Some(0) => Ok(parse_session_list(&out.stdout)),
            // "No active zellij sessions found."
            Some(1) => Ok(Vec::new()),
            _ => Err(Error::Command {
                program: "zellij".to_string(),
                detail: out.describe_failure(),
            }),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.require(name)?;
        info!(session = name, "deleting zellij session");
        self.runner
            .run(&ZellijCommand::delete_session(name))?
            .into_result("zellij")?;
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|s| s == name))
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.runner.is_available("zellij"))
    }

    fn is_inside_session(&self) -> bool {
        self.env.inside_zellij()
    }

    fn current_session_name(&self) -> Result<Option<String>> {
        if !self.is_inside_session() {
            return Ok(None);
        }
        Ok(self.env.zellij_session_name.clone())
    }

    fn run_in_session(&self, name: &str, command: &str) -> Result<()> {
        self.require(name)?;
        self.runner
            .run(&ZellijCommand::write_chars(name, &format!("{}\n", command)))?
            .into_result("zellij")?;
        Ok(())
    }
}

/// First field of each line, skipping headers and blanks.
pub fn parse_session_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("ACTIVE") && !l.starts_with("No active"))
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect()
}
