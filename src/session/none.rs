//! Backend used when no multiplexer is available.

use std::path::Path;

use super::{Attach, SessionBackend};
use crate::{Error, Result};

/// Every mutation fails with `BackendUnavailable`; queries report nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneBackend;

fn unavailable() -> Error {
    Error::BackendUnavailable(
        "install tmux, zellij or screen, or configure an editor backend".to_string(),
    )
}

impl SessionBackend for NoneBackend {
    fn name(&self) -> String {
        "none".to_string()
    }

    fn create(&self, _name: &str, _path: &Path) -> Result<()> {
        Err(unavailable())
    }

    fn attach(&self, _name: &str) -> Result<Attach> {
        Err(unavailable())
    }

    fn switch(&self, _name: &str) -> Result<()> {
        Err(unavailable())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn delete(&self, _name: &str) -> Result<()> {
        Err(unavailable())
    }

    fn exists(&self, _name: &str) -> Result<bool> {
        Ok(false)
    }

    fn is_running(&self) -> Result<bool> {
        Ok(false)
    }

    fn is_inside_session(&self) -> bool {
        false
    }

    fn current_session_name(&self) -> Result<Option<String>> {
        Ok(None)
    }
}
