//! Install-prompt state machine.
//!
//! Whether the client can offer an "install as app" prompt depends on
//! signals from the host environment. Instead of ad-hoc global event
//! listeners, the prompt is a small finite-state machine driven by
//! those signals, with invalid transitions rejected. It is entirely
//! decoupled from the cache manager.

// Allow dead code: driven by host-environment signals the CLI does not emit
#![allow(dead_code)]

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// No prompt signal received yet.
    NotInstallable,
    /// The host offered a deferred install prompt.
    Installable,
    /// The prompt is showing; awaiting the user's choice.
    Prompting,
    Installed,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallSignal {
    /// Host announced a deferred install prompt is available.
    PromptAvailable,
    /// The user asked to install; show the prompt.
    PromptRequested,
    Accepted,
    Dismissed,
    /// The app is already installed (e.g. launched standalone).
    AlreadyInstalled,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("signal {signal:?} is invalid in state {state:?}")]
pub struct InvalidTransition {
    pub state: InstallState,
    pub signal: InstallSignal,
}

/// Prompt lifecycle holder. Subscribe to host signals on mount, feed
/// them through `apply`, drop on teardown.
#[derive(Debug)]
pub struct InstallPrompt {
    state: InstallState,
}

impl Default for InstallPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallPrompt {
    pub fn new() -> Self {
        Self {
            state: InstallState::NotInstallable,
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Whether the UI should offer the install action.
    pub fn can_prompt(&self) -> bool {
        self.state == InstallState::Installable
    }

    pub fn apply(&mut self, signal: InstallSignal) -> Result<InstallState, InvalidTransition> {
        use InstallSignal::*;
        use InstallState::*;

        // AlreadyInstalled wins from any non-terminal state.
        let next = match (self.state, signal) {
            (Installed | InstallState::Dismissed, _) => None,
            (_, AlreadyInstalled) => Some(Installed),
            (NotInstallable, PromptAvailable) => Some(Installable),
            (Installable, PromptRequested) => Some(Prompting),
            (Prompting, Accepted) => Some(Installed),
            (Prompting, InstallSignal::Dismissed) => Some(InstallState::Dismissed),
            _ => None,
        };

        match next {
            Some(next) => {
                debug!(from = ?self.state, to = ?next, ?signal, "Install prompt transition");
                self.state = next;
                Ok(next)
            }
            None => Err(InvalidTransition {
                state: self.state,
                signal,
            }),
        }
    }
}
