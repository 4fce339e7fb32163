//! Process termination primitives.
//!
//! Signals are addressed to the process group first (the launcher starts
//! every script as a group leader so interpreters' children are reached
//! too) and fall back to the single pid for processes that are not group
//! leaders.

use thiserror::Error;

/// A single signal could not be delivered.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("invalid pid {0}")]
    InvalidPid(u32),

    #[cfg(unix)]
    #[error(transparent)]
    Os(#[from] nix::errno::Errno),

    #[error("signals are not supported on this platform")]
    Unsupported,
}

/// Result of a graceful-then-forceful termination attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// SIGTERM was delivered.
    Graceful,
    /// SIGTERM failed and SIGKILL was delivered.
    Forced { graceful_error: SendError },
}

/// Both termination attempts failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("SIGTERM failed ({graceful}), SIGKILL failed ({forceful})")]
pub struct SignalError {
    pub graceful: SendError,
    pub forceful: SendError,
}

/// Send SIGTERM, escalating to SIGKILL if SIGTERM cannot be delivered.
pub fn terminate(pid: u32) -> Result<Escalation, SignalError> {
    match terminate_gracefully(pid) {
        Ok(()) => Ok(Escalation::Graceful),
        Err(graceful) => match force_kill(pid) {
            Ok(()) => Ok(Escalation::Forced {
                graceful_error: graceful,
            }),
            Err(forceful) => Err(SignalError { graceful, forceful }),
        },
    }
}

/// Terminate a process gracefully (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> Result<(), SendError> {
    #[cfg(unix)]
    {
        send(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(SendError::Unsupported)
    }
}

/// Force kill a process (SIGKILL).
pub fn force_kill(pid: u32) -> Result<(), SendError> {
    #[cfg(unix)]
    {
        send(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(SendError::Unsupported)
    }
}

/// Whether a process with this pid still exists.
///
/// Zombies count as alive. On platforms without signals this always
/// answers `true` so callers never treat a live process as lost.
pub fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Some(pid) = to_nix_pid(pid) else {
            return false;
        };
        match kill(pid, None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(_) => true,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(unix)]
fn send(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), SendError> {
    use nix::sys::signal::{kill, killpg};

    let nix_pid = to_nix_pid(pid).ok_or(SendError::InvalidPid(pid))?;
    killpg(nix_pid, signal).or_else(|_| kill(nix_pid, signal))?;
    Ok(())
}

#[cfg(unix)]
fn to_nix_pid(pid: u32) -> Option<nix::unistd::Pid> {
    // Pid 0 and out-of-range values would address the caller's own group.
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(nix::unistd::Pid::from_raw)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    #[test]
    fn test_terminate_live_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(is_alive(pid));

        let escalation = terminate(pid).unwrap();
        assert_eq!(escalation, Escalation::Graceful);

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(15));
    }

    #[test]
    fn test_reaped_process_is_not_alive() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!is_alive(pid));
        let err = terminate(pid).unwrap_err();
        assert_eq!(err.graceful, SendError::Os(nix::errno::Errno::ESRCH));
        assert_eq!(err.forceful, SendError::Os(nix::errno::Errno::ESRCH));
        assert!(err.to_string().starts_with("SIGTERM failed ("));
    }

    #[test]
    fn test_pid_zero_is_rejected() {
        assert!(!is_alive(0));
        assert_eq!(terminate_gracefully(0), Err(SendError::InvalidPid(0)));
    }
}
