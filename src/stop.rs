//! Cooperative stop requests for the run loop.
//!
//! The first interrupt asks for a graceful stop: the in-flight item finishes,
//! then state is flushed. A second interrupt escalates to a hard stop, which
//! additionally skips any periodic checkpoint work still pending.
use anyhow::Result;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopLevel {
    Running,
    Graceful,
    Hard,
}

impl StopLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => StopLevel::Running,
            1 => StopLevel::Graceful,
            _ => StopLevel::Hard,
        }
    }
}

/// Shared handle polled by the run loop between items.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    level: Arc<AtomicU8>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> StopLevel {
        StopLevel::from_raw(self.level.load(Ordering::SeqCst))
    }

    /// Raise the level to at least `level`; never lowers it.
    #[cfg(test)]
    pub fn request(&self, level: StopLevel) {
        self.level.fetch_max(level as u8, Ordering::SeqCst);
    }

    /// Move one level up (running -> graceful -> hard) and return the new level.
    pub fn escalate(&self) -> StopLevel {
        let previous = self
            .level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                Some(raw.saturating_add(1).min(StopLevel::Hard as u8))
            })
            .unwrap_or(StopLevel::Hard as u8);
        StopLevel::from_raw(previous.saturating_add(1))
    }

    pub fn stop_requested(&self) -> bool {
        self.level() >= StopLevel::Graceful
    }

    pub fn is_hard(&self) -> bool {
        self.level() == StopLevel::Hard
    }
}

#[cfg(unix)]
mod sigint {
    use super::StopToken;
    use anyhow::{anyhow, Result};
    use std::sync::OnceLock;

    static TOKEN: OnceLock<StopToken> = OnceLock::new();

    extern "C" fn on_sigint(_signal: libc::c_int) {
        // Only atomic operations here.
        if let Some(token) = TOKEN.get() {
            token.escalate();
        }
    }

    pub fn install(token: &StopToken) -> Result<()> {
        if TOKEN.set(token.clone()).is_err() {
            return Err(anyhow!("interrupt handler already installed"));
        }
        let handler = on_sigint as extern "C" fn(libc::c_int);
        // SAFETY: the handler only touches an initialized OnceLock and an atomic.
        let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(anyhow!(
                "install SIGINT handler: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(())
    }
}

/// Route Ctrl-C into `token` for the rest of the process.
#[cfg(unix)]
pub fn install_interrupt_handler(token: &StopToken) -> Result<()> {
    sigint::install(token)
}

/// Interrupts keep their default behavior on this platform.
#[cfg(not(unix))]
pub fn install_interrupt_handler(_token: &StopToken) -> Result<()> {
    tracing::debug!("graceful interrupt handling is unix-only");
    Ok(())
}
