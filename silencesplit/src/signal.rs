use anyhow::Result;
use silencesplit_core::CancellationToken;

#[cfg(unix)]
mod imp {
    use std::sync::OnceLock;

    use anyhow::{anyhow, Result};
    use log::debug;
    use silencesplit_core::CancellationToken;

    /// Token cancelled by the SIGINT/SIGTERM handler.
    static CANCEL: OnceLock<CancellationToken> = OnceLock::new();

    /// Only touches atomics, so it is async-signal-safe.
    extern "C" fn handle_termination(_: libc::c_int) {
        if let Some(token) = CANCEL.get() {
            token.cancel();
        }
    }

    pub(super) fn install(token: CancellationToken) -> Result<()> {
        if CANCEL.set(token).is_err() {
            return Err(anyhow!("termination handler already installed"));
        }
        for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
            unsafe {
                // SAFETY: handle_termination is an extern "C" handler that only
                // performs an atomic load and an atomic store.
                let handler = handle_termination as *const () as libc::sighandler_t;
                if libc::signal(signal, handler) == libc::SIG_ERR {
                    return Err(anyhow!("failed to install {name} handler"));
                }
            }
            debug!("installed {name} handler");
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod imp {
    use anyhow::Result;
    use silencesplit_core::CancellationToken;

    pub(super) fn install(_token: CancellationToken) -> Result<()> {
        log::debug!("termination signals are not handled on this platform");
        Ok(())
    }
}

/// Cancel `token` when the process receives SIGINT or SIGTERM.
///
/// The run loop notices the token at the next batch, closes any open clip and returns.
pub fn install_termination_handler(token: CancellationToken) -> Result<()> {
    imp::install(token)
}
