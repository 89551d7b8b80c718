use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use signal_hook::consts::TERM_SIGNALS;

/// First SIGINT/SIGTERM requests a graceful stop through `cancel`. A second one
/// while the first is still pending exits with `exit_code` at once, removing
/// this process's lock file first because no destructor runs on that path.
#[cfg(unix)]
pub fn install(cancel: Arc<AtomicBool>, lock_path: PathBuf, exit_code: i32) -> anyhow::Result<()> {
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;
    use tracing::warn;

    let mut signals = Signals::new(TERM_SIGNALS).context("registering signal handlers")?;
    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if !cancel.swap(true, Ordering::SeqCst) {
                    warn!("Received signal {}, finishing in-flight deletions", signal);
                    continue;
                }
                warn!("Received signal {} again, exiting now", signal);
                hard_exit(&lock_path, exit_code);
            }
        })
        .context("spawning signal handler thread")?;
    Ok(())
}

/// Console control events cannot be consumed from a thread here, so the
/// second signal exits from the handler itself. The lock file stays behind
/// and is cleared as stale by the next run.
#[cfg(not(unix))]
pub fn install(cancel: Arc<AtomicBool>, _lock_path: PathBuf, exit_code: i32) -> anyhow::Result<()> {
    use signal_hook::flag;

    for signal in TERM_SIGNALS {
        flag::register_conditional_shutdown(*signal, exit_code, Arc::clone(&cancel))
            .context("registering shutdown handler")?;
        flag::register(*signal, Arc::clone(&cancel)).context("registering cancel handler")?;
    }
    Ok(())
}

#[cfg(unix)]
fn hard_exit(lock_path: &std::path::Path, exit_code: i32) -> ! {
    use archive_retention_core::LockManager;
    use tracing::error;

    if let Err(err) = LockManager::new(lock_path).remove_own_lock() {
        error!("Could not remove lock {}: {}", lock_path.display(), err);
    }
    std::process::exit(exit_code);
}
