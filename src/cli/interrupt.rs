//! Ctrl-C handling for running batches.

use std::io;
use std::thread;

use crate::cli::output;
use crate::core::services::payload_adapter::CancelToken;

/// Exit code after a second interrupt, as shells report SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancel `token` on the first Ctrl-C and exit on the second.
///
/// The handler is registered before this returns. After the first interrupt
/// the batch stops at its next read and drops pending outputs.
pub fn cancel_on_interrupt(token: CancelToken) -> io::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut interrupts = {
        let _guard = rt.enter();
        Interrupts::register()?
    };

    thread::Builder::new()
        .name("pgpipe-interrupt".into())
        .spawn(move || {
            rt.block_on(async move {
                if interrupts.next().await {
                    output::warning("Interrupted, cancelling the batch (press Ctrl-C again to exit)");
                    token.cancel();
                }
                if interrupts.next().await {
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            })
        })?;
    Ok(())
}

#[cfg(unix)]
struct Interrupts(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Interrupts {
    fn register() -> io::Result<Self> {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).map(Self)
    }

    async fn next(&mut self) -> bool {
        self.0.recv().await.is_some()
    }
}

#[cfg(not(unix))]
struct Interrupts;

#[cfg(not(unix))]
impl Interrupts {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> bool {
        tokio::signal::ctrl_c().await.is_ok()
    }
}
