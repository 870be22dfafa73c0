//! Process lifecycle: shutdown signals, configuration reload triggers, and
//! serving until one of them fires.
//!
//! | Trigger              | Action                        |
//! |----------------------|-------------------------------|
//! | SIGINT / SIGTERM     | Drain and stop                |
//! | SIGHUP (`--reload`)  | Drain, reload config, rebind  |
//! | `.env` mtime changes | Same as SIGHUP (`--reload`)   |

use std::future::IntoFuture;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the env file is checked for changes.
pub const ENV_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
    Stop,
    Reload,
}

/// Listen for process signals and forward them as restart events.
///
/// SIGHUP is only forwarded when `reload_enabled`; otherwise it is logged and
/// ignored.
#[cfg(unix)]
pub fn spawn_signal_listener(
    tx: mpsc::UnboundedSender<Restart>,
    reload_enabled: bool,
) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    debug!(pid = std::process::id(), "signal handlers registered");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    if reload_enabled {
                        info!("SIGHUP received, reloading");
                        if tx.send(Restart::Reload).is_err() {
                            break;
                        }
                    } else {
                        warn!("SIGHUP received but --reload is off; ignoring");
                    }
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down");
                    let _ = tx.send(Restart::Stop);
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, shutting down");
                    let _ = tx.send(Restart::Stop);
                    break;
                }
            }
        }
    }))
}

/// Windows fallback: only Ctrl+C is handled.
#[cfg(not(unix))]
pub fn spawn_signal_listener(
    tx: mpsc::UnboundedSender<Restart>,
    _reload_enabled: bool,
) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
            let _ = tx.send(Restart::Stop);
        }
    }))
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll `path` every `interval` and send `Restart::Reload` whenever its
/// modification time changes. Stops once the receiver is gone.
///
/// The baseline is taken before this returns, so any later edit is reported.
pub fn spawn_env_watcher(
    path: PathBuf,
    interval: Duration,
    tx: mpsc::UnboundedSender<Restart>,
) -> JoinHandle<()> {
    let mut last = modified_at(&path);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let current = modified_at(&path);
            if current != last {
                last = current;
                info!(path = %path.display(), "env file changed, reloading");
                if tx.send(Restart::Reload).is_err() {
                    break;
                }
            }
        }
    })
}

/// Serve `app` on `listener` until a restart event arrives, then stop
/// accepting and wait for in-flight requests to finish.
///
/// A closed event channel counts as `Restart::Stop`.
pub async fn serve_until_restart(
    listener: TcpListener,
    app: Router,
    events: &mut mpsc::UnboundedReceiver<Restart>,
) -> io::Result<Restart> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        res = &mut server => {
            res?;
            Ok(Restart::Stop)
        }
        event = events.recv() => {
            let event = event.unwrap_or(Restart::Stop);
            let _ = stop_tx.send(());
            server.await?;
            debug!(?event, "server drained");
            Ok(event)
        }
    }
}
