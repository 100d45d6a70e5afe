use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{io_err, DaemonError};
use crate::supervisor::Supervisor;

/// How often the foreground loop checks that the daemon still answers.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

type Shared = Arc<Mutex<Supervisor>>;

/// Build a tokio runtime and block the current thread in [`run_foreground`].
pub fn start_blocking(supervisor: Supervisor) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run_foreground(supervisor))
}

/// Bring the daemon up (attach or start), then wait for ctrl-c and stop it.
///
/// Returns `DaemonUnavailable` if the daemon stops answering while we wait.
pub async fn run_foreground(supervisor: Supervisor) -> Result<(), DaemonError> {
    let shared: Shared = Arc::new(Mutex::new(supervisor));

    let (peer_id, owned) = with_supervisor(&shared, |s| {
        s.ensure_running()?;
        let peer_id = s
            .handle()
            .map(|h| h.identity().peer_id.clone())
            .unwrap_or_default();
        Ok((peer_id, s.owns_child()))
    })
    .await?;
    tracing::info!(%peer_id, owned, "daemon running; press ctrl-c to stop");

    let mut interval = tokio::time::interval(LIVENESS_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => tracing::info!("received ctrl-c, stopping daemon"),
                    Err(err) => tracing::warn!(error = %err, "ctrl-c handler failed, stopping daemon"),
                }
                break Ok(());
            }
            _ = interval.tick() => {
                let alive = with_supervisor(&shared, |s| Ok(s.is_running())).await?;
                if !alive {
                    let endpoint = with_supervisor(&shared, |s| Ok(s.api_addr().to_string())).await?;
                    tracing::error!(%endpoint, "daemon stopped answering");
                    break Err(DaemonError::DaemonUnavailable {
                        endpoint,
                        reason: "daemon stopped answering identity probes".to_string(),
                    });
                }
            }
        }
    };

    with_supervisor(&shared, |s| s.stop()).await?;
    outcome
}

/// Run a blocking supervisor operation off the async workers.
async fn with_supervisor<T, F>(shared: &Shared, op: F) -> Result<T, DaemonError>
where
    T: Send + 'static,
    F: FnOnce(&mut Supervisor) -> Result<T, DaemonError> + Send + 'static,
{
    let shared = Arc::clone(shared);
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&mut guard)
    })
    .await;
    handle_join("supervisor", result)
}

fn handle_join<T>(
    task: &str,
    result: Result<Result<T, DaemonError>, tokio::task::JoinError>,
) -> Result<T, DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(io_err(
            format!("{task} task"),
            std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
        )),
    }
}

/// Install the stderr `fmt` subscriber (`RUST_LOG`, default `info`). Idempotent.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
