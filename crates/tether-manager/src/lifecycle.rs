//! Process lifecycle hooks.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::manager::{ConnectionManager, NORMAL_CLOSURE};

/// Close reason used when the host goes to the background.
pub const HIDDEN_REASON: &str = "Host hidden";

/// Host process lifecycle signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The process is about to exit.
    Terminate,
    /// The host went to the background.
    Hidden,
    /// The host came back to the foreground.
    Visible,
}

impl ConnectionManager {
    /// React to a lifecycle signal.
    ///
    /// `Terminate` closes everything. `Hidden` closes connections that would
    /// not reconnect on their own; reconnecting ones ride it out. `Visible`
    /// does nothing.
    pub fn handle_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Terminate => self.shutdown(),
            LifecycleEvent::Hidden => {
                let targets: Vec<_> = self
                    .inner
                    .records
                    .lock()
                    .values()
                    .filter(|r| !r.config.reconnect)
                    .map(|r| r.id.clone())
                    .collect();
                info!(closing = targets.len(), "host hidden, closing non-reconnecting connections");
                for id in targets {
                    let _ = self
                        .inner
                        .close_record(&id, NORMAL_CLOSURE, HIDDEN_REASON, "hidden");
                }
            }
            LifecycleEvent::Visible => {}
        }
    }
}

/// Wait for Ctrl-C (and SIGTERM on Unix).
pub async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!(error = %e, "failed to listen for ctrl-c");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
    }
}

/// Deliver [`LifecycleEvent::Terminate`] to `manager` on Ctrl-C / SIGTERM.
pub fn spawn_signal_hook(manager: ConnectionManager) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received");
        manager.handle_lifecycle(LifecycleEvent::Terminate);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use tether_core::ConnectionConfig;
    use tether_settings::ManagerSettings;

    fn manager(transport: &MemoryTransport) -> ConnectionManager {
        ConnectionManager::builder(ManagerSettings::default())
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_closes_only_non_reconnecting() {
        let transport = MemoryTransport::new();
        let m = manager(&transport);
        let _ = m.connect("plain", ConnectionConfig::new("mem://a")).await.unwrap();
        let _ = m
            .connect("sticky", ConnectionConfig::new("mem://b").with_reconnect(true))
            .await
            .unwrap();

        m.handle_lifecycle(LifecycleEvent::Hidden);
        assert_eq!(m.connection_ids(), vec![tether_core::ConnectionId::from("sticky")]);

        m.handle_lifecycle(LifecycleEvent::Visible);
        assert!(m.is_open("sticky"));

        m.handle_lifecycle(LifecycleEvent::Terminate);
        assert!(m.connection_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn signal_hook_can_be_aborted() {
        let m = manager(&MemoryTransport::new());
        let hook = spawn_signal_hook(m.clone());
        hook.abort();
        assert!(hook.await.unwrap_err().is_cancelled());
    }
}
