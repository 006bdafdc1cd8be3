//! Daemon signal subscription.
//!
//! Signals are forwarded into an unbounded channel so the owning loop can
//! handle them alongside its other event sources.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::proxy::CacheProperties;

use super::error::DaemonError;
use super::proxy::CdemuDaemonProxy;
use super::session::{BusType, BUS_NAME, OBJECT_PATH};

/// A signal emitted by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    Started,
    Stopped,
    StatusChanged(i32),
    OptionChanged(i32, String),
}

/// Background task forwarding daemon signals; unsubscribes when dropped.
pub struct SignalPump {
    bus: BusType,
    task: JoinHandle<()>,
}

impl SignalPump {
    /// Subscribe to the daemon's signals on the given bus.
    ///
    /// Works whether or not the daemon is currently running, so `Started`
    /// arrives once it comes up.
    pub async fn subscribe(
        bus: BusType,
        events: mpsc::UnboundedSender<DaemonEvent>,
    ) -> Result<Self, DaemonError> {
        let connection = bus.open().await.map_err(DaemonError::Bus)?;
        let proxy = CdemuDaemonProxy::builder(&connection)
            .destination(BUS_NAME)?
            .path(OBJECT_PATH)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let mut started = proxy.receive_daemon_started().await?;
        let mut stopped = proxy.receive_daemon_stopped().await?;
        let mut status_changed = proxy.receive_device_status_changed().await?;
        let mut option_changed = proxy.receive_device_option_changed().await?;

        debug!("Subscribed to daemon signals on the {} bus", bus);

        let task = tokio::spawn(async move {
            // Keeps the connection alive for as long as the streams are read.
            let _connection = connection;

            loop {
                let event = tokio::select! {
                    Some(_) = started.next() => DaemonEvent::Started,
                    Some(_) = stopped.next() => DaemonEvent::Stopped,
                    Some(signal) = status_changed.next() => match signal.args() {
                        Ok(args) => DaemonEvent::StatusChanged(*args.device_number()),
                        Err(e) => {
                            warn!("Malformed DeviceStatusChanged signal: {}", e);
                            continue;
                        }
                    },
                    Some(signal) = option_changed.next() => match signal.args() {
                        Ok(args) => DaemonEvent::OptionChanged(
                            *args.device_number(),
                            args.option().to_string(),
                        ),
                        Err(e) => {
                            warn!("Malformed DeviceOptionChanged signal: {}", e);
                            continue;
                        }
                    },
                    else => break,
                };

                debug!("Daemon signal: {:?}", event);
                if events.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Self { bus, task })
    }
}

impl Drop for SignalPump {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Unsubscribed from daemon signals on the {} bus", self.bus);
    }
}
