//! Background thread that owns the query socket and runs the poll loop

use crate::channel::{
    refresh_channel, status_channel, RefreshReceiver, RefreshSender, StatusPublisher,
    StatusReceiver,
};
use crate::error::StartupError;
use crate::network::Transport;
use crate::state::{PollMachine, Timing, DEFAULT_POLL_INTERVAL, DEFAULT_STEP_TIMEOUT};
use log::{error, info};
use shared::ServerStatus;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_QUERY_PORT: u16 = 27015;
pub const DEFAULT_LOCAL_PORT: u16 = 27005;
pub const DEFAULT_LOOP_CADENCE: Duration = Duration::from_micros(500);

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub remote_host: String,
    pub remote_port: u16,
    /// 0 lets the OS pick.
    pub local_port: u16,
    pub poll_interval: Duration,
    pub step_timeout: Duration,
    /// Sleep between loop iterations; also bounds shutdown latency.
    pub loop_cadence: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            remote_host: "127.0.0.1".to_string(),
            remote_port: DEFAULT_QUERY_PORT,
            local_port: DEFAULT_LOCAL_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            loop_cadence: DEFAULT_LOOP_CADENCE,
        }
    }
}

impl PollerConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: self.poll_interval,
            step_timeout: self.step_timeout,
        }
    }

    /// Resolves the server address once; the first result wins.
    pub async fn resolve_remote(&self) -> Result<SocketAddr, StartupError> {
        let target = format!("{}:{}", self.remote_host, self.remote_port);
        tokio::net::lookup_host(&target)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(StartupError::Resolve(target))
    }
}

/// Polling loop state. Constructed and consumed by [`Poller::start`].
pub struct Poller {
    transport: Transport,
    machine: PollMachine,
    statuses: StatusPublisher,
    refresh: RefreshReceiver,
    stop: Arc<AtomicBool>,
    cadence: Duration,
}

impl Poller {
    /// Resolves and binds, then starts the poll loop on its own thread.
    ///
    /// The loop never runs on the caller's runtime, so a busy or
    /// single-threaded consumer cannot stall it. Start-up failures are
    /// reported here; everything after that shows up as `ServerStatus::Error`.
    pub async fn start(config: PollerConfig) -> Result<PollerHandle, StartupError> {
        let remote = config.resolve_remote().await?;
        let transport = Transport::bind(config.local_port, remote).map_err(StartupError::Bind)?;
        let local_addr = transport.local_addr().map_err(StartupError::Bind)?;

        let (publisher, statuses) = status_channel();
        let (refresher, refresh) = refresh_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let poller = Poller {
            transport,
            machine: PollMachine::new(Instant::now(), config.timing()),
            statuses: publisher,
            refresh,
            stop: Arc::clone(&stop),
            cadence: config.loop_cadence,
        };

        info!(
            "Polling {} every {:?} (step timeout {:?})",
            remote, config.poll_interval, config.step_timeout
        );
        let thread = thread::Builder::new()
            .name("status-poller".to_string())
            .spawn(move || poller.run())
            .map_err(StartupError::Spawn)?;

        Ok(PollerHandle {
            statuses,
            refresher,
            shutdown: ShutdownHandle {
                stop,
                thread: Some(thread),
            },
            local_addr,
            remote_addr: remote,
        })
    }

    fn run(mut self) {
        while !self.stop.load(Ordering::Acquire) {
            let now = Instant::now();

            if self.refresh.take_pending() {
                self.machine.refresh(now);
            }

            let statuses = &self.statuses;
            self.machine.advance(now, &mut self.transport, |status| {
                if let ServerStatus::Ok(info) = &status {
                    info!(
                        "{}: {}/{} players on {}",
                        info.name, info.players, info.max_players, info.map
                    );
                }
                statuses.publish(status);
            });

            thread::sleep(self.cadence);
        }

        self.transport.close();
        info!("Poller stopped");
    }
}

/// Stops the poll loop and waits for its thread to exit.
///
/// Dropping the handle without calling `shutdown` still stops the loop, but
/// does not wait for it.
#[derive(Debug)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ShutdownHandle {
    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(true, |thread| thread.is_finished())
    }

    /// The socket is closed by the time this returns.
    pub async fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return;
        };

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!("Poller thread panicked"),
            Err(e) => error!("Failed to join poller thread: {}", e),
        }
    }

    /// Same as [`shutdown`](Self::shutdown), for callers outside a runtime.
    pub fn shutdown_blocking(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Poller thread panicked");
            }
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Everything a consumer gets back from [`Poller::start`].
#[derive(Debug)]
pub struct PollerHandle {
    statuses: StatusReceiver,
    refresher: RefreshSender,
    shutdown: ShutdownHandle,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl PollerHandle {
    pub async fn recv(&mut self) -> Option<ServerStatus> {
        self.statuses.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ServerStatus> {
        self.statuses.try_recv()
    }

    /// Asks for a poll now, or right after the cycle in progress.
    pub fn refresh(&self) -> bool {
        self.refresher.refresh()
    }

    pub fn refresher(&self) -> RefreshSender {
        self.refresher.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Splits the handle for consumers that read statuses on another thread.
    pub fn into_parts(self) -> (StatusReceiver, RefreshSender, ShutdownHandle) {
        (self.statuses, self.refresher, self.shutdown)
    }

    pub async fn shutdown(self) {
        self.shutdown.shutdown().await;
    }
}
