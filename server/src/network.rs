//! UDP side of the test-double server: answers info, challenge and player queries

use log::{debug, error, info, warn};
use rand::Rng;
use shared::{
    decode_request, encode_challenge_response, encode_info_response, encode_player_list_response,
    PlayerInfo, Request, ServerInfo, CHALLENGE_PLACEHOLDER,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

/// One request the server has seen, for inspection by tests.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub request: Request,
    pub from: SocketAddr,
    pub at: Instant,
}

/// Answers A2S-style queries with a fixed server description and roster.
pub struct QueryServer {
    socket: UdpSocket,
    info: ServerInfo,
    players: Vec<PlayerInfo>,
    /// Last token issued to each peer.
    challenges: HashMap<SocketAddr, u32>,
    log: Arc<RwLock<Vec<RequestRecord>>>,
}

impl QueryServer {
    pub async fn bind(
        addr: &str,
        info: ServerInfo,
        players: Vec<PlayerInfo>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind(addr).await?;
        info!(
            "Query server '{}' listening on {}",
            info.name,
            socket.local_addr()?
        );

        Ok(QueryServer {
            socket,
            info,
            players,
            challenges: HashMap::new(),
            log: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Builds the reply to one decoded request.
    pub fn respond(&mut self, request: Request, peer: SocketAddr) -> Vec<u8> {
        match request {
            Request::Info => {
                let mut info = self.info.clone();
                info.players = self.players.len().min(u8::MAX as usize) as u8;
                encode_info_response(&info)
            }
            Request::Challenge => encode_challenge_response(self.issue_challenge(peer)),
            Request::Players { challenge } => {
                if self.challenges.get(&peer) == Some(&challenge) {
                    encode_player_list_response(&self.players)
                } else {
                    debug!("Stale challenge {:#010X} from {}, reissuing", challenge, peer);
                    encode_challenge_response(self.issue_challenge(peer))
                }
            }
        }
    }

    fn issue_challenge(&mut self, peer: SocketAddr) -> u32 {
        let mut rng = rand::thread_rng();
        let mut challenge: u32 = rng.gen();
        while challenge == CHALLENGE_PLACEHOLDER {
            challenge = rng.gen();
        }
        self.challenges.insert(peer, challenge);
        challenge
    }

    async fn handle_datagram(&mut self, data: &[u8], peer: SocketAddr) {
        let request = match decode_request(data) {
            Ok(request) => request,
            Err(e) => {
                warn!("Ignoring malformed query from {}: {}", peer, e);
                return;
            }
        };
        debug!("{:?} from {}", request, peer);

        self.log.write().await.push(RequestRecord {
            request,
            from: peer,
            at: Instant::now(),
        });

        let response = self.respond(request, peer);
        if let Err(e) = self.socket.send_to(&response, peer).await {
            warn!("Failed to answer {}: {}", peer, e);
        }
    }

    /// Serves queries until `shutdown` completes.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future,
    {
        let mut buffer = [0u8; 2048];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((len, peer)) => {
                        let data = buffer[..len].to_vec();
                        self.handle_datagram(&data, peer).await;
                    }
                    Err(e) => {
                        warn!("Error receiving query: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                },

                _ = &mut shutdown => {
                    info!("Query server shutting down");
                    break;
                }
            }
        }
    }

    /// Runs the server as a background task.
    pub fn spawn(self) -> std::io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let log = Arc::clone(&self.log);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(self.run_until(shutdown_rx));

        Ok(ServerHandle {
            addr,
            log,
            shutdown_tx,
            task,
        })
    }
}

pub struct ServerHandle {
    addr: SocketAddr,
    log: Arc<RwLock<Vec<RequestRecord>>>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every well-formed request received so far, oldest first.
    pub async fn requests(&self) -> Vec<RequestRecord> {
        self.log.read().await.clone()
    }

    pub async fn count(&self, kind: Request) -> usize {
        self.log
            .read()
            .await
            .iter()
            .filter(|record| same_kind(record.request, kind))
            .count()
    }

    /// Signals the serve loop and waits for it; the socket is closed on return.
    pub async fn stop(self) {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Query server on {} had already stopped", self.addr);
        }
        if let Err(e) = self.task.await {
            error!("Query server task ended abnormally: {}", e);
        }
    }
}

/// Compares request kinds, ignoring the challenge value.
fn same_kind(a: Request, b: Request) -> bool {
    std::mem::discriminant(&a) == std::mem::discriminant(&b)
}
