//! Duplex message channel shared by every match a client plays.
//!
//! The channel is split in two layers:
//! - a [`Link`] moves raw JSON frames to and from the game server
//! - a [`Channel`] decodes frames and routes each inbound message to the
//!   subscriptions registered for its `game_id`
//!
//! Socket I/O for [`UdpLink`] runs in tokio tasks that only shuttle frames
//! through unbounded queues. Decoding, routing and everything downstream of it
//! happens on the thread that calls [`Transport::poll`], so session state is
//! only ever touched from the event loop.

use crate::error::{ProtocolError, TransportError};
use log::{debug, error, info, warn};
use shared::{ClientMessage, GameId, Notice, ServerMessage};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// The operations a game session needs from the shared channel.
pub trait Transport {
    fn connect(&mut self) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
    fn emit(&mut self, message: &ClientMessage) -> Result<(), TransportError>;

    /// Registers a listener for messages tagged with `game_id`.
    fn subscribe(&mut self, game_id: GameId) -> Subscription;

    /// Removes the listener; nothing is delivered to it afterwards.
    fn revoke(&mut self, subscription: Subscription);

    fn subscription_count(&self, game_id: GameId) -> usize;

    /// Routes every frame received since the last call. Returns the number of
    /// deliveries made.
    fn poll(&mut self) -> usize;

    fn disconnect(&mut self);
}

/// Raw frame pipe underneath a [`Channel`].
pub trait Link {
    fn open(&mut self) -> Result<(), TransportError>;
    fn is_open(&self) -> bool;
    fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Next received frame without blocking. An `Err` reports that the link
    /// itself failed.
    fn try_recv(&mut self) -> Option<Result<String, TransportError>>;

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handle for one session's listener registration.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    game_id: GameId,
    receiver: UnboundedReceiver<ServerMessage>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn try_next(&mut self) -> Option<ServerMessage> {
        self.receiver.try_recv().ok()
    }
}

struct Route {
    id: SubscriptionId,
    game_id: GameId,
    sender: UnboundedSender<ServerMessage>,
}

pub struct Channel<L> {
    link: L,
    routes: Vec<Route>,
    next_subscription: u64,
}

impl<L: Link> Channel<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            routes: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn route(&mut self, message: ServerMessage) -> usize {
        let game_id = match message.game_id() {
            Some(id) => id,
            None => {
                warn!(
                    "Dropping inbound message: {}",
                    ProtocolError::MissingGameId {
                        kind: message.kind()
                    }
                );
                return 0;
            }
        };

        let mut delivered = 0;
        self.routes.retain(|route| {
            if route.game_id != game_id {
                return true;
            }
            match route.sender.send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    debug!("Pruning abandoned subscription {:?}", route.id);
                    false
                }
            }
        });

        if delivered == 0 {
            debug!(
                "No subscriber for {} message of game {}",
                message.kind(),
                game_id
            );
        }
        delivered
    }

    /// Tells every live subscription that the channel under it broke.
    fn fail_all(&mut self, reason: &str) -> usize {
        let mut delivered = 0;
        self.routes.retain(|route| {
            let notice = ServerMessage::Error(Notice {
                game_id: Some(route.game_id),
                message: Some(reason.to_string()),
            });
            let alive = route.sender.send(notice).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }
}

impl<L: Link> Transport for Channel<L> {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.link.is_open() {
            return Ok(());
        }
        self.link.open()
    }

    fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    fn emit(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        if !self.link.is_open() {
            return Err(TransportError::NotConnected);
        }
        let frame = message.to_frame()?;
        self.link.send(frame)
    }

    fn subscribe(&mut self, game_id: GameId) -> Subscription {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes.push(Route {
            id,
            game_id,
            sender,
        });
        debug!("Subscription {:?} listening for game {}", id, game_id);

        Subscription {
            id,
            game_id,
            receiver,
        }
    }

    fn revoke(&mut self, subscription: Subscription) {
        self.routes.retain(|route| route.id != subscription.id);
        debug!(
            "Subscription {:?} for game {} revoked",
            subscription.id, subscription.game_id
        );
    }

    fn subscription_count(&self, game_id: GameId) -> usize {
        self.routes
            .iter()
            .filter(|route| route.game_id == game_id && !route.sender.is_closed())
            .count()
    }

    fn poll(&mut self) -> usize {
        let mut delivered = 0;

        while let Some(frame) = self.link.try_recv() {
            match frame {
                Ok(text) => match ServerMessage::from_frame(&text) {
                    Ok(message) => delivered += self.route(message),
                    Err(e) => warn!(
                        "Dropping inbound frame: {}",
                        ProtocolError::Malformed(e.to_string())
                    ),
                },
                Err(e) => {
                    error!("Channel failure: {}", e);
                    delivered += self.fail_all(&e.to_string());
                }
            }
        }

        delivered
    }

    fn disconnect(&mut self) {
        if self.link.is_open() {
            self.link.close();
            info!("Disconnected from server");
        }
    }
}

/// UDP link to the game server, one JSON frame per datagram.
pub struct UdpLink {
    server_addr: SocketAddr,
    fake_ping_ms: u64,
    runtime: Handle,
    outbound: Option<UnboundedSender<String>>,
    inbound: Option<UnboundedReceiver<Result<String, TransportError>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpLink {
    pub fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        runtime: Handle,
    ) -> Result<Self, std::net::AddrParseError> {
        Ok(Self {
            server_addr: server_addr.parse()?,
            fake_ping_ms,
            runtime,
            outbound: None,
            inbound: None,
            tasks: Vec::new(),
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outbound = None;
        self.inbound = None;
    }
}

impl Link for UdpLink {
    fn open(&mut self) -> Result<(), TransportError> {
        let std_socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        std_socket.set_nonblocking(true)?;

        let _guard = self.runtime.enter();
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);
        info!(
            "Connecting to {} from {}",
            self.server_addr,
            socket.local_addr()?
        );

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        self.tasks.push(self.runtime.spawn(send_loop(
            Arc::clone(&socket),
            self.server_addr,
            out_rx,
            self.fake_ping_ms,
        )));
        self.tasks.push(self.runtime.spawn(receive_loop(
            socket,
            self.server_addr,
            in_tx,
            self.fake_ping_ms,
        )));

        self.outbound = Some(out_tx);
        self.inbound = Some(in_rx);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.outbound.is_some()
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn try_recv(&mut self) -> Option<Result<String, TransportError>> {
        let inbound = self.inbound.as_mut()?;
        match inbound.try_recv() {
            Ok(Ok(frame)) => Some(Ok(frame)),
            Ok(Err(e)) => {
                self.shutdown();
                Some(Err(e))
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.shutdown();
                Some(Err(TransportError::Closed))
            }
        }
    }

    fn close(&mut self) {
        self.shutdown();
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    mut frames: UnboundedReceiver<String>,
    fake_ping_ms: u64,
) {
    while let Some(frame) = frames.recv().await {
        if fake_ping_ms > 0 {
            sleep(Duration::from_millis(fake_ping_ms / 2)).await;
        }
        if let Err(e) = socket.send_to(frame.as_bytes(), server_addr).await {
            error!("Error sending frame: {}", e);
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    frames: UnboundedSender<Result<String, TransportError>>,
    fake_ping_ms: u64,
) {
    let mut buffer = [0u8; 4096];

    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, addr)) => {
                if addr != server_addr {
                    debug!("Ignoring datagram from unknown peer {}", addr);
                    continue;
                }
                if fake_ping_ms > 0 {
                    sleep(Duration::from_millis(fake_ping_ms / 2)).await;
                }
                let frame = String::from_utf8_lossy(&buffer[..len]).into_owned();
                if frames.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Error receiving frame: {}", e);
                let _ = frames.send(Err(TransportError::Io(e)));
                break;
            }
        }
    }
}

#[derive(Default)]
struct MemoryWire {
    open: bool,
    refuse_open: bool,
    inbound: VecDeque<Result<String, TransportError>>,
    sent: Vec<String>,
    closes: usize,
}

/// In-process link; the paired [`MemoryPeer`] plays the server.
pub struct MemoryLink {
    wire: Arc<Mutex<MemoryWire>>,
}

#[derive(Clone)]
pub struct MemoryPeer {
    wire: Arc<Mutex<MemoryWire>>,
}

pub fn memory_link() -> (MemoryLink, MemoryPeer) {
    let wire = Arc::new(Mutex::new(MemoryWire::default()));
    (
        MemoryLink {
            wire: Arc::clone(&wire),
        },
        MemoryPeer { wire },
    )
}

fn lock(wire: &Mutex<MemoryWire>) -> MutexGuard<'_, MemoryWire> {
    wire.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Link for MemoryLink {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut wire = lock(&self.wire);
        if wire.refuse_open {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "peer refused connection",
            )));
        }
        wire.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.wire).open
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let mut wire = lock(&self.wire);
        if !wire.open {
            return Err(TransportError::NotConnected);
        }
        wire.sent.push(frame);
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Result<String, TransportError>> {
        lock(&self.wire).inbound.pop_front()
    }

    fn close(&mut self) {
        let mut wire = lock(&self.wire);
        wire.open = false;
        wire.closes += 1;
    }
}

impl MemoryPeer {
    pub fn push_frame(&self, frame: impl Into<String>) {
        lock(&self.wire).inbound.push_back(Ok(frame.into()));
    }

    pub fn push(&self, message: &ServerMessage) {
        match message.to_frame() {
            Ok(frame) => self.push_frame(frame),
            Err(e) => error!("Failed to encode scripted message: {}", e),
        }
    }

    /// Queues a link failure behind the frames already pushed.
    pub fn fail(&self, reason: &str) {
        lock(&self.wire).inbound.push_back(Err(TransportError::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            reason.to_string(),
        ))));
    }

    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.wire).refuse_open = refuse;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.wire).open
    }

    pub fn close_count(&self) -> usize {
        lock(&self.wire).closes
    }

    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.wire).sent.clone()
    }

    /// Decoded copy of everything the client sent; frames that do not decode
    /// are skipped.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    pub fn clear_sent(&self) {
        lock(&self.wire).sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameInit, ScoreUpdate};

    fn score(game_id: Option<GameId>, p1: u32) -> ServerMessage {
        ServerMessage::ScoreUpdate(ScoreUpdate {
            game_id,
            player1_score: p1,
            player2_score: 0,
        })
    }

    fn start(game_id: GameId) -> ClientMessage {
        ClientMessage::StartGame(GameInit {
            game_id,
            local_player_id: None,
            player1_id: 1,
            player2_id: 2,
            is_remote: false,
            is_local_tournament: false,
            token: None,
        })
    }

    #[test]
    fn test_emit_requires_connection() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);

        assert!(matches!(
            channel.emit(&start(1)),
            Err(TransportError::NotConnected)
        ));

        channel.connect().unwrap();
        channel.emit(&start(1)).unwrap();
        assert_eq!(peer.sent_messages(), vec![start(1)]);
    }

    #[test]
    fn test_messages_routed_by_game_id() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);
        let mut seven = channel.subscribe(7);
        let mut eight = channel.subscribe(8);

        peer.push(&score(Some(7), 1));
        peer.push(&score(Some(8), 2));
        peer.push(&score(Some(9), 3));

        assert_eq!(channel.poll(), 2);
        assert_eq!(seven.try_next(), Some(score(Some(7), 1)));
        assert_eq!(seven.try_next(), None);
        assert_eq!(eight.try_next(), Some(score(Some(8), 2)));
        assert_eq!(eight.try_next(), None);
    }

    #[test]
    fn test_missing_game_id_and_malformed_frames_dropped() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);
        let mut sub = channel.subscribe(7);

        peer.push(&score(None, 1));
        peer.push_frame("{\"type\":\"score_update\"");
        peer.push_frame("{\"type\":\"warp\",\"game_id\":7}");

        assert_eq!(channel.poll(), 0);
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_revoked_subscription_receives_nothing() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);
        let sub = channel.subscribe(7);
        assert_eq!(channel.subscription_count(7), 1);

        channel.revoke(sub);
        assert_eq!(channel.subscription_count(7), 0);

        peer.push(&score(Some(7), 1));
        assert_eq!(channel.poll(), 0);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);
        drop(channel.subscribe(7));

        assert_eq!(channel.subscription_count(7), 0);
        peer.push(&score(Some(7), 1));
        assert_eq!(channel.poll(), 0);
        assert!(channel.routes.is_empty());
    }

    #[test]
    fn test_link_failure_fans_out_error() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);
        let mut a = channel.subscribe(1);
        let mut b = channel.subscribe(2);

        peer.fail("reset by peer");
        assert_eq!(channel.poll(), 2);

        for (sub, id) in [(&mut a, 1), (&mut b, 2)] {
            match sub.try_next() {
                Some(ServerMessage::Error(notice)) => {
                    assert_eq!(notice.game_id, Some(id));
                    assert!(notice.message.unwrap().contains("reset by peer"));
                }
                other => panic!("Expected error notice, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_disconnect_closes_link_once() {
        let (link, peer) = memory_link();
        let mut channel = Channel::new(link);
        channel.connect().unwrap();
        assert!(peer.is_open());

        channel.disconnect();
        channel.disconnect();
        assert!(!channel.is_connected());
        assert_eq!(peer.close_count(), 1);
    }

    #[test]
    fn test_udp_link_moves_frames_both_ways() {
        let referee = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        referee
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = referee.local_addr().unwrap().to_string();

        tokio_test::block_on(async {
            let mut link = UdpLink::new(&addr, 0, Handle::current()).unwrap();
            link.open().unwrap();
            assert!(link.is_open());
            link.send("ping".to_string()).unwrap();

            // Let the send task flush before blocking on the referee.
            sleep(Duration::from_millis(50)).await;
            let mut buf = [0u8; 64];
            let (len, client_addr) = referee.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..len], b"ping");
            referee.send_to(b"pong", client_addr).unwrap();

            let mut received = None;
            for _ in 0..100 {
                if let Some(frame) = link.try_recv() {
                    received = Some(frame.unwrap());
                    break;
                }
                sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(received.as_deref(), Some("pong"));

            link.close();
            assert!(!link.is_open());
            assert!(matches!(
                link.send("late".to_string()),
                Err(TransportError::NotConnected)
            ));
        });
    }

    #[test]
    fn test_udp_link_rejects_bad_address() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        assert!(UdpLink::new("not an address", 0, runtime.handle().clone()).is_err());
    }

    #[test]
    fn test_refused_connection_reported() {
        let (link, peer) = memory_link();
        peer.refuse_connections(true);
        let mut channel = Channel::new(link);
        assert!(matches!(channel.connect(), Err(TransportError::Io(_))));
        assert!(!channel.is_connected());
    }
}
