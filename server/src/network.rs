//! Server network layer: UDP transport around the single-writer game loop.
//!
//! Three auxiliary tasks (receiver, sender, battle-deadline sleepers) never
//! touch game state; they exchange typed messages with the main loop over
//! channels. The main loop alone owns [`GameState`], so every handler and
//! timer callback runs to completion before the next one starts.

use crate::game::{GameState, Outbound};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, BATTLE_DEADLINE_SECS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Events delivered to the main game loop.
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// A battle's deadline sleeper fired
    BattleDeadline {
        battle_id: u64,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Outbound work queued for the sender task.
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        packet: Packet,
        addr: SocketAddr,
    },
    /// One packet to a snapshot of addresses, taken at queue time so the
    /// recipients reflect the state the packet was produced from
    Broadcast {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// The arena server: socket, game state, and the channels binding them.
pub struct Server {
    socket: Arc<UdpSocket>,
    state: GameState,
    broadcast_interval: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
    out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        broadcast_interval: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Arena server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            state: GameState::new(),
            broadcast_interval,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    /// Spawns the task that turns datagrams into typed events.
    fn spawn_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 4096];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue onto the socket.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    OutboundMessage::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Broadcast { packet, addrs } => {
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Queues the outbound events a handler produced. Events addressed to
    /// sessions that have since disappeared are dropped here.
    fn dispatch(&self, events: Vec<Outbound>) {
        for event in events {
            let message = match event {
                Outbound::To(id, packet) => match self.state.registry.addr_of(id) {
                    Some(addr) => OutboundMessage::Send { packet, addr },
                    None => {
                        debug!("Dropping packet for departed session {}", id);
                        continue;
                    }
                },
                Outbound::Broadcast(packet) => OutboundMessage::Broadcast {
                    packet,
                    addrs: self.state.registry.addrs(),
                },
            };
            if let Err(e) = self.out_tx.send(message) {
                error!("Failed to queue outbound packet: {}", e);
            }
        }
    }

    /// Schedules a deadline sleeper for each battle the last handler
    /// created. The battle keeps the handle and aborts it if it resolves
    /// before the deadline.
    fn schedule_battle_deadlines(&mut self) {
        for battle_id in self.state.take_started_battles() {
            let server_tx = self.server_tx.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(BATTLE_DEADLINE_SECS)).await;
                let _ = server_tx.send(ServerMessage::BattleDeadline { battle_id });
            });
            self.state.battles.attach_timer(battle_id, handle);
        }
    }

    /// Routes one inbound packet through the matching state handler.
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        self.state.registry.touch(&addr);

        let events = match packet {
            Packet::Join {
                name,
                breed,
                body_color,
                mark_color,
            } => self.state.handle_join(addr, name, breed, body_color, mark_color),
            Packet::Move { x, y } => self.state.handle_move(addr, x, y),
            Packet::PlaceMark { x, y } => self.state.handle_place_mark(addr, x, y),
            Packet::PlaceTrap { x, y } => self.state.handle_place_trap(addr, x, y),
            Packet::BattleChoice { battle_id, choice } => {
                self.state.handle_battle_choice(addr, battle_id, choice)
            }
            Packet::RequestLeaderboard => self.state.handle_request_leaderboard(addr),
            Packet::Heartbeat => Vec::new(),
            Packet::Disconnect => self.state.handle_leave(addr),

            // Server-to-client packets have no business arriving here
            Packet::Joined { .. }
            | Packet::PlayerJoined { .. }
            | Packet::PlayerLeft { .. }
            | Packet::PlayerMoved { .. }
            | Packet::MarkPlaced(_)
            | Packet::TrapPlaced(_)
            | Packet::ResourceUpdated { .. }
            | Packet::TrapHit { .. }
            | Packet::PlayerEliminated { .. }
            | Packet::BattleStart { .. }
            | Packet::BattleResult { .. }
            | Packet::LeaderboardUpdate(_)
            | Packet::MatchStarted { .. }
            | Packet::WaitingForPlayers { .. }
            | Packet::MatchEnded { .. } => {
                warn!("Unexpected server packet from client at {}", addr);
                Vec::new()
            }
        };

        self.schedule_battle_deadlines();
        self.dispatch(events);
    }

    /// Main loop: the single execution context for all game state.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_receiver();
        self.spawn_sender();

        let mut tick = interval(self.broadcast_interval);
        // The first tick fires immediately; skip it
        tick.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        }
                        Some(ServerMessage::BattleDeadline { battle_id }) => {
                            let events = self.state.handle_battle_deadline(battle_id);
                            self.dispatch(events);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick.tick() => {
                    let events = self.state.handle_tick();
                    self.dispatch(events);
                },
            }
        }

        Ok(())
    }
}
