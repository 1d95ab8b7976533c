//! The broker server: a single-threaded mio event loop that owns the
//! connection table, the session table, the subscription trie, and the
//! schema registry.
//!
//! Everything between two `poll` calls runs to completion; there are no
//! worker threads and therefore no locks. Packets from one connection are
//! processed in arrival order because the framing loop drains that
//! connection whenever its fd is reported readable.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use bytes::Bytes;
use log::{debug, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::client::{Connection, ConnectionState, ReadOutcome};
use crate::config::Config;
use crate::error::{ProtocolError, Result};
use crate::metrics::BrokerMetrics;
use crate::packet::{
    self, Connack, ConnackCode, Packet, Publish, QoS, Suback, Subscribe, Unsubscribe,
};
use crate::proto::{decode_message, encode_message};
use crate::registry::{SchemaRegistry, DISCOVERY_REQUEST_TOPIC, DISCOVERY_RESPONSE_TOPIC};
use crate::session::Session;
use crate::subscription::{ClientId, SubscriptionStore};

/// Token for the listener socket; client slots map to `Token(slot + 1)`.
const LISTENER: Token = Token(0);

/// Poll batch timeout: a pure liveness tick for keep-alive and cleanup.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

fn token_for(slot: ClientId) -> Token {
    Token(slot + 1)
}

fn slot_for(token: Token) -> ClientId {
    token.0 - 1
}

/// The MQTT broker server.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    /// Sparse connection table. A slot keeps its index for the lifetime of
    /// the connection; freed slots are reused before the table grows.
    conns: Vec<Option<Connection>>,
    free_slots: Vec<ClientId>,
    /// MQTT sessions by connection slot.
    sessions: AHashMap<ClientId, Session>,
    subscriptions: SubscriptionStore,
    registry: SchemaRegistry,
    metrics: Arc<BrokerMetrics>,
    config: Arc<Config>,
    /// Reusable fan-out frame buffer.
    encode_buf: Vec<u8>,
    /// Reusable subscriber-matching buffer.
    subscriber_buf: Vec<ClientId>,
}

impl Server {
    /// Bind the listener and register it with the reactor. mio sets the
    /// socket non-blocking and SO_REUSEADDR on bind.
    pub fn new(config: Arc<Config>, registry: SchemaRegistry) -> Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.server.bind)?;

        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        info!("typemq listening on {}", config.server.bind);

        Ok(Self {
            poll,
            listener,
            conns: Vec::new(),
            free_slots: Vec::new(),
            sessions: AHashMap::new(),
            subscriptions: SubscriptionStore::new(),
            registry,
            metrics: Arc::new(BrokerMetrics::new()),
            config,
            encode_buf: Vec::with_capacity(4096),
            subscriber_buf: Vec::with_capacity(64),
        })
    }

    /// The address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the broker counters.
    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the event loop forever.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.run_once(&mut events)?;
        }
    }

    /// One reactor iteration: poll, dispatch ready fds, flush pending
    /// writes, enforce keep-alive, tear down dead connections.
    fn run_once(&mut self, events: &mut Events) -> Result<()> {
        self.poll.poll(events, Some(POLL_TIMEOUT))?;

        for event in events.iter() {
            let token = event.token();
            if token == LISTENER {
                self.accept_connections()?;
                continue;
            }
            if event.is_readable() {
                self.handle_readable(slot_for(token));
            }
            if event.is_writable() {
                self.handle_writable(slot_for(token));
            }
        }

        self.flush_pending();
        self.check_keep_alive();
        self.cleanup_connections();

        Ok(())
    }

    /// Accept until the listener would block, allocating slots as we go.
    fn accept_connections(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((socket, addr)) => {
                    let slot = self.allocate_slot(socket)?;
                    debug!("accepted connection from {} at slot {}", addr, slot);
                    self.metrics.client_connected();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn allocate_slot(&mut self, mut socket: TcpStream) -> Result<ClientId> {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.conns.push(None);
                self.conns.len() - 1
            }
        };

        self.poll
            .registry()
            .register(&mut socket, token_for(slot), Interest::READABLE)?;

        self.conns[slot] = Some(Connection::new(
            socket,
            self.config.limits.read_buffer_size,
            self.config.limits.write_buffer_size,
        ));
        Ok(slot)
    }

    /// Read from one connection and frame packets, alternating until the
    /// socket is drained. The registration is edge-triggered, so the socket
    /// must always be read to `WouldBlock` before returning.
    fn handle_readable(&mut self, slot: ClientId) {
        loop {
            // A stale event may arrive for a slot freed in this same batch.
            let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) else {
                return;
            };

            let outcome = match conn.read() {
                Ok(outcome) => outcome,
                Err(e) => {
                    debug!("read error at slot {}: {}", slot, e);
                    conn.state = ConnectionState::Disconnecting;
                    return;
                }
            };

            self.drain_frames(slot);

            match outcome {
                ReadOutcome::Drained => return,
                ReadOutcome::Closed => {
                    if let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) {
                        conn.state = ConnectionState::Disconnecting;
                    }
                    return;
                }
                ReadOutcome::BufferFull => {
                    let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) else {
                        return;
                    };
                    // Framing freed nothing: a single frame larger than the
                    // read buffer can never complete. Overflow, drop the
                    // connection.
                    if conn.read_buffer_full() {
                        warn!(
                            "slot {}: frame exceeds {} byte read buffer, closing",
                            slot, self.config.limits.read_buffer_size
                        );
                        conn.state = ConnectionState::Disconnecting;
                        return;
                    }
                    // Space was freed; go read the rest.
                }
            }
        }
    }

    /// Pull whole packets out of the connection's read buffer, dispatching
    /// each before consuming its bytes.
    fn drain_frames(&mut self, slot: ClientId) {
        loop {
            let (packet, consumed) = {
                let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) else {
                    return;
                };
                if conn.state == ConnectionState::Disconnecting {
                    return;
                }

                match packet::decode_packet(conn.data(), self.config.limits.max_packet_size) {
                    Ok(Some((packet, consumed))) => {
                        conn.last_packet_time = Instant::now();
                        (packet, consumed)
                    }
                    Ok(None) => return,
                    Err(e) => {
                        debug!("protocol error at slot {}: {}", slot, e);
                        conn.state = ConnectionState::Disconnecting;
                        return;
                    }
                }
            };

            if let Err(e) = self.handle_packet(slot, packet) {
                debug!("dropping slot {}: {}", slot, e);
                if let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) {
                    conn.state = ConnectionState::Disconnecting;
                }
                return;
            }

            if let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) {
                conn.consume(consumed);
            }
        }
    }

    fn handle_writable(&mut self, slot: ClientId) {
        let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        if let Err(e) = conn.flush() {
            debug!("flush error at slot {}: {}", slot, e);
            conn.state = ConnectionState::Disconnecting;
        }
    }

    fn handle_packet(&mut self, slot: ClientId, packet: Packet) -> Result<()> {
        let state = self
            .conns
            .get(slot)
            .and_then(Option::as_ref)
            .map(|c| c.state);

        match packet {
            Packet::Connect(connect) => self.handle_connect(slot, connect),

            Packet::Publish(publish) => {
                if state != Some(ConnectionState::Connected) {
                    return Err(ProtocolError::FirstPacketNotConnect.into());
                }
                self.handle_publish(slot, publish)
            }

            Packet::Subscribe(subscribe) => {
                if state != Some(ConnectionState::Connected) {
                    return Err(ProtocolError::FirstPacketNotConnect.into());
                }
                self.handle_subscribe(slot, subscribe)
            }

            Packet::Unsubscribe(unsub) => {
                if state != Some(ConnectionState::Connected) {
                    return Err(ProtocolError::FirstPacketNotConnect.into());
                }
                self.handle_unsubscribe(slot, unsub)
            }

            Packet::Pingreq => {
                self.encode_buf.clear();
                packet::encode_pingresp(&mut self.encode_buf);
                self.queue_to(slot, "PINGRESP");
                Ok(())
            }

            Packet::Disconnect => {
                debug!("slot {} disconnected", slot);
                if let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) {
                    conn.state = ConnectionState::Disconnecting;
                }
                Ok(())
            }

            // QoS 1/2 acknowledgements and anything else a QoS 0 broker has
            // no business with: log and ignore.
            other => {
                debug!("slot {}: ignoring {:?}", slot, other);
                Ok(())
            }
        }
    }

    fn handle_connect(&mut self, slot: ClientId, connect: packet::Connect) -> Result<()> {
        if connect.protocol_level != 4 {
            debug!(
                "slot {}: unsupported protocol level {}",
                slot, connect.protocol_level
            );
            self.encode_buf.clear();
            packet::encode_connack(
                &Connack {
                    session_present: false,
                    code: ConnackCode::UnacceptableProtocolVersion,
                },
                &mut self.encode_buf,
            );
            self.queue_to(slot, "CONNACK");
            if let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) {
                conn.state = ConnectionState::Disconnecting;
            }
            return Ok(());
        }

        debug!(
            "slot {}: CONNECT client_id={:?} clean_session={} keep_alive={}",
            slot, connect.client_id, connect.clean_session, connect.keep_alive
        );

        // A repeated CONNECT on the same connection replaces the session.
        self.sessions.insert(
            slot,
            Session::new(connect.client_id, connect.clean_session, connect.keep_alive),
        );

        if let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) {
            conn.state = ConnectionState::Connected;
        }

        self.encode_buf.clear();
        packet::encode_connack(
            &Connack {
                session_present: false,
                code: ConnackCode::Accepted,
            },
            &mut self.encode_buf,
        );
        self.queue_to(slot, "CONNACK");
        Ok(())
    }

    fn handle_subscribe(&mut self, slot: ClientId, subscribe: Subscribe) -> Result<()> {
        let mut return_codes = Vec::with_capacity(subscribe.topics.len());
        for (topic_filter, _requested_qos) in &subscribe.topics {
            debug!("slot {} subscribes to {}", slot, topic_filter);
            self.subscriptions.subscribe(topic_filter, slot);
            // Everything is granted at QoS 0.
            return_codes.push(0);
        }

        self.encode_buf.clear();
        packet::encode_suback(
            &Suback {
                packet_id: subscribe.packet_id,
                return_codes,
            },
            &mut self.encode_buf,
        );
        self.queue_to(slot, "SUBACK");
        Ok(())
    }

    fn handle_unsubscribe(&mut self, slot: ClientId, unsub: Unsubscribe) -> Result<()> {
        for topic_filter in &unsub.topics {
            debug!("slot {} unsubscribes from {}", slot, topic_filter);
            self.subscriptions.unsubscribe(topic_filter, slot);
        }

        self.encode_buf.clear();
        packet::encode_unsuback(unsub.packet_id, &mut self.encode_buf);
        self.queue_to(slot, "UNSUBACK");
        Ok(())
    }

    fn handle_publish(&mut self, slot: ClientId, publish: Publish) -> Result<()> {
        let topic = publish.topic_str();

        // MQTT-3.3.2-2: topic names must not contain wildcards.
        if topic.contains('+') || topic.contains('#') {
            return Err(ProtocolError::MalformedPacket(
                "wildcard in PUBLISH topic name".into(),
            )
            .into());
        }

        if topic == DISCOVERY_REQUEST_TOPIC {
            self.handle_discovery_request(slot);
            return Ok(());
        }

        // Schema-bound topics get their payload decoded for diagnostics.
        // Decode failures do not block routing unless strict validation is
        // configured.
        if let Some(type_name) = self.registry.lookup_type_for_topic(topic) {
            match self.registry.lookup_message(type_name) {
                Some(def) => match decode_message(&publish.payload, def, &self.registry) {
                    Ok(value) => {
                        debug!("decoded {} on '{}': {:?}", type_name, topic, value);
                    }
                    Err(e) => {
                        warn!(
                            "payload on '{}' failed to decode as {}: {}",
                            topic, type_name, e
                        );
                        if self.config.schema.validate_publish {
                            debug!("strict validation on, not routing '{}'", topic);
                            return Ok(());
                        }
                    }
                },
                None => warn!("topic '{}' bound to unregistered type {}", topic, type_name),
            }
        }

        self.encode_buf.clear();
        packet::encode_publish(&publish, &mut self.encode_buf);

        let topic = publish.topic_str().to_string();
        self.fan_out(&topic, Some(slot));
        Ok(())
    }

    /// Build, encode, and fan out the discovery response. Encoding failures
    /// skip the reply with a log line; they never affect the requester's
    /// connection.
    fn handle_discovery_request(&mut self, slot: ClientId) {
        debug!("slot {} requested service discovery", slot);

        let Some(def) = self.registry.discovery_def() else {
            warn!("discovery schema not registered, skipping reply");
            return;
        };

        let value = self.registry.build_discovery_value();
        let mut payload = Vec::new();
        if let Err(e) = encode_message(&value, def, &self.registry, &mut payload) {
            warn!("skipping discovery reply: {}", e);
            return;
        }

        let publish = Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Bytes::from_static(DISCOVERY_RESPONSE_TOPIC.as_bytes()),
            packet_id: None,
            payload: Bytes::from(payload),
        };

        self.encode_buf.clear();
        packet::encode_publish(&publish, &mut self.encode_buf);

        // The response is broker-originated: the requester receives it too
        // if subscribed.
        self.fan_out(DISCOVERY_RESPONSE_TOPIC, None);
    }

    /// Queue the frame in `encode_buf` to every subscriber of `topic`,
    /// except `exclude` (the publisher). Slow subscribers lose the delivery.
    fn fan_out(&mut self, topic: &str, exclude: Option<ClientId>) {
        let mut targets = std::mem::take(&mut self.subscriber_buf);
        self.subscriptions.matching_subscribers_into(topic, &mut targets);

        let frame = std::mem::take(&mut self.encode_buf);
        for &target in &targets {
            if Some(target) == exclude {
                continue;
            }
            let Some(conn) = self.conns.get_mut(target).and_then(Option::as_mut) else {
                continue;
            };
            if conn.state != ConnectionState::Connected {
                continue;
            }

            match conn.queue(&frame) {
                Ok(()) => self.metrics.message_routed(),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.metrics.delivery_dropped();
                    debug!("slot {} too slow, dropping delivery on '{}'", target, topic);
                }
                Err(e) => {
                    debug!("delivery to slot {} failed: {}", target, e);
                    conn.state = ConnectionState::Disconnecting;
                }
            }
        }

        self.encode_buf = frame;
        self.subscriber_buf = targets;
    }

    /// Queue the frame in `encode_buf` to one connection, dropping it if the
    /// client is too slow to take even a control packet.
    fn queue_to(&mut self, slot: ClientId, what: &str) {
        let Some(conn) = self.conns.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        if let Err(e) = conn.queue(&self.encode_buf) {
            debug!("dropping {} for slot {}: {}", what, slot, e);
        }
    }

    /// Push buffered writes out and keep each connection's poll interest in
    /// sync with whether it still has pending bytes.
    fn flush_pending(&mut self) {
        for slot in 0..self.conns.len() {
            let Some(conn) = self.conns[slot].as_mut() else {
                continue;
            };
            if !conn.has_pending_writes() {
                continue;
            }

            match conn.flush() {
                Ok(true) => {
                    let token = token_for(slot);
                    let _ = self
                        .poll
                        .registry()
                        .reregister(&mut conn.socket, token, Interest::READABLE);
                }
                Ok(false) => {
                    let token = token_for(slot);
                    let _ = self.poll.registry().reregister(
                        &mut conn.socket,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    );
                }
                Err(e) => {
                    debug!("flush error at slot {}: {}", slot, e);
                    conn.state = ConnectionState::Disconnecting;
                }
            }
        }
    }

    /// Disconnect clients silent past 1.5x their keep-alive.
    fn check_keep_alive(&mut self) {
        let now = Instant::now();
        for (slot, conn) in self.conns.iter_mut().enumerate() {
            let Some(conn) = conn else { continue };
            if conn.state != ConnectionState::Connected {
                continue;
            }
            let Some(session) = self.sessions.get(&slot) else {
                continue;
            };
            if session.keep_alive == 0 {
                continue;
            }

            let timeout = Duration::from_secs((u64::from(session.keep_alive) * 3) / 2);
            if now.duration_since(conn.last_packet_time) > timeout {
                info!(
                    "slot {} ({}) timed out after {}s keep-alive",
                    slot, session.client_id, session.keep_alive
                );
                conn.state = ConnectionState::Disconnecting;
            }
        }
    }

    /// Tear down connections marked `Disconnecting`: final best-effort
    /// flush, deregister from the reactor, purge subscriptions and session,
    /// free the slot.
    fn cleanup_connections(&mut self) {
        for slot in 0..self.conns.len() {
            let is_dead = matches!(
                self.conns[slot].as_ref().map(|c| c.state),
                Some(ConnectionState::Disconnecting)
            );
            if !is_dead {
                continue;
            }

            if let Some(mut conn) = self.conns[slot].take() {
                let _ = conn.flush();
                let _ = self.poll.registry().deregister(&mut conn.socket);
            }

            self.subscriptions.remove_client(slot);
            self.sessions.remove(&slot);
            self.metrics.client_disconnected();
            self.free_slots.push(slot);
            debug!("slot {} freed", slot);
        }
    }
}
