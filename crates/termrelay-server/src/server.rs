//! Core server: accepts connections and runs one session loop per socket.
//!
//! Owns the registry, the broadcast gateway, the session lifecycle and the
//! command relay, and wires inbound events to them.

use crate::config::ServerConfig;
use crate::gateway::BroadcastGateway;
use crate::registry::{Registry, SharedRegistry};
use crate::relay::CommandRelay;
use crate::session::{SessionLifecycle, SessionState};
use crate::transport::websocket::{self, WebSocketConnection};
use std::sync::Arc;
use std::time::Duration;
use termrelay_core::{
    decode_event, encode_event, Client, HistoryRecord, InboundEvent, OutboundEvent, RelayResult,
    Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How often registry statistics are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// How long shutdown waits for session loops to close their sockets.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The relay server instance.
pub struct RelayServer {
    /// Server configuration.
    config: ServerConfig,
    /// Clients, terminals and history.
    registry: SharedRegistry,
    /// Per-session outbound queues.
    gateway: Arc<BroadcastGateway>,
    /// Connect / register / disconnect handling.
    lifecycle: SessionLifecycle,
    /// Command and terminal routing.
    relay: CommandRelay,
    /// Shutdown notification for session loops.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new server instance.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Registry::shared();
        let gateway = Arc::new(BroadcastGateway::new());
        let lifecycle =
            SessionLifecycle::new(registry.clone(), gateway.clone(), config.grace_period);
        let relay = CommandRelay::new(registry.clone(), gateway.clone());

        Self {
            config,
            registry,
            gateway,
            lifecycle,
            relay,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Accept connections until the listener closes or shutdown is requested.
    ///
    /// On the way out, waits for every session loop to close its socket and
    /// then aborts pending eviction timers.
    pub async fn run(
        self: Arc<Self>,
        mut ws_rx: mpsc::Receiver<WebSocketConnection>,
    ) -> RelayResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let stats = self.clone();
        let stats_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                stats.log_stats().await;
            }
        });

        info!(
            grace_secs = self.config.grace_period.as_secs(),
            "termrelay-server ready"
        );

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("accept loop stopping");
                    break;
                }
                conn = ws_rx.recv() => {
                    let Some(conn) = conn else {
                        info!("listener closed, shutting down");
                        break;
                    };
                    let srv = self.clone();
                    sessions.spawn(async move {
                        if let Err(e) = srv.handle_websocket(conn).await {
                            warn!(error = %e, "WebSocket connection error");
                        }
                    });
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        stats_task.abort();
        drain_sessions(&mut sessions).await;
        self.lifecycle.shutdown().await;
        Ok(())
    }

    /// Ask the accept loop and every session loop to stop.
    ///
    /// `run` finishes the teardown once its sessions have closed.
    pub fn shutdown(&self) {
        info!("broadcasting shutdown to connected sessions");
        let _ = self.shutdown_tx.send(());
    }

    /// Snapshot of every registered client.
    pub async fn clients(&self) -> Vec<Client> {
        self.registry.read().await.list_clients()
    }

    /// Snapshot of every open terminal.
    pub async fn terminals(&self) -> Vec<Terminal> {
        self.registry.read().await.list_terminals()
    }

    /// Command history across all clients.
    pub async fn history(&self) -> Vec<HistoryRecord> {
        self.registry.read().await.history_snapshot()
    }

    async fn log_stats(&self) {
        let clients = self.clients().await.len();
        let terminals = self.terminals().await.len();
        let history_entries = self.history().await.len();
        let sessions = self.gateway.count().await;
        let pending_evictions = self.lifecycle.pending_evictions().await;
        info!(
            clients,
            terminals,
            history_entries,
            sessions,
            pending_evictions,
            "relay stats"
        );
    }

    /// Run one connection from connect to disconnect.
    async fn handle_websocket(&self, mut conn: WebSocketConnection) -> RelayResult<()> {
        let (session_id, outbound_rx) = self.lifecycle.connect().await;
        info!(remote = %conn.remote_addr, session_id = %session_id, "handling WebSocket connection");

        let result = self.session_loop(&mut conn, &session_id, outbound_rx).await;
        self.lifecycle.disconnect(&session_id).await;
        result
    }

    /// Pump outbound events to the socket and inbound frames to the relay.
    async fn session_loop(
        &self,
        conn: &mut WebSocketConnection,
        session_id: &str,
        mut outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
    ) -> RelayResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(session_id, "shutdown signal received, closing socket");
                    websocket::ws_close(&mut conn.ws_stream).await;
                    break;
                }

                Some(event) = outbound_rx.recv() => {
                    let frame = encode_event(&event)?;
                    websocket::ws_send_text(&mut conn.ws_stream, &frame).await?;
                }

                ws_result = websocket::ws_recv_text(&mut conn.ws_stream) => {
                    match ws_result {
                        Ok(Some(text)) => match decode_event::<InboundEvent>(&text) {
                            Ok(event) => self.dispatch(session_id, event).await,
                            Err(e) => warn!(session_id, error = %e, "ignoring malformed frame"),
                        },
                        Ok(None) => {
                            debug!(session_id, "WebSocket session ended (peer closed)");
                            break;
                        }
                        Err(e) => {
                            debug!(session_id, error = %e, "WebSocket session ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Route one inbound event to the lifecycle manager or the relay.
    async fn dispatch(&self, session_id: &str, event: InboundEvent) {
        debug!(session_id, event = event.name(), "inbound event");
        match event {
            InboundEvent::RegisterClient(p) => {
                if self.lifecycle.state(session_id).await == SessionState::Registered {
                    warn!(session_id, "session registered again, replacing client and history");
                }
                self.lifecycle.register(session_id, p.name.as_deref()).await;
            }
            InboundEvent::CreateTerminal(p) => {
                self.relay.create_terminal(session_id, p.name.as_deref()).await;
            }
            InboundEvent::RenameTerminal(p) => {
                self.relay
                    .rename_terminal(session_id, &p.terminal_id, &p.name)
                    .await;
            }
            InboundEvent::ExecuteCommand(p) => {
                self.relay
                    .execute_command(session_id, &p.command, &p.terminal_id)
                    .await;
            }
            InboundEvent::CommandResult(p) => {
                self.relay
                    .command_result(&p.command, p.result.as_deref(), &p.terminal_id)
                    .await;
            }
            InboundEvent::StopCommand(p) => {
                self.relay
                    .stop_command(p.command.as_deref(), &p.terminal_id)
                    .await;
            }
            InboundEvent::ClearTerminal(p) => {
                self.relay.clear_terminal(session_id, &p.terminal_id).await;
            }
            InboundEvent::CloseTerminal(p) => {
                self.relay.close_terminal(session_id, &p.terminal_id).await;
            }
        }
    }
}

/// Wait for running session loops, aborting any still open after the timeout.
async fn drain_sessions(sessions: &mut JoinSet<()>) {
    if sessions.is_empty() {
        return;
    }
    info!(sessions = sessions.len(), "waiting for sessions to close");
    let drained = tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(remaining = sessions.len(), "sessions still open after shutdown timeout, aborting");
        sessions.abort_all();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, Stream, StreamExt};
    use termrelay_core::messages::*;
    use termrelay_core::{ClientStatus, CommandStatus};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> (Arc<RelayServer>, String, JoinHandle<RelayResult<()>>) {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            grace_period: Duration::from_secs(60),
        };
        let (addr, ws_rx) = websocket::start_listener(config.bind_addr).await.unwrap();
        let server = Arc::new(RelayServer::new(config));
        let run = tokio::spawn(server.clone().run(ws_rx));
        (server, format!("ws://{addr}"), run)
    }

    async fn connect(url: &str) -> TestSocket {
        tokio_tungstenite::connect_async(url).await.unwrap().0
    }

    async fn send(ws: &mut TestSocket, event: InboundEvent) {
        let text = encode_event(&event).unwrap();
        ws.send(Message::Text(text.into())).await.unwrap();
    }

    async fn next_event<S>(ws: &mut S) -> OutboundEvent
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let next = async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return decode_event(&text).unwrap(),
                    Some(Ok(_)) => continue,
                    other => panic!("socket ended: {other:?}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), next)
            .await
            .expect("timed out waiting for event")
    }

    /// Next event with the given name, skipping anything else.
    ///
    /// A socket may or may not be attached in time to see a registration
    /// that raced its own handshake, so client list updates are not ordered
    /// relative to the test's own sends.
    async fn recv_named<S>(ws: &mut S, name: &str) -> OutboundEvent
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            let event = next_event(ws).await;
            if event.name() == name {
                return event;
            }
        }
    }

    /// Skip client list updates until one with `count` entries arrives.
    async fn recv_client_list(ws: &mut TestSocket, count: usize) -> Vec<Client> {
        loop {
            if let OutboundEvent::ClientListUpdated(clients) =
                recv_named(ws, "client_list_updated").await
            {
                if clients.len() == count {
                    return clients;
                }
            }
        }
    }

    async fn register(ws: &mut TestSocket, name: &str) {
        send(
            ws,
            InboundEvent::RegisterClient(RegisterClientPayload {
                name: Some(name.into()),
            }),
        )
        .await;
    }

    fn execute(command: &str, terminal_id: &str) -> InboundEvent {
        InboundEvent::ExecuteCommand(ExecuteCommandPayload {
            command: command.into(),
            terminal_id: terminal_id.into(),
        })
    }

    #[tokio::test]
    async fn console_and_executor_round_trip() {
        let (server, url, _run) = start().await;
        let mut web = connect(&url).await;
        let mut exec = connect(&url).await;

        register(&mut web, "Web Terminal").await;
        assert_eq!(recv_client_list(&mut web, 1).await[0].name, "Web Terminal");

        register(&mut exec, "executor").await;
        recv_client_list(&mut exec, 2).await;
        recv_client_list(&mut web, 2).await;

        send(
            &mut web,
            InboundEvent::CreateTerminal(CreateTerminalPayload {
                name: Some("T1".into()),
            }),
        )
        .await;
        let terminal = match recv_named(&mut web, "terminal_created").await {
            OutboundEvent::TerminalCreated(t) => t,
            other => panic!("expected terminal_created, got {other:?}"),
        };
        assert_eq!(terminal.name, "T1");

        send(&mut web, execute("ls", &terminal.id)).await;
        // Sender sees its own fan-out before the acknowledgement.
        assert_eq!(next_event(&mut web).await.name(), "command_to_execute");
        assert_eq!(next_event(&mut web).await.name(), "command_sent");
        let web_id = match recv_named(&mut exec, "command_to_execute").await {
            OutboundEvent::CommandToExecute(p) => {
                assert_eq!(p.command, "ls");
                assert_eq!(p.terminal_id, terminal.id);
                p.source_id
            }
            other => panic!("expected command_to_execute, got {other:?}"),
        };

        send(
            &mut exec,
            InboundEvent::CommandResult(CommandResultPayload {
                command: "ls".into(),
                result: Some("file1\nfile2".into()),
                terminal_id: terminal.id.clone(),
            }),
        )
        .await;
        for ws in [&mut web, &mut exec] {
            match recv_named(ws, "command_result_received").await {
                OutboundEvent::CommandResultReceived(p) => {
                    assert_eq!(p.result.as_deref(), Some("file1\nfile2"));
                }
                other => panic!("expected command_result_received, got {other:?}"),
            }
        }

        let terminals = server.terminals().await;
        assert_eq!(terminals[0].commands.len(), 1);
        assert_eq!(terminals[0].commands[0].status, CommandStatus::Completed);
        let history = server.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].client_id, web_id);

        // Executor drops: the console sees it go offline but still listed.
        exec.close(None).await.unwrap();
        let clients = recv_client_list(&mut web, 2).await;
        let executor = clients.iter().find(|c| c.name == "executor").unwrap();
        assert_eq!(executor.status, ClientStatus::Disconnected);
        assert_eq!(server.clients().await.len(), 2);
    }

    #[tokio::test]
    async fn command_burst_reaches_idle_executor_in_full() {
        const BURST: usize = 300;
        let (_server, url, _run) = start().await;
        let mut web = connect(&url).await;
        let mut exec = connect(&url).await;

        register(&mut web, "Web Terminal").await;
        recv_client_list(&mut web, 1).await;
        register(&mut exec, "executor").await;
        recv_client_list(&mut exec, 2).await;
        recv_client_list(&mut web, 2).await;

        // Read the console side concurrently so neither socket stalls.
        let (mut web_tx, mut web_rx) = web.split();
        let acks = tokio::spawn(async move {
            for _ in 0..BURST {
                recv_named(&mut web_rx, "command_sent").await;
            }
        });
        for n in 0..BURST {
            let text = encode_event(&execute(&format!("echo {n}"), "terminal-0")).unwrap();
            web_tx.send(Message::Text(text.into())).await.unwrap();
        }

        for n in 0..BURST {
            match recv_named(&mut exec, "command_to_execute").await {
                OutboundEvent::CommandToExecute(p) => assert_eq!(p.command, format!("echo {n}")),
                other => panic!("expected command_to_execute, got {other:?}"),
            }
        }
        acks.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_keeps_connection_open() {
        let (_server, url, _run) = start().await;
        let mut web = connect(&url).await;

        web.send(Message::Text("{not json".to_string().into()))
            .await
            .unwrap();
        web.send(Message::Text(r#"{"event":"nope","data":{}}"#.to_string().into()))
            .await
            .unwrap();
        register(&mut web, "Web Terminal").await;

        assert_eq!(recv_client_list(&mut web, 1).await[0].name, "Web Terminal");
    }

    #[tokio::test]
    async fn terminal_replies_go_to_sender_only() {
        let (_server, url, _run) = start().await;
        let mut web = connect(&url).await;
        let mut other = connect(&url).await;
        register(&mut other, "watcher").await;
        recv_client_list(&mut other, 1).await;

        send(&mut web, InboundEvent::CreateTerminal(CreateTerminalPayload::default())).await;
        let terminal = match recv_named(&mut web, "terminal_created").await {
            OutboundEvent::TerminalCreated(t) => t,
            other => panic!("expected terminal_created, got {other:?}"),
        };
        assert_eq!(terminal.name, "Terminal-1");

        send(
            &mut web,
            InboundEvent::CloseTerminal(TerminalRefPayload {
                terminal_id: terminal.id.clone(),
            }),
        )
        .await;
        assert_eq!(
            recv_named(&mut web, "terminal_closed").await,
            OutboundEvent::TerminalClosed(TerminalRefPayload {
                terminal_id: terminal.id,
            })
        );

        // The watcher only ever sees broadcasts: the stop request is the next one.
        send(
            &mut web,
            InboundEvent::StopCommand(StopCommandPayload {
                command: None,
                terminal_id: "terminal-0".into(),
            }),
        )
        .await;
        assert_eq!(next_event(&mut other).await.name(), "stop_command_request");
    }

    #[tokio::test]
    async fn shutdown_closes_sessions_before_run_returns() {
        let (server, url, run) = start().await;
        let mut web = connect(&url).await;
        register(&mut web, "Web Terminal").await;
        recv_client_list(&mut web, 1).await;

        server.shutdown();
        let finished = tokio::time::timeout(Duration::from_secs(5), run).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));

        // The close frame was written before run returned.
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match web.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());
        assert_eq!(server.lifecycle.pending_evictions().await, 0);
        assert_eq!(server.clients().await[0].status, ClientStatus::Disconnected);
    }
}
