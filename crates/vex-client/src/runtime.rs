//! Actor task that owns the session and the transport.
//!
//! Client handles talk to the runtime over a command channel. The runtime
//! feeds commands, inbound frames and clock ticks into the session engine
//! and executes the actions it returns, in order. A failed send is fed back
//! before the next action runs, so the engine observes transport changes in
//! the order they happen.
//!
//! Connect attempts run in their own task under a deadline. The loop keeps
//! serving commands and ticks while a handshake is in flight, and the result
//! comes back as one more `select!` branch.

use std::{collections::VecDeque, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};
use vex_core::{
    Call, CallError, Environment, Keyring, Reply, Session, SessionAction, SessionEvent,
    SessionInfo, SessionState,
};

use crate::{
    config::ClientConfig,
    error::TransportError,
    notify::Notifier,
    transport::{Connector, Transport},
};

/// Delivery slot for one call outcome.
pub(crate) type Waiter = oneshot::Sender<Result<Reply, CallError>>;

/// Requests from client handles.
#[derive(Debug)]
pub(crate) enum Command {
    Call { call: Call, waiter: Waiter },
    Authenticate { waiter: Waiter },
    Logout { done: oneshot::Sender<()> },
    Info { reply: oneshot::Sender<SessionInfo> },
}

/// Connector handed back together with the outcome of its attempt.
type ConnectOutcome<C> = (C, Result<<C as Connector>::Transport, TransportError>);

/// The runtime actor.
pub(crate) struct Runtime<C: Connector, E: Environment, K: Keyring> {
    session: Session<E, K, Waiter>,
    env: E,
    /// `None` while a connect attempt owns it.
    connector: Option<C>,
    connecting: Option<JoinHandle<ConnectOutcome<C>>>,
    transport: Option<C::Transport>,
    url: String,
    commands: mpsc::Receiver<Command>,
    notifier: Notifier,
    tick_interval: Duration,
    connect_timeout: Duration,
}

impl<C, E, K> Runtime<C, E, K>
where
    C: Connector,
    E: Environment,
    K: Keyring,
{
    pub(crate) fn new(
        session: Session<E, K, Waiter>,
        env: E,
        connector: C,
        commands: mpsc::Receiver<Command>,
        notifier: Notifier,
        config: &ClientConfig,
    ) -> Self {
        Self {
            session,
            env,
            connector: Some(connector),
            connecting: None,
            transport: None,
            url: config.websocket_url(),
            commands,
            notifier,
            tick_interval: config.tick_interval,
            connect_timeout: config.connect_timeout,
        }
    }

    /// Run until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        let actions = self.session.start(self.env.now());
        self.execute(actions).await;

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                },
                inbound = next_inbound(&mut self.transport) => {
                    self.handle_inbound(inbound).await;
                },
                outcome = next_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.handle_connected(outcome).await;
                },
                _ = ticker.tick() => {
                    let actions = self.session.handle(SessionEvent::Tick { now: self.env.now() });
                    self.execute(actions).await;
                },
            }
        }

        info!("all client handles dropped, shutting down");
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let now = self.env.now();
        let actions = match command {
            Command::Call { call, waiter } => {
                self.session.handle(SessionEvent::Call { call, waiter, now })
            },
            Command::Authenticate { waiter } => {
                self.session.handle(SessionEvent::Authenticate { waiter, now })
            },
            Command::Logout { done } => {
                let actions = self.session.handle(SessionEvent::Logout);
                self.execute(actions).await;
                let _ = done.send(());
                return;
            },
            Command::Info { reply } => {
                let _ = reply.send(self.session.info());
                return;
            },
        };
        self.execute(actions).await;
    }

    async fn handle_inbound(&mut self, inbound: Option<Result<String, TransportError>>) {
        let now = self.env.now();
        let event = match inbound {
            Some(Ok(text)) => SessionEvent::TextReceived { text, now },
            Some(Err(err)) => {
                self.transport = None;
                SessionEvent::TransportFailed { now, reason: err.to_string() }
            },
            None => {
                self.transport = None;
                SessionEvent::TransportClosed { now, reason: "closed by server".to_string() }
            },
        };
        let actions = self.session.handle(event);
        self.execute(actions).await;
    }

    /// Starts a connect attempt in its own task.
    fn begin_connect(&mut self) {
        let Some(mut connector) = self.connector.take() else {
            if self.connecting.is_some() {
                debug!("connect already in flight");
            } else {
                error!("connector lost; cannot reconnect");
            }
            return;
        };

        debug!(url = %self.url, "connecting");
        let url = self.url.clone();
        let limit = self.connect_timeout;
        self.connecting = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Connect(format!("no handshake within {limit:?}"))),
            };
            (connector, result)
        }));
    }

    async fn handle_connected(&mut self, outcome: Result<ConnectOutcome<C>, JoinError>) {
        let now = self.env.now();
        let event = match outcome {
            Ok((connector, result)) => {
                self.connector = Some(connector);
                match result {
                    Ok(mut transport) => {
                        // Logout won the race; nobody wants this connection.
                        if self.session.state() != SessionState::Connecting {
                            debug!(state = ?self.session.state(), "discarding late connection");
                            transport.close().await;
                            return;
                        }
                        self.transport = Some(transport);
                        SessionEvent::TransportOpened { now }
                    },
                    Err(err) => {
                        warn!(error = %err, "connect failed");
                        SessionEvent::TransportFailed { now, reason: err.to_string() }
                    },
                }
            },
            Err(err) => {
                error!(error = %err, "connect task died");
                SessionEvent::TransportFailed { now, reason: err.to_string() }
            },
        };
        let actions = self.session.handle(event);
        self.execute(actions).await;
    }

    async fn execute(&mut self, actions: Vec<SessionAction<Waiter>>) {
        let mut queue: VecDeque<_> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Connect => self.begin_connect(),
                SessionAction::Send(frame) => {
                    let Some(transport) = self.transport.as_mut() else {
                        debug!(kind = frame.kind(), "no transport, dropping frame");
                        continue;
                    };
                    if let Err(err) = transport.send(frame.to_string()).await {
                        warn!(error = %err, "send failed");
                        self.transport = None;
                        queue.extend(self.session.handle(SessionEvent::TransportFailed {
                            now: self.env.now(),
                            reason: err.to_string(),
                        }));
                    }
                },
                SessionAction::Close { reason } => {
                    if let Some(mut transport) = self.transport.take() {
                        debug!(%reason, "closing transport");
                        transport.close().await;
                    }
                },
                SessionAction::Complete { waiter, outcome } => {
                    // Caller may have given up on the result.
                    let _ = waiter.send(outcome);
                },
                SessionAction::Notify(notification) => self.notifier.publish(notification),
            }
        }
    }
}

/// Next inbound frame, or never if there is no transport.
async fn next_inbound<T: Transport>(
    transport: &mut Option<T>,
) -> Option<Result<String, TransportError>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

/// Outcome of the connect attempt in flight, or never if there is none.
async fn next_connect<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}
