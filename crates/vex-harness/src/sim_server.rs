//! Scripted in-memory server.
//!
//! `SimServer` speaks enough of the protocol to drive the client end to end:
//! both halves of the handshake, identity, channels, chat with history,
//! files, permissions, moderation and ping. Tests steer it by injecting
//! errors, silencing request kinds, pushing frames and dropping the
//! connection, and inspect it through the log of every frame it received.
//!
//! One connection is served at a time; after it closes the next one is
//! accepted. Control messages that arrive while no client is connected are
//! discarded.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::{Value, json};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;
use vex_core::{Ed25519Keyring, Environment, Keyring};
use vex_proto::{
    ApiError, Channel, ChatMessage, FileRecord, Frame, Permission, User, ZERO_MESSAGE_ID,
};

use crate::{
    SimEnv,
    sim_transport::{Gate, MemoryListener},
};

/// Seed for the server's environment, distinct from any client's default.
const SERVER_SEED: u64 = 0x5eed_5e7e;

enum Control {
    Push(String),
    Close,
}

/// Handle to a running scripted server.
///
/// The server task stops when the handle is dropped.
pub struct SimServer {
    shared: Arc<Mutex<ServerState>>,
    control: mpsc::UnboundedSender<Control>,
    gate: Arc<Gate>,
    task: JoinHandle<()>,
}

impl SimServer {
    /// Start serving `listener` with the default server seed.
    pub fn start(listener: MemoryListener) -> Self {
        Self::with_seed(listener, SERVER_SEED)
    }

    /// Start serving `listener`; keys and ids derive from `seed`.
    pub fn with_seed(listener: MemoryListener, seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let keyring = Ed25519Keyring::generate(&env);
        let shared = Arc::new(Mutex::new(ServerState::new(env, keyring)));
        let gate = listener.gate();
        let (control, commands) = mpsc::unbounded_channel();

        let task = tokio::spawn(serve(listener, Arc::clone(&shared), commands));
        Self { shared, control, gate, task }
    }

    /// Hex public key the server currently signs with.
    pub fn public_key(&self) -> String {
        self.state().keyring.public_key_hex()
    }

    /// Sign with a different key from now on.
    pub fn rotate_key(&self, keyring: Ed25519Keyring) {
        self.state().keyring = keyring;
    }

    /// Every frame received, in arrival order.
    pub fn received(&self) -> Vec<Frame> {
        self.state().received.clone()
    }

    /// Received frames of one `type`, optionally narrowed to one `method`.
    pub fn requests(&self, kind: &str, method: Option<&str>) -> Vec<Frame> {
        self.state()
            .received
            .iter()
            .filter(|frame| frame.kind() == kind)
            .filter(|frame| method.is_none() || frame.method() == method)
            .cloned()
            .collect()
    }

    /// Channel ids of received joins, in order.
    pub fn joins(&self) -> Vec<String> {
        self.requests("channel", Some("JOIN"))
            .iter()
            .filter_map(|frame| frame.str_field("channelID").map(str::to_owned))
            .collect()
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state().connections
    }

    /// Answer the next request matching `target` with an error.
    ///
    /// `target` is a frame `type`, or `type/METHOD` to match one verb.
    pub fn fail_next(&self, target: &str, code: &str, message: &str) {
        let error = ApiError { code: code.to_owned(), message: message.to_owned() };
        self.state().failures.insert(target.to_owned(), error);
    }

    /// Stop answering requests of this `type`.
    pub fn silence(&self, kind: &str) {
        self.state().silenced.insert(kind.to_owned());
    }

    /// Answer requests of this `type` again.
    pub fn resume(&self, kind: &str) {
        self.state().silenced.remove(kind);
    }

    /// Send an unsolicited frame to the connected client.
    pub fn push(&self, frame: &Value) {
        let _ = self.control.send(Control::Push(frame.to_string()));
    }

    /// Send raw text to the connected client.
    pub fn push_raw(&self, text: &str) {
        let _ = self.control.send(Control::Push(text.to_owned()));
    }

    /// Drop the current connection.
    pub fn close_connection(&self) {
        let _ = self.control.send(Control::Close);
    }

    /// Refuse (`true`) or accept (`false`) new connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.gate.refuse(refuse);
    }

    /// Let new connects hang without ever completing (`true`), or not.
    pub fn stall_connections(&self, stall: bool) {
        self.gate.stall(stall);
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        lock(&self.shared)
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for SimServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimServer").finish_non_exhaustive()
    }
}

fn lock(shared: &Mutex<ServerState>) -> MutexGuard<'_, ServerState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn serve(
    mut listener: MemoryListener,
    shared: Arc<Mutex<ServerState>>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    loop {
        let mut connection = tokio::select! {
            connection = listener.accept() => match connection {
                Some(connection) => connection,
                None => return,
            },
            command = control.recv() => match command {
                Some(_) => {
                    debug!("no client connected, dropping control message");
                    continue;
                },
                None => return,
            },
        };

        lock(&shared).connections += 1;
        debug!(url = connection.url(), "sim server accepted connection");
        let mut session = ConnectionState::default();

        loop {
            tokio::select! {
                text = connection.recv() => {
                    let Some(text) = text else { break };
                    let replies = lock(&shared).handle(&mut session, &text);
                    for reply in replies {
                        connection.send(reply.to_string());
                    }
                },
                command = control.recv() => match command {
                    Some(Control::Push(text)) => {
                        connection.send(text);
                    },
                    Some(Control::Close) => break,
                    None => return,
                },
            }
        }

        debug!("sim server connection closed");
    }
}

/// Per-connection handshake state.
#[derive(Default)]
struct ConnectionState {
    /// Our outstanding challenge: (transmission id, nonce)
    challenge: Option<(String, String)>,
}

struct ServerState {
    env: SimEnv,
    keyring: Ed25519Keyring,
    received: Vec<Frame>,
    connections: usize,
    failures: HashMap<String, ApiError>,
    silenced: HashSet<String>,
    channels: Vec<Channel>,
    users: HashMap<String, User>,
    history: HashMap<String, Vec<ChatMessage>>,
    files: Vec<(String, FileRecord)>,
}

impl ServerState {
    fn new(env: SimEnv, keyring: Ed25519Keyring) -> Self {
        Self {
            env,
            keyring,
            received: Vec::new(),
            connections: 0,
            failures: HashMap::new(),
            silenced: HashSet::new(),
            channels: Vec::new(),
            users: HashMap::new(),
            history: HashMap::new(),
            files: Vec::new(),
        }
    }

    /// Frames to send back for one inbound text frame.
    fn handle(&mut self, connection: &mut ConnectionState, text: &str) -> Vec<Value> {
        let Ok(frame) = Frame::parse(text) else {
            debug!(text, "sim server ignoring unparseable frame");
            return Vec::new();
        };
        self.received.push(frame.clone());

        let kind = frame.kind().to_owned();
        let method = frame.method().map(str::to_owned);
        let id = frame.transmission_id().unwrap_or_default().to_owned();

        if self.silenced.contains(&kind) {
            return Vec::new();
        }
        if let Some(error) = self.take_failure(&kind, method.as_deref()) {
            return vec![error_frame(&id, &error.code, &error.message)];
        }

        match (kind.as_str(), method.as_deref()) {
            ("challenge", _) => self.answer_challenge(connection, &frame, &id),
            ("response", _) => vec![self.check_response(connection, &frame, &id)],
            ("ping", _) => vec![json!({ "type": "pong", "transmissionID": id })],
            ("identity", Some("CREATE")) => vec![self.create_identity(&id)],
            ("identity", Some("REGISTER")) => vec![self.register_identity(&frame, &id)],
            ("channel", Some(method)) => vec![self.channel(method, &frame, &id)],
            ("channelPerm", Some(method)) => vec![self.permission(method, &frame, &id)],
            ("user", Some(_)) => vec![success(&id, Value::Null)],
            ("file", Some(method)) => vec![self.file(method, &frame, &id)],
            ("chat", Some("CREATE")) => self.chat(&frame, &id),
            ("historyReq_v2", Some("RETRIEVE")) => vec![self.history(&frame, &id)],
            _ => vec![error_frame(&id, "E_UNKNOWN", "unsupported request")],
        }
    }

    fn take_failure(&mut self, kind: &str, method: Option<&str>) -> Option<ApiError> {
        method
            .and_then(|method| self.failures.remove(&format!("{kind}/{method}")))
            .or_else(|| self.failures.remove(kind))
    }

    /// Signs the client's nonce, then challenges the client in turn.
    fn answer_challenge(
        &mut self,
        connection: &mut ConnectionState,
        frame: &Frame,
        id: &str,
    ) -> Vec<Value> {
        let nonce = frame.str_field("challenge").unwrap_or_default();
        let response = json!({
            "type": "response",
            "transmissionID": id,
            "response": self.keyring.sign_hex(nonce),
            "pubkey": self.keyring.public_key_hex(),
        });

        let challenge_id = self.env.transmission_id().to_string();
        let server_nonce = self.env.nonce();
        let challenge = json!({
            "type": "challenge",
            "transmissionID": challenge_id,
            "challenge": server_nonce,
            "pubkey": self.keyring.public_key_hex(),
        });
        connection.challenge = Some((challenge_id, server_nonce));

        vec![response, challenge]
    }

    fn check_response(&self, connection: &mut ConnectionState, frame: &Frame, id: &str) -> Value {
        let Some((expected, nonce)) = connection.challenge.take() else {
            return error_frame(id, "E_AUTH", "no challenge outstanding");
        };
        if expected != id {
            return error_frame(id, "E_AUTH", "response to unknown challenge");
        }

        let pubkey = frame.str_field("pubkey").unwrap_or_default();
        let signature = frame.str_field("response").unwrap_or_default();
        if self.verify_hex(nonce.as_bytes(), signature, pubkey) {
            success(id, Value::Null)
        } else {
            error_frame(id, "E_AUTH", "signature mismatch")
        }
    }

    fn create_identity(&mut self, id: &str) -> Value {
        let user_id = self.env.transmission_id().to_string();
        let user = User {
            index: self.users.len() as i64 + 1,
            user_id: user_id.clone(),
            username: format!("user-{}", self.users.len() + 1),
            ..User::default()
        };
        self.users.insert(user_id, user.clone());
        success(id, json!(user))
    }

    fn register_identity(&mut self, frame: &Frame, id: &str) -> Value {
        let user_id = frame.str_field("uuid").unwrap_or_default();
        let pubkey = frame.str_field("pubkey").unwrap_or_default();
        let signed = frame.str_field("signed").unwrap_or_default();

        if !self.verify_hex(user_id.as_bytes(), signed, pubkey) {
            return error_frame(id, "E_AUTH", "bad registration signature");
        }
        let Some(user) = self.users.get_mut(user_id) else {
            return error_frame(id, "E_NOT_FOUND", "unknown account");
        };

        user.pubkey = pubkey.to_owned();
        success(id, json!(user))
    }

    fn channel(&mut self, method: &str, frame: &Frame, id: &str) -> Value {
        let channel_id = frame.str_field("channelID").unwrap_or_default().to_owned();

        match method {
            "CREATE" => {
                let private = frame.get("privateChannel").and_then(Value::as_bool).unwrap_or(false);
                let channel = Channel {
                    index: self.channels.len() as i64 + 1,
                    channel_id: self.env.transmission_id().to_string(),
                    public: !private,
                    name: frame.str_field("name").unwrap_or_default().to_owned(),
                    ..Channel::default()
                };
                self.channels.push(channel.clone());
                success(id, json!(channel))
            },
            "JOIN" => {
                let channel = self.find_or_open(&channel_id);
                success(id, json!(channel))
            },
            "LEAVE" => success(id, Value::Null),
            "DELETE" => {
                self.channels.retain(|channel| channel.channel_id != channel_id);
                success(id, Value::Null)
            },
            "RETRIEVE" => success(id, json!(self.channels)),
            "ACTIVE" => success(id, json!([])),
            _ => error_frame(id, "E_UNKNOWN", "unsupported channel verb"),
        }
    }

    /// Channel by id; joining an unknown id opens a public channel under it.
    fn find_or_open(&mut self, channel_id: &str) -> Channel {
        if let Some(channel) = self.channels.iter().find(|c| c.channel_id == channel_id) {
            return channel.clone();
        }

        let channel = Channel {
            index: self.channels.len() as i64 + 1,
            channel_id: channel_id.to_owned(),
            public: true,
            name: channel_id.to_owned(),
            ..Channel::default()
        };
        self.channels.push(channel.clone());
        channel
    }

    fn permission(&mut self, method: &str, frame: &Frame, id: &str) -> Value {
        let grant = frame.get("permission");
        let field = |name: &str| {
            grant.and_then(|g| g.get(name)).and_then(Value::as_str).unwrap_or_default().to_owned()
        };

        match method {
            "CREATE" => {
                let permission = Permission {
                    user_id: field("userID"),
                    channel_id: field("channelID"),
                    power_level: 0,
                };
                success(id, json!(permission))
            },
            "DELETE" => success(id, Value::Null),
            _ => error_frame(id, "E_UNKNOWN", "unsupported permission verb"),
        }
    }

    fn file(&mut self, method: &str, frame: &Frame, id: &str) -> Value {
        match method {
            "CREATE" => {
                if frame.str_field("file").is_none_or(|file| hex::decode(file).is_err()) {
                    return error_frame(id, "E_BAD_REQUEST", "file must be hex");
                }
                let record = FileRecord {
                    index: self.files.len() as i64 + 1,
                    file_id: self.env.transmission_id().to_string(),
                    file_name: frame.str_field("fileName").unwrap_or_default().to_owned(),
                    ..FileRecord::default()
                };
                let channel_id = frame.str_field("channelID").unwrap_or_default().to_owned();
                self.files.push((channel_id, record.clone()));
                success(id, json!(record))
            },
            "RETRIEVE" => {
                let channel_id = frame.str_field("channelID").unwrap_or_default();
                let records: Vec<&FileRecord> = self
                    .files
                    .iter()
                    .filter(|(channel, _)| channel == channel_id)
                    .map(|(_, record)| record)
                    .collect();
                success(id, json!(records))
            },
            "DELETE" => {
                let file_id = frame.str_field("fileID").unwrap_or_default();
                self.files.retain(|(_, record)| record.file_id != file_id);
                success(id, Value::Null)
            },
            _ => error_frame(id, "E_UNKNOWN", "unsupported file verb"),
        }
    }

    /// Stores the message, acknowledges it, and echoes it as a live push.
    fn chat(&mut self, frame: &Frame, id: &str) -> Vec<Value> {
        let channel_id = frame.str_field("channelID").unwrap_or_default().to_owned();
        let log = self.history.entry(channel_id.clone()).or_default();
        let message = ChatMessage {
            index: log.len() as i64 + 1,
            message_id: self.env.transmission_id().to_string(),
            method: "CREATE".to_owned(),
            message: frame.str_field("message").unwrap_or_default().to_owned(),
            channel_id,
            ..ChatMessage::default()
        };
        log.push(message.clone());

        let mut push = json!(message);
        push["type"] = json!("chat");
        vec![success(id, Value::Null), push]
    }

    fn history(&self, frame: &Frame, id: &str) -> Value {
        let channel_id = frame.str_field("channelID").unwrap_or_default();
        let top = frame.str_field("topMessage").unwrap_or(ZERO_MESSAGE_ID);
        let log = self.history.get(channel_id).map(Vec::as_slice).unwrap_or_default();

        let start = log.iter().position(|m| m.message_id == top).map_or(0, |i| i + 1);
        success(id, json!(&log[start..]))
    }

    fn verify_hex(&self, message: &[u8], signature: &str, public_key: &str) -> bool {
        let (Ok(signature), Ok(public_key)) = (hex::decode(signature), hex::decode(public_key))
        else {
            return false;
        };
        self.keyring.verify(message, &signature, &public_key)
    }
}

fn success(id: &str, data: Value) -> Value {
    json!({ "type": "success", "transmissionID": id, "data": data })
}

fn error_frame(id: &str, code: &str, message: &str) -> Value {
    json!({ "type": "error", "transmissionID": id, "Code": code, "Message": message })
}
