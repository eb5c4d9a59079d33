//! Application-facing client handle.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use vex_core::{Call, Environment, Keyring, Reply, Session, SessionInfo, SessionState};
use vex_proto::{
    Channel, ChannelRequest, ChatMessage, ChatRequest, FileRecord, FileRequest, Frame,
    HistoryRequest, IdentityRequest, Permission, PermissionGrant, PermissionRequest, Request,
    User, UserRequest,
};

use crate::{
    config::ClientConfig,
    error::ClientError,
    notify::{Notifier, Subscriptions},
    runtime::{Command, Runtime, Waiter},
    system_env::SystemEnv,
    transport::{Connector, WsConnector},
};

/// Snapshot returned by [`Client::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Whether the handshake is complete
    pub authed: bool,
    /// Our account record, once known
    pub client: Option<User>,
    /// WebSocket endpoint
    pub websocket_url: String,
    /// Whether the connection uses TLS
    pub secure: bool,
    /// Session lifecycle state
    pub state: SessionState,
    /// Pinned server key
    pub server_key: Option<String>,
    /// Channels that will be rejoined after a reconnect
    pub channels: Vec<String>,
}

/// Handle to a running session.
///
/// Cheap to clone; all clones talk to the same runtime task. The runtime shuts
/// down and closes the connection once the last handle is dropped.
///
/// ```no_run
/// # async fn example() -> Result<(), vex_client::ClientError> {
/// use vex_client::{Client, ClientConfig};
/// use vex_core::Ed25519Keyring;
///
/// let env = vex_client::SystemEnv::new();
/// let keyring = Ed25519Keyring::generate(&env);
/// let client = Client::connect(ClientConfig::new("chat.example.com"), keyring);
/// client.wait_ready().await?;
/// client.register().await?;
/// client.auth().await?;
/// client.channels().join("general").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    subscriptions: Subscriptions,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Start a session over WebSocket.
    ///
    /// Must be called within a tokio runtime. Connecting happens in the
    /// background; use [`Client::wait_ready`] to wait for the first open.
    pub fn connect<K: Keyring>(config: ClientConfig, keyring: K) -> Self {
        Self::with_connector(config, keyring, WsConnector::new(), SystemEnv::new())
    }

    /// Start a session over a custom transport and environment.
    pub fn with_connector<C, E, K>(config: ClientConfig, keyring: K, connector: C, env: E) -> Self
    where
        C: Connector,
        E: Environment,
        K: Keyring,
    {
        if !config.secure {
            warn!(host = %config.host, "insecure connection; use only for development");
        }

        let notifier = Notifier::new(config.notification_buffer);
        let subscriptions = notifier.subscriptions();
        let (commands, receiver) = mpsc::channel(config.command_buffer.max(1));

        let session = Session::new(env.clone(), keyring, config.session.clone());
        let runtime = Runtime::new(session, env, connector, receiver, notifier, &config);
        tokio::spawn(runtime.run());

        Self { commands, subscriptions, config: Arc::new(config) }
    }

    /// Configuration this client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Notification subscriptions.
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Wait until the first connection has opened.
    ///
    /// Returns immediately if that already happened.
    ///
    /// # Errors
    ///
    /// [`ClientError::RuntimeClosed`] if the runtime stopped first.
    pub async fn wait_ready(&self) -> Result<(), ClientError> {
        let mut ready = self.subscriptions.ready();
        ready.wait_for(|ready| *ready).await.map_err(|_| ClientError::RuntimeClosed)?;
        Ok(())
    }

    /// Create an account and bind this client's key to it.
    ///
    /// # Errors
    ///
    /// Fails if either round trip fails or the server's records don't decode.
    pub async fn register(&self) -> Result<User, ClientError> {
        let created: User =
            self.rpc(Request::Identity(IdentityRequest::Create)).await?.decode_data()?;
        let reply = self.call(Call::RegisterIdentity { user_id: created.user_id }).await?;
        Ok(expect_frame(reply, "register")?.decode_data()?)
    }

    /// Complete the mutual handshake. Returns the pinned server key.
    ///
    /// Resolves immediately if already authenticated.
    ///
    /// # Errors
    ///
    /// Fails with [`CallError::Auth`](vex_core::CallError::Auth) if the server
    /// presents the wrong key or signature, or with a timeout if it never
    /// answers.
    pub async fn auth(&self) -> Result<String, ClientError> {
        match self.request(|waiter| Command::Authenticate { waiter }).await? {
            Reply::Authenticated { server_key } => Ok(server_key),
            _ => Err(ClientError::UnexpectedReply("auth")),
        }
    }

    /// Close the connection for good. Outstanding calls fail.
    ///
    /// # Errors
    ///
    /// [`ClientError::RuntimeClosed`] if the runtime already stopped.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let (done, finished) = oneshot::channel();
        self.commands.send(Command::Logout { done }).await.map_err(|_| ClientError::RuntimeClosed)?;
        finished.await.map_err(|_| ClientError::RuntimeClosed)
    }

    /// Current session snapshot.
    ///
    /// # Errors
    ///
    /// [`ClientError::RuntimeClosed`] if the runtime stopped.
    pub async fn info(&self) -> Result<ClientInfo, ClientError> {
        let (reply, snapshot) = oneshot::channel();
        self.commands.send(Command::Info { reply }).await.map_err(|_| ClientError::RuntimeClosed)?;
        let SessionInfo { state, authed, client, server_key, channels, .. } =
            snapshot.await.map_err(|_| ClientError::RuntimeClosed)?;

        Ok(ClientInfo {
            authed,
            client,
            websocket_url: self.config.websocket_url(),
            secure: self.config.secure,
            state,
            server_key,
            channels,
        })
    }

    /// Channel operations.
    pub fn channels(&self) -> Channels<'_> {
        Channels { client: self }
    }

    /// Chat and history.
    pub fn messages(&self) -> Messages<'_> {
        Messages { client: self }
    }

    /// Moderation.
    pub fn users(&self) -> Users<'_> {
        Users { client: self }
    }

    /// File sharing.
    pub fn files(&self) -> Files<'_> {
        Files { client: self }
    }

    /// Channel permission grants.
    pub fn permissions(&self) -> Permissions<'_> {
        Permissions { client: self }
    }

    async fn request(&self, command: impl FnOnce(Waiter) -> Command) -> Result<Reply, ClientError> {
        let (waiter, outcome) = oneshot::channel();
        self.commands.send(command(waiter)).await.map_err(|_| ClientError::RuntimeClosed)?;
        Ok(outcome.await.map_err(|_| ClientError::RuntimeClosed)??)
    }

    async fn call(&self, call: Call) -> Result<Reply, ClientError> {
        self.request(|waiter| Command::Call { call, waiter }).await
    }

    async fn rpc(&self, request: Request) -> Result<Frame, ClientError> {
        expect_frame(self.call(Call::Rpc(request)).await?, "request")
    }
}

fn expect_frame(reply: Reply, operation: &'static str) -> Result<Frame, ClientError> {
    match reply {
        Reply::Frame(frame) => Ok(frame),
        _ => Err(ClientError::UnexpectedReply(operation)),
    }
}

/// Channel operations. See [`Client::channels`].
#[derive(Debug, Clone, Copy)]
pub struct Channels<'a> {
    client: &'a Client,
}

impl Channels<'_> {
    /// Visible channels, from the last pushed list when there is one.
    ///
    /// # Errors
    ///
    /// Fails if the round trip fails or the list doesn't decode.
    pub async fn retrieve(&self) -> Result<Vec<Channel>, ClientError> {
        match self.client.call(Call::RetrieveChannels).await? {
            Reply::Channels(channels) => Ok(channels),
            Reply::Frame(frame) => {
                Ok(frame.decode_data::<Option<Vec<Channel>>>()?.unwrap_or_default())
            },
            _ => Err(ClientError::UnexpectedReply("channel retrieve")),
        }
    }

    /// Create a channel.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn create(&self, name: &str, private: bool) -> Result<Channel, ClientError> {
        let request = ChannelRequest::Create { name: name.to_owned(), private_channel: private };
        Ok(self.client.rpc(Request::Channel(request)).await?.decode_data()?)
    }

    /// Join a channel. `Ok(None)` if it was already joined.
    ///
    /// Joined channels are rejoined automatically after a reconnect.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the join.
    pub async fn join(&self, channel_id: &str) -> Result<Option<Channel>, ClientError> {
        match self.client.call(Call::Join { channel_id: channel_id.to_owned() }).await? {
            Reply::AlreadyJoined => Ok(None),
            Reply::Frame(frame) => Ok(Some(frame.decode_data()?)),
            _ => Err(ClientError::UnexpectedReply("channel join")),
        }
    }

    /// Leave a channel.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn leave(&self, channel_id: &str) -> Result<(), ClientError> {
        self.client.call(Call::Leave { channel_id: channel_id.to_owned() }).await?;
        Ok(())
    }

    /// Delete a channel.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn delete(&self, channel_id: &str) -> Result<(), ClientError> {
        let request = ChannelRequest::Delete { channel_id: channel_id.to_owned() };
        self.client.rpc(Request::Channel(request)).await?;
        Ok(())
    }

    /// Users online in a channel, from the last pushed list when there is one.
    ///
    /// # Errors
    ///
    /// Fails if the round trip fails or the list doesn't decode.
    pub async fn active(&self, channel_id: &str) -> Result<Vec<User>, ClientError> {
        match self.client.call(Call::ActiveUsers { channel_id: channel_id.to_owned() }).await? {
            Reply::OnlineUsers(users) => Ok(users),
            Reply::Frame(frame) => {
                Ok(frame.decode_data::<Option<Vec<User>>>()?.unwrap_or_default())
            },
            _ => Err(ClientError::UnexpectedReply("channel active")),
        }
    }
}

/// Chat and history. See [`Client::messages`].
#[derive(Debug, Clone, Copy)]
pub struct Messages<'a> {
    client: &'a Client,
}

impl Messages<'_> {
    /// Messages posted after `after`, or the whole history when `None`.
    ///
    /// # Errors
    ///
    /// Fails if the round trip fails or the messages don't decode.
    pub async fn retrieve(
        &self,
        channel_id: &str,
        after: Option<&str>,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let request = Request::History(HistoryRequest::since(channel_id, after));
        let frame = self.client.rpc(request).await?;
        Ok(frame.decode_data::<Option<Vec<ChatMessage>>>()?.unwrap_or_default())
    }

    /// Post a message.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the message.
    pub async fn send(&self, channel_id: &str, message: &str) -> Result<(), ClientError> {
        let request =
            ChatRequest::Create { channel_id: channel_id.to_owned(), message: message.to_owned() };
        self.client.rpc(Request::Chat(request)).await?;
        Ok(())
    }
}

/// Moderation. See [`Client::users`].
#[derive(Debug, Clone, Copy)]
pub struct Users<'a> {
    client: &'a Client,
}

impl Users<'_> {
    /// Change a user's power level.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the change.
    pub async fn update(&self, user_id: &str, power_level: i64) -> Result<(), ClientError> {
        self.send(UserRequest::Update { user_id: user_id.to_owned(), power_level }).await
    }

    /// Disconnect a user.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn kick(&self, user_id: &str) -> Result<(), ClientError> {
        self.send(UserRequest::Kick { user_id: user_id.to_owned() }).await
    }

    /// Ban a user.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn ban(&self, user_id: &str) -> Result<(), ClientError> {
        self.send(UserRequest::Ban { user_id: user_id.to_owned() }).await
    }

    async fn send(&self, request: UserRequest) -> Result<(), ClientError> {
        self.client.rpc(Request::User(request)).await?;
        Ok(())
    }
}

/// File sharing. See [`Client::files`].
#[derive(Debug, Clone, Copy)]
pub struct Files<'a> {
    client: &'a Client,
}

impl Files<'_> {
    /// Upload a file to a channel.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the upload.
    pub async fn create(
        &self,
        contents: &[u8],
        file_name: &str,
        channel_id: &str,
    ) -> Result<FileRecord, ClientError> {
        let request = FileRequest::Create {
            channel_id: channel_id.to_owned(),
            file: hex::encode(contents),
            file_name: file_name.to_owned(),
        };
        let record = self.client.rpc(Request::File(request)).await?.decode_data()?;
        Ok(self.locate(record))
    }

    /// Files shared in a channel.
    ///
    /// # Errors
    ///
    /// Fails if the round trip fails or the records don't decode.
    pub async fn retrieve(&self, channel_id: &str) -> Result<Vec<FileRecord>, ClientError> {
        let request = FileRequest::Retrieve { channel_id: channel_id.to_owned() };
        let frame = self.client.rpc(Request::File(request)).await?;
        let records = frame.decode_data::<Option<Vec<FileRecord>>>()?.unwrap_or_default();
        Ok(records.into_iter().map(|record| self.locate(record)).collect())
    }

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn delete(&self, file_id: &str) -> Result<(), ClientError> {
        let request = FileRequest::Delete { file_id: file_id.to_owned() };
        self.client.rpc(Request::File(request)).await?;
        Ok(())
    }

    fn locate(&self, mut record: FileRecord) -> FileRecord {
        record.url = self.client.config.file_url(&record.file_id);
        record
    }
}

/// Channel permission grants. See [`Client::permissions`].
#[derive(Debug, Clone, Copy)]
pub struct Permissions<'a> {
    client: &'a Client,
}

impl Permissions<'_> {
    /// Grant a user access to a channel.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the grant.
    pub async fn create(&self, user_id: &str, channel_id: &str) -> Result<Permission, ClientError> {
        let permission = grant(user_id, channel_id);
        let request = Request::Permission(PermissionRequest::Create { permission });
        let frame = self.client.rpc(request).await?;
        Ok(frame.decode_data()?)
    }

    /// Revoke a user's access to a channel.
    ///
    /// # Errors
    ///
    /// Fails if the server rejects the request.
    pub async fn delete(&self, user_id: &str, channel_id: &str) -> Result<(), ClientError> {
        let permission = grant(user_id, channel_id);
        self.client.rpc(Request::Permission(PermissionRequest::Delete { permission })).await?;
        Ok(())
    }
}

fn grant(user_id: &str, channel_id: &str) -> PermissionGrant {
    PermissionGrant { user_id: user_id.to_owned(), channel_id: channel_id.to_owned() }
}
