use std::io;

use clap::ValueEnum;
use enumflags2::{BitFlags, bitflags};
use imap_proto::{Response, ResponseCode, Status};
use log::{debug, info, trace};
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_native_tls::{TlsConnector, TlsStream, native_tls};

use crate::{
    imap::{
        connection::Connection,
        session::{ImapSession, quote},
    },
    session::ProtocolError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS from the first byte
    #[default]
    Implicit,
    /// Plain connection upgraded with STARTTLS
    Starttls,
    /// No encryption at all
    Plain,
}

impl TlsMode {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Implicit => 993,
            Self::Starttls | Self::Plain => 143,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        source: native_tls::Error,
    },
    #[error("server does not offer STARTTLS")]
    StartTlsUnavailable,
    #[error("server refused the connection: {0}")]
    Refused(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("server does not allow LOGIN on this connection")]
    LoginDisabled,
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    Imap4rev1,
    LoginDisabled,
    StartTls,
    UidPlus,
}

#[derive(Debug, Default)]
pub struct Capabilities {
    capabilities: BitFlags<Capability>,
}

impl Capabilities {
    pub fn insert(&mut self, capability: &imap_proto::Capability) {
        match capability {
            imap_proto::Capability::Imap4rev1 => {
                self.capabilities.insert(Capability::Imap4rev1);
            }
            imap_proto::Capability::Auth(mechanism) => {
                trace!("auth mechanism {mechanism}");
            }
            imap_proto::Capability::Atom(atom) => {
                let flag = match atom.to_ascii_uppercase().as_str() {
                    "LOGINDISABLED" => Capability::LoginDisabled,
                    "STARTTLS" => Capability::StartTls,
                    "UIDPLUS" => Capability::UidPlus,
                    _ => {
                        trace!("unused capability {atom}");
                        return;
                    }
                };
                self.capabilities.insert(flag);
            }
        }
    }

    pub fn contains(&self, other: Capability) -> bool {
        self.capabilities.contains(other)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// A connection that has been greeted but is not logged in yet.
#[derive(Debug)]
pub struct Client {
    connection: Connection,
    capabilities: Capabilities,
    preauthenticated: bool,
}

impl Client {
    /// Connects to `host`. A `port` of 0 picks the default port of `tls`.
    pub async fn connect(host: &str, port: u16, tls: TlsMode) -> Result<Self, ConnectionError> {
        let port = if port == 0 { tls.default_port() } else { port };
        debug!("connecting to {host}:{port} ({tls:?})");
        let stream =
            TcpStream::connect((host, port))
                .await
                .map_err(|source| ConnectionError::Connect {
                    host: host.to_string(),
                    port,
                    source,
                })?;

        let client = match tls {
            TlsMode::Implicit => Self::greet(Connection::new(upgrade(host, stream).await?)).await?,
            TlsMode::Starttls => Self::greet(Connection::new(stream)).await?.start_tls(host).await?,
            TlsMode::Plain => Self::greet(Connection::new(stream)).await?,
        };
        info!("connected to {host}:{port}");
        Ok(client)
    }

    async fn greet(mut connection: Connection) -> Result<Self, ConnectionError> {
        let greeting = connection.greeting().await?;
        let mut capabilities = Capabilities::default();
        let preauthenticated = match greeting.parsed() {
            Response::Data {
                status: status @ (Status::Ok | Status::PreAuth),
                code,
                ..
            } => {
                if let Some(ResponseCode::Capabilities(list)) = code {
                    for capability in &list {
                        capabilities.insert(capability);
                    }
                }
                matches!(status, Status::PreAuth)
            }
            Response::Data {
                status: Status::Bye,
                information,
                ..
            } => {
                return Err(ConnectionError::Refused(
                    information.map(|text| text.into_owned()).unwrap_or_default(),
                ));
            }
            _ => return Err(ConnectionError::Refused(format!("{greeting:?}"))),
        };

        let mut client = Self {
            connection,
            capabilities,
            preauthenticated,
        };
        if client.capabilities.is_empty() {
            client.refresh_capabilities().await?;
        }
        Ok(client)
    }

    async fn start_tls(mut self, host: &str) -> Result<Self, ConnectionError> {
        if !self.capabilities.contains(Capability::StartTls) {
            return Err(ConnectionError::StartTlsUnavailable);
        }
        self.connection.send("STARTTLS").await?;
        let (io, tags) = self.connection.into_parts();
        let mut client = Self {
            connection: Connection::from_parts(upgrade(host, io).await?, tags),
            capabilities: Capabilities::default(),
            preauthenticated: self.preauthenticated,
        };
        debug!("switched to TLS");
        client.refresh_capabilities().await?;
        Ok(client)
    }

    async fn refresh_capabilities(&mut self) -> Result<(), ProtocolError> {
        let responses = self.connection.send("CAPABILITY").await?;
        let mut capabilities = Capabilities::default();
        for response in &responses {
            if let Response::Capabilities(list) = response.parsed() {
                for capability in &list {
                    capabilities.insert(capability);
                }
            }
        }
        self.capabilities = capabilities;
        Ok(())
    }

    pub async fn login(mut self, user: &str, password: &str) -> Result<ImapSession, AuthError> {
        if self.preauthenticated {
            debug!("server pre-authenticated the connection, skipping login");
        } else {
            if self.capabilities.contains(Capability::LoginDisabled) {
                return Err(AuthError::LoginDisabled);
            }
            match self
                .connection
                .send(&format!("LOGIN {} {}", quote(user), quote(password)))
                .await
            {
                Ok(_) => info!("logged in as {user}"),
                Err(ProtocolError::No { information, .. }) => {
                    return Err(AuthError::Rejected(information));
                }
                Err(e) => return Err(e.into()),
            }
            self.refresh_capabilities().await?;
        }
        Ok(ImapSession::new(self.connection, self.capabilities))
    }
}

async fn upgrade<S>(host: &str, stream: S) -> Result<TlsStream<S>, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tls_error = |source| ConnectionError::Tls {
        host: host.to_string(),
        source,
    };
    let connector = native_tls::TlsConnector::new().map_err(tls_error)?;
    TlsConnector::from(connector)
        .connect(host, stream)
        .await
        .map_err(tls_error)
}
