use std::{borrow::Cow, fmt::Debug};

use futures::{SinkExt, StreamExt};
use imap_proto::{Request, Response, Status};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{
    imap::{
        codec::{ImapCodec, ResponseData},
        tag_generator::TagGenerator,
    },
    session::ProtocolError,
};

/// Anything a session can run over, plain TCP, TLS or an in-memory pipe.
pub trait ImapIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ImapIo for T {}

pub type ImapStream = Framed<Box<dyn ImapIo>, ImapCodec>;

/// Sends one command at a time and collects the untagged responses that
/// come back before its tagged completion.
pub struct Connection {
    stream: ImapStream,
    tag_generator: TagGenerator,
    closed: bool,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("tag_generator", &self.tag_generator)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(io: impl ImapIo + 'static) -> Self {
        Self {
            stream: Framed::new(Box::new(io), ImapCodec),
            tag_generator: TagGenerator::default(),
            closed: false,
        }
    }

    /// Waits for the first response the server sends on its own.
    pub async fn greeting(&mut self) -> Result<ResponseData, ProtocolError> {
        let greeting = self.receive().await?;
        trace!("greeting = {greeting:?}");
        Ok(greeting)
    }

    /// Hands back the underlying stream, e.g. to wrap it in TLS.
    pub fn into_parts(self) -> (Box<dyn ImapIo>, TagGenerator) {
        let parts = self.stream.into_parts();
        if !parts.read_buf.is_empty() {
            warn!(
                "dropping {} bytes the server sent ahead of the handshake",
                parts.read_buf.len()
            );
        }
        (parts.io, self.tag_generator)
    }

    /// Continues on a new stream, keeping the tag sequence going.
    pub fn from_parts(io: impl ImapIo + 'static, tag_generator: TagGenerator) -> Self {
        Self {
            tag_generator,
            ..Self::new(io)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn send(&mut self, command: &str) -> Result<Vec<ResponseData>, ProtocolError> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        let tag = self.tag_generator.next();
        if command.starts_with("LOGIN ") {
            debug!("{tag} LOGIN <user> <password>");
        } else {
            debug!("{tag} {command}");
        }

        let request = Request(
            Cow::Borrowed(tag.as_bytes()),
            Cow::Borrowed(command.as_bytes()),
        );
        if let Err(e) = self.stream.send(&request).await {
            self.closed = true;
            return Err(e.into());
        }

        let mut untagged = Vec::new();
        loop {
            let response = self.receive().await?;
            let outcome = match response.parsed() {
                Response::Done {
                    tag: done_tag,
                    status,
                    information,
                    ..
                } => {
                    if done_tag.0 != tag {
                        warn!("ignoring completion of unknown command {}", done_tag.0);
                        continue;
                    }
                    trace!("{tag} {status:?} {information:?}");
                    let information = information.map(Cow::into_owned).unwrap_or_default();
                    Some(match status {
                        Status::Ok => Ok(()),
                        Status::No => Err(ProtocolError::No {
                            command: verb(command),
                            information,
                        }),
                        Status::Bad => Err(ProtocolError::Bad {
                            command: verb(command),
                            information,
                        }),
                        Status::PreAuth | Status::Bye => {
                            Err(ProtocolError::UnexpectedResponse(verb(command)))
                        }
                    })
                }
                Response::Data {
                    status: Status::Bye,
                    information,
                    ..
                } => {
                    debug!("server is closing the connection: {information:?}");
                    self.closed = true;
                    None
                }
                _ => None,
            };
            match outcome {
                Some(result) => return result.map(|()| untagged),
                None => untagged.push(response),
            }
        }
    }

    async fn receive(&mut self) -> Result<ResponseData, ProtocolError> {
        match self.stream.next().await {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => {
                self.closed = true;
                Err(e.into())
            }
            None => {
                self.closed = true;
                Err(ProtocolError::Closed)
            }
        }
    }
}

/// Command name for error messages, `UID COPY` rather than just `UID`.
fn verb(command: &str) -> String {
    let mut words = command.split(' ');
    match words.next() {
        Some("UID") => format!("UID {}", words.next().unwrap_or_default()),
        Some(word) => word.to_string(),
        None => String::new(),
    }
}
