mod client;
mod codec;
mod connection;
#[cfg(test)]
mod script;
mod sequence_set;
mod session;
mod tag_generator;

pub use client::{Client, TlsMode};
pub use session::ImapSession;
