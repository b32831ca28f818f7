//! Scripted in-process server for protocol tests.

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex, split},
    task::JoinHandle,
};

/// Greets with `greeting`, then for every exchange expects the client to
/// send `command` and answers with `reply`, where `{tag}` is replaced by the
/// tag the client used.
pub fn serve(
    greeting: &'static str,
    exchanges: Vec<(&'static str, &'static str)>,
) -> (DuplexStream, JoinHandle<()>) {
    let (client, server) = duplex(64 * 1024);
    let handle = tokio::spawn(async move {
        let (read, mut write) = split(server);
        let mut lines = BufReader::new(read).lines();
        write
            .write_all(greeting.as_bytes())
            .await
            .expect("greeting should be writable");
        for (expected, reply) in exchanges {
            let line = lines
                .next_line()
                .await
                .expect("command should be readable")
                .expect("client should send another command");
            let (tag, command) = line
                .split_once(' ')
                .expect("commands should be tagged");
            assert_eq!(command, expected);
            write
                .write_all(reply.replace("{tag}", tag).as_bytes())
                .await
                .expect("reply should be writable");
        }
    });
    (client, handle)
}
