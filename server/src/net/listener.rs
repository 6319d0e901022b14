use std::{io, sync::Arc};

use comms::msg::{Command, Msg};
use log::{info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task::JoinSet,
};

use super::connection::{Connection, RemoteClient};
use crate::{
    client_manager::ClientManager,
    error::{Result, ServerErr},
    proxy::ClientId,
};

/// Accepts clients on `listener` forever, serving each one on its own task.
///
/// # Arguments
/// * `listener` - The bound listener to accept clients from.
/// * `manager` - Where accepted clients get registered.
///
/// # Errors
/// If accepting a new connection fails.
pub async fn serve(
    listener: TcpListener,
    manager: Arc<ClientManager<RemoteClient>>,
) -> io::Result<()> {
    let mut tasks = JoinSet::new();
    let mut next_id: ClientId = 0;

    loop {
        let (stream, addr) = listener.accept().await?;
        next_id += 1;
        info!(client = next_id; "connection accepted from {addr}");

        let (rx, tx) = stream.into_split();
        tasks.spawn(accept_client(next_id, rx, tx, manager.clone()));

        while let Some(res) = tasks.try_join_next() {
            match res {
                Ok(Err(e)) => warn!("client connection failed: {e}"),
                Err(e) => warn!("client task panicked: {e}"),
                Ok(Ok(())) => {}
            }
        }
    }
}

/// Runs a single client connection, from its `Join` until it's closed.
///
/// The client is registered in `manager` as soon as it joins, and unregistered once
/// the connection ends.
///
/// # Arguments
/// * `id` - The id to assign to the client.
/// * `rx` - The reading end of the connection.
/// * `tx` - The writing end of the connection.
/// * `manager` - Where to register the client.
///
/// # Errors
/// If the first message isn't a `Join`.
pub async fn accept_client<R, W>(
    id: ClientId,
    rx: R,
    tx: W,
    manager: Arc<ClientManager<RemoteClient>>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut rx, tx) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await?;
    if !matches!(msg, Msg::Control(Command::Join)) {
        return Err(ServerErr::UnexpectedMessage {
            client: id,
            got: msg.kind(),
        });
    }

    let (proxy, connection) = Connection::new(id, rx, tx);
    manager.register(proxy);
    let _registration = Registration { id, manager };
    connection.serve().await;

    Ok(())
}

/// Unregisters its client when dropped, even if serving it was cancelled or panicked.
struct Registration {
    id: ClientId,
    manager: Arc<ClientManager<RemoteClient>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}
