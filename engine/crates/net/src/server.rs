use std::sync::atomic::{AtomicU64, Ordering};

use session::{ConnectionId, OutputFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::channels::{ConnWriteRx, NetEvent, NetEventTx, RegisterConnection, RegisterTx, UnregisterTx};
use crate::telnet::{self, LineBuffer};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Accept telnet connections on `listener`, spawning one task per connection.
pub async fn run_tcp_server(
    listener: TcpListener,
    event_tx: NetEventTx,
    register_tx: RegisterTx,
    unregister_tx: UnregisterTx,
) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Telnet server listening on {}", addr);
    }

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let conn = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));

        tracing::info!(%conn, %peer_addr, "New connection");

        let event_tx = event_tx.clone();
        let register_tx = register_tx.clone();
        let unregister_tx = unregister_tx.clone();

        tokio::spawn(async move {
            handle_connection(stream, conn, event_tx, register_tx, unregister_tx).await;
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    conn: ConnectionId,
    event_tx: NetEventTx,
    register_tx: RegisterTx,
    unregister_tx: UnregisterTx,
) {
    let (mut reader, mut writer) = stream.into_split();

    let (write_tx, mut write_rx): (_, ConnWriteRx) = tokio::sync::mpsc::unbounded_channel();

    // Register before announcing, so the greeting has somewhere to go.
    let _ = register_tx.send(RegisterConnection { conn, write_tx });
    let _ = event_tx.send(NetEvent::Connected { conn });

    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = write_rx.recv().await {
            let bytes = match frame {
                OutputFrame::Text(text) => telnet::encode_text(&text),
                OutputFrame::Echo(true) => telnet::echo_on().to_vec(),
                OutputFrame::Echo(false) => telnet::echo_off().to_vec(),
                OutputFrame::Disconnect => break,
            };
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut line_buffer = LineBuffer::new();
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    for line in line_buffer.feed(&buf[..n]) {
                        let _ = event_tx.send(NetEvent::Input { conn, line });
                    }
                }
            },
            // Writer finished: the game asked for a disconnect or the socket died.
            _ = &mut writer_task => break,
        }
    }

    let _ = event_tx.send(NetEvent::Disconnected { conn });
    let _ = unregister_tx.send(conn);

    writer_task.abort();
    tracing::info!(%conn, "Connection ended");
}
