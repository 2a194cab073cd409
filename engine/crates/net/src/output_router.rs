use std::collections::HashMap;

use session::{ConnectionId, OutputFrame};

use crate::channels::{ConnWriteTx, OutputRx, RegisterRx, UnregisterRx};

/// Routes game output to the write channel of the addressed connection.
pub async fn run_output_router(
    mut output_rx: OutputRx,
    mut register_rx: RegisterRx,
    mut unregister_rx: UnregisterRx,
) {
    let mut writers: HashMap<ConnectionId, ConnWriteTx> = HashMap::new();

    loop {
        tokio::select! {
            Some(reg) = register_rx.recv() => {
                tracing::debug!(conn = %reg.conn, "Output router: connection registered");
                writers.insert(reg.conn, reg.write_tx);
            }
            Some(conn) = unregister_rx.recv() => {
                tracing::debug!(%conn, "Output router: connection unregistered");
                writers.remove(&conn);
            }
            Some(output) = output_rx.recv() => {
                let Some(tx) = writers.get(&output.conn) else {
                    tracing::trace!(conn = %output.conn, "Output router: no writer, frame dropped");
                    continue;
                };
                let closing = output.frame == OutputFrame::Disconnect;
                if tx.send(output.frame).is_err() {
                    tracing::debug!(conn = %output.conn, "Output router: write channel closed");
                    writers.remove(&output.conn);
                } else if closing {
                    tracing::debug!(conn = %output.conn, "Output router: disconnect requested, dropping writer");
                    writers.remove(&output.conn);
                }
            }
            else => break,
        }
    }

    tracing::info!("Output router shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{NetChannels, RegisterConnection};
    use session::SessionOutput;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn router_delivers_and_disconnects() {
        let ch = NetChannels::new();
        let router = tokio::spawn(run_output_router(ch.output_rx, ch.register_rx, ch.unregister_rx));

        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        let conn = ConnectionId(1);
        ch.register_tx.send(RegisterConnection { conn, write_tx }).unwrap();
        tokio::task::yield_now().await;

        ch.output_tx.send(SessionOutput::new(conn, "Hello, player!")).unwrap();
        assert_eq!(write_rx.recv().await.unwrap(), OutputFrame::Text("Hello, player!".into()));

        ch.output_tx.send(SessionOutput::echo(conn, false)).unwrap();
        assert_eq!(write_rx.recv().await.unwrap(), OutputFrame::Echo(false));

        ch.output_tx.send(SessionOutput::disconnect(conn)).unwrap();
        assert_eq!(write_rx.recv().await.unwrap(), OutputFrame::Disconnect);
        // The router dropped its sender after the disconnect frame.
        assert!(write_rx.recv().await.is_none());

        drop(ch.output_tx);
        drop(ch.register_tx);
        drop(ch.unregister_tx);
        let _ = router.await;
    }
}
