use session::{ConnectionId, SessionOutput, Transport};

use crate::channels::OutputTx;

/// [`Transport`] that feeds the output router.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    output_tx: OutputTx,
}

impl ChannelTransport {
    pub fn new(output_tx: OutputTx) -> Self {
        Self { output_tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, conn: ConnectionId, text: &str) -> bool {
        self.output_tx.send(SessionOutput::new(conn, text)).is_ok()
    }

    fn disconnect(&self, conn: ConnectionId) {
        if self.output_tx.send(SessionOutput::disconnect(conn)).is_err() {
            tracing::debug!(%conn, "disconnect after output router stopped");
        }
    }

    fn set_echo(&self, conn: ConnectionId, enabled: bool) {
        let _ = self.output_tx.send(SessionOutput::echo(conn, enabled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::OutputFrame;
    use tokio::sync::mpsc;

    #[test]
    fn frames_reach_the_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(tx);
        let conn = ConnectionId(2);

        assert!(transport.send(conn, "hi"));
        transport.set_echo(conn, false);
        transport.disconnect(conn);

        assert_eq!(rx.try_recv().unwrap().frame, OutputFrame::Text("hi".into()));
        assert_eq!(rx.try_recv().unwrap().frame, OutputFrame::Echo(false));
        assert_eq!(rx.try_recv().unwrap().frame, OutputFrame::Disconnect);
    }

    #[test]
    fn send_fails_once_router_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let transport = ChannelTransport::new(tx);
        assert!(!transport.send(ConnectionId(1), "lost"));
    }
}
