use crate::prelude::Message;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Sending half of the server socket.
///
/// `send_to` is safe to call from many tasks at once, so a single sender
/// serves every in-flight resolution.
#[derive(Debug)]
pub struct Sender {
    socket: Arc<UdpSocket>,
}

impl Sender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    pub async fn send(&self, message: &Message) -> std::io::Result<()> {
        let payload = message.payload();
        tracing::debug!("sending {} bytes to {:?}", payload.len(), message.address);
        let sent = self.socket.send_to(payload, message.address).await?;
        if sent < payload.len() {
            // a truncated response is worse than none, the client would
            // either fail to decode it or trust a cut record set
            tracing::warn!(
                "datagram to {:?} was cut to {sent} of {} bytes",
                message.address,
                payload.len()
            );
        }
        Ok(())
    }
}
