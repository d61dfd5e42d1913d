use futures::stream::StreamExt;
use prelude::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

pub mod prelude;
pub mod receiver;
pub mod sender;

#[async_trait::async_trait]
pub trait Handler {
    /// Build the reply to an inbound datagram.
    ///
    /// Returning `None` drops the datagram without any reply going out,
    /// which is what a malformed packet deserves.
    async fn handle(&self, message: Message) -> Option<Message>;
}

/// UDP server owning a single socket shared between the receive stream
/// and the concurrent response writers.
pub struct UdpServer<H> {
    address: SocketAddr,
    handler: H,
}

impl<H: Handler> UdpServer<H> {
    pub fn new(address: SocketAddr, handler: H) -> Self {
        Self { address, handler }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let socket = UdpSocket::bind(self.address).await?;
        tracing::info!("listening on {}", self.address);
        let socket = Arc::new(socket);

        let receiver = receiver::Receiver::new(socket.clone());
        let sender = sender::Sender::new(socket);

        // Each datagram gets its own task so a slow resolution never
        // holds back the ones behind it.
        let stream = receiver
            .into_stream()
            .map(|item| async { self.handler.handle(item).await })
            .buffer_unordered(64)
            .filter_map(|item| async { item });

        tokio::pin!(stream);

        while let Some(item) = stream.next().await {
            if let Err(error) = sender.send(&item).await {
                tracing::error!("couldn't send message to {:?}: {error:?}", item.address);
            }
        }

        Ok(())
    }
}
