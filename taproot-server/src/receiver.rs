use crate::prelude::Message;
use async_stream::stream;
use futures_core::stream::Stream;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Anything shorter than a DNS header cannot be a query.
const MIN_MESSAGE_SIZE: usize = 12;

/// Receiving half of the server socket, turned into a stream of datagrams.
#[derive(Debug)]
pub struct Receiver {
    socket: Arc<UdpSocket>,
}

impl Receiver {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    async fn receive(&self) -> std::io::Result<Message> {
        let mut buffer = [0u8; 512];
        let (size, address) = self.socket.recv_from(&mut buffer).await?;
        Ok(Message {
            address,
            buffer,
            size,
        })
    }

    /// Datagrams too small to even hold a header are discarded here, so
    /// handlers only ever see something worth decoding.
    pub fn into_stream(self) -> impl Stream<Item = Message> {
        stream! {
            loop {
                match self.receive().await {
                    Ok(message) if message.size < MIN_MESSAGE_SIZE => {
                        tracing::debug!(
                            "ignoring {} byte datagram from {:?}",
                            message.size,
                            message.address
                        );
                    }
                    Ok(message) => {
                        tracing::debug!(
                            "received {} bytes from {:?}",
                            message.payload().len(),
                            message.address
                        );
                        yield message;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
