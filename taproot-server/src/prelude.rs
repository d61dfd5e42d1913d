use std::net::SocketAddr;

/// A single datagram together with its origin or destination address.
///
/// The buffer is the full 512 octets DNS allows over UDP; `size` is how
/// much of it the datagram actually occupies.
pub struct Message {
    pub address: SocketAddr,
    pub buffer: [u8; 512],
    pub size: usize,
}

impl Message {
    /// Build an outbound datagram from an encoded payload. Anything past
    /// 512 octets would not fit a legal DNS datagram and is cut off.
    pub fn new(address: SocketAddr, payload: &[u8]) -> Self {
        let mut buffer = [0u8; 512];
        let size = payload.len().min(buffer.len());
        buffer[..size].copy_from_slice(&payload[..size]);
        Self {
            address,
            buffer,
            size,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.size]
    }
}

#[cfg(test)]
mod tests {
    use super::Message;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    fn address() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 53))
    }

    #[test]
    fn should_keep_payload_bounds() {
        let message = Message::new(address(), &[1, 2, 3]);
        assert_eq!(message.size, 3);
        assert_eq!(message.payload(), &[1, 2, 3]);
    }

    #[test]
    fn should_cut_oversized_payload() {
        let message = Message::new(address(), &[7u8; 600]);
        assert_eq!(message.size, 512);
        assert_eq!(message.payload().len(), 512);
    }
}
