use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::Duration;
use taproot_proto::buffer::{BytePacketBuffer, ReaderError, WriterError};
use taproot_proto::packet::header::Header;
use taproot_proto::packet::question::Question;
use taproot_proto::packet::DnsPacket;
use tokio::net::UdpSocket;

const UPSTREAM_PORT: u16 = 53;

#[derive(Debug)]
pub struct Config {
    /// How long a single upstream server gets to answer.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Self::default_timeout(),
        }
    }
}

impl Config {
    fn default_timeout() -> Duration {
        Duration::from_secs(2)
    }

    pub fn build(self) -> UdpLookupService {
        UdpLookupService { config: self }
    }
}

#[derive(Debug)]
pub enum LookupError {
    Encode(WriterError),
    Decode(ReaderError),
    Io(std::io::Error),
    /// The upstream server did not answer within the deadline.
    Timeout,
    /// None of the candidate servers could be reached.
    NoServer,
    /// The reply had its QR bit clear.
    NotAResponse,
    /// The reply carried a transaction id we never sent. Answering with a
    /// guessed id is what an off-path spoofer would do, so this is fatal
    /// for the whole exchange rather than a value to ignore.
    IdMismatch { sent: u16, received: u16 },
    /// The reply did not echo the question it pretends to answer.
    QuestionMismatch,
}

impl Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(inner) => write!(f, "unable to encode query: {inner}"),
            Self::Decode(inner) => write!(f, "unable to decode reply: {inner}"),
            Self::Io(inner) => write!(f, "i/o failure: {inner}"),
            Self::Timeout => write!(f, "upstream server did not answer in time"),
            Self::NoServer => write!(f, "no candidate server reachable"),
            Self::NotAResponse => write!(f, "reply is not a response"),
            Self::IdMismatch { sent, received } => {
                write!(f, "reply id {received} does not match query id {sent}")
            }
            Self::QuestionMismatch => write!(f, "reply question does not match query"),
        }
    }
}

impl std::error::Error for LookupError {}

impl From<WriterError> for LookupError {
    fn from(value: WriterError) -> Self {
        Self::Encode(value)
    }
}

impl From<ReaderError> for LookupError {
    fn from(value: ReaderError) -> Self {
        Self::Decode(value)
    }
}

#[async_trait::async_trait]
pub trait LookupService {
    /// Ask one of the candidate `servers` the given question, without
    /// recursion, and hand back the decoded reply.
    async fn query(
        &self,
        servers: &[Ipv4Addr],
        question: &Question,
    ) -> Result<DnsPacket, LookupError>;
}

/// Sanity checks on a decoded reply before anything in it is believed.
fn check_reply(sent_id: u16, question: &Question, reply: &DnsPacket) -> Result<(), LookupError> {
    if !reply.header.response {
        return Err(LookupError::NotAResponse);
    }
    if reply.header.id != sent_id {
        return Err(LookupError::IdMismatch {
            sent: sent_id,
            received: reply.header.id,
        });
    }
    let echoed = match reply.questions.as_slice() {
        [single] => single,
        _ => return Err(LookupError::QuestionMismatch),
    };
    if !echoed.matches(question) {
        return Err(LookupError::QuestionMismatch);
    }
    Ok(())
}

/// One query, one ephemeral socket.
///
/// Binding a fresh port per exchange keeps the transaction id the only
/// piece of shared state between query and reply, so there is no table of
/// outstanding ids to maintain or to poison.
pub struct UdpLookupService {
    config: Config,
}

#[async_trait::async_trait]
impl LookupService for UdpLookupService {
    #[tracing::instrument(skip(self, servers))]
    async fn query(
        &self,
        servers: &[Ipv4Addr],
        question: &Question,
    ) -> Result<DnsPacket, LookupError> {
        let id: u16 = rand::random();
        let packet = DnsPacket::new(Header::question(id)).with_question(question.clone());
        let req_buffer = packet.create_buffer()?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(LookupError::Io)?;
        let mut reached = false;
        for server in servers {
            if socket.connect((*server, UPSTREAM_PORT)).await.is_ok() {
                reached = true;
                break;
            }
        }
        if !reached {
            return Err(LookupError::NoServer);
        }

        socket
            .send(&req_buffer.buf[0..req_buffer.pos])
            .await
            .map_err(LookupError::Io)?;

        let mut res_buffer = BytePacketBuffer::default();
        let size = tokio::time::timeout(self.config.timeout, socket.recv(&mut res_buffer.buf))
            .await
            .map_err(|_| LookupError::Timeout)?
            .map_err(LookupError::Io)?;
        tracing::debug!("received {size} bytes from upstream");

        let reply = DnsPacket::try_from(res_buffer)?;
        check_reply(id, question, &reply)?;

        if reply.header.truncated_message {
            // no TCP fallback: report and carry on with what fit
            tracing::warn!("reply for {} was truncated", question.name);
        }

        Ok(reply)
    }
}

#[cfg(test)]
pub use mock::MockLookupService;
