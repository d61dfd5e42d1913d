use super::error::HandleError;
use crate::repository::resolver::ResolverService;
use std::sync::Arc;
use taproot_proto::buffer::BytePacketBuffer;
use taproot_proto::packet::DnsPacket;
use taproot_server::prelude::Message;

/// Client facing side: one inbound datagram in, at most one datagram out.
pub(crate) struct DnsHandler {
    resolver: Arc<dyn ResolverService + Send + Sync>,
}

impl DnsHandler {
    pub fn new(resolver: Arc<dyn ResolverService + Send + Sync>) -> Self {
        Self { resolver }
    }

    async fn try_handle(&self, request: &DnsPacket) -> Result<BytePacketBuffer, HandleError> {
        let question = match request.questions.first() {
            Some(found) => found,
            None => return Err(HandleError::NoQuestion),
        };

        let response = match self.resolver.resolve(question).await {
            Ok(found) => {
                let mut response = DnsPacket::response_from(request);
                response.header.response_code = found.header.response_code;
                response.with_answers(found.answers)
            }
            Err(error) => {
                tracing::warn!("resolution of {} failed: {error}", question.name);
                let mut response = DnsPacket::response_from(request);
                response.header.response_code = error.response_code();
                response
            }
        };

        Ok(response.create_buffer()?)
    }
}

#[async_trait::async_trait]
impl taproot_server::Handler for DnsHandler {
    #[tracing::instrument(skip_all, fields(origin = ?message.address, id = tracing::field::Empty))]
    async fn handle(&self, message: Message) -> Option<Message> {
        let buffer = BytePacketBuffer::new(message.buffer);
        let request = match DnsPacket::try_from(buffer) {
            Ok(found) => found,
            Err(error) => {
                // no reply at all: answering garbage invites amplification
                tracing::debug!("dropping malformed packet: {error}");
                return None;
            }
        };

        tracing::Span::current().record("id", request.header.id);

        match self.try_handle(&request).await {
            Ok(buffer) => Some(Message::new(message.address, &buffer.buf[..buffer.pos])),
            Err(HandleError::NoQuestion) => {
                tracing::debug!("dropping packet without question");
                None
            }
            Err(error) => {
                tracing::warn!("unable to build response: {error}");
                None
            }
        }
    }
}
