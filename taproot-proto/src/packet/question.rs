use super::QueryType;
use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;

/// CLASS fields appear in questions and resource records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DnsClass {
    /// IN - the Internet
    Internet = 1,
    /// CS - the CSNET class (obsolete)
    Csnet = 2,
    /// CH - the CHAOS class
    Chaos = 3,
    /// HS - Hesiod
    Hesiod = 4,
}

impl Default for DnsClass {
    fn default() -> Self {
        Self::Internet
    }
}

impl TryFrom<u16> for DnsClass {
    type Error = ReaderError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Internet),
            2 => Ok(Self::Csnet),
            3 => Ok(Self::Chaos),
            4 => Ok(Self::Hesiod),
            other => Err(ReaderError::InvalidClass(other)),
        }
    }
}

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// QNAME, a domain name as a sequence of labels.
    pub name: String,
    /// QTYPE, the type of the query.
    pub qtype: QueryType,
    /// QCLASS, always IN here.
    pub qclass: DnsClass,
}

impl Question {
    pub fn new(name: String, qtype: QueryType) -> Self {
        Self {
            name,
            qtype,
            qclass: Default::default(),
        }
    }

    /// Whether `other` is the same question, comparing names without case.
    pub fn matches(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.qtype == other.qtype
            && self.qclass == other.qclass
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let name = buffer.read_qname()?;
        let qtype = QueryType::from_num(buffer.read_u16()?);
        let qclass = DnsClass::try_from(buffer.read_u16()?)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_qname(&self.name)?;

        buffer.write_u16(self.qtype.into_num())?;
        buffer.write_u16(self.qclass as u16)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DnsClass, Question};
    use crate::buffer::BytePacketBuffer;
    use crate::packet::QueryType;

    #[test]
    fn should_round_trip_question() {
        let question = Question::new("www.example.com".into(), QueryType::NS);
        let mut buffer = BytePacketBuffer::default();
        question.write(&mut buffer).unwrap();

        let mut buffer = BytePacketBuffer::new(buffer.buf);
        let decoded = Question::read(&mut buffer).unwrap();
        assert_eq!(decoded, question);
    }

    #[test]
    fn should_match_question_ignoring_case() {
        let sent = Question::new("example.com".into(), QueryType::A);
        let echoed = Question::new("EXAMPLE.com".into(), QueryType::A);
        assert!(sent.matches(&echoed));
        assert!(!sent.matches(&Question::new("example.com".into(), QueryType::AAAA)));
    }

    #[test]
    fn should_reject_unknown_class() {
        let mut buffer = BytePacketBuffer::default();
        let question = Question::new("example.com".into(), QueryType::A);
        question.write(&mut buffer).unwrap();
        // rewrite the class octets with an unassigned value
        let class_pos = buffer.pos - 2;
        buffer.set_u16(class_pos, 254).unwrap();

        let mut buffer = BytePacketBuffer::new(buffer.buf);
        let error = Question::read(&mut buffer).unwrap_err();
        assert_eq!(error, crate::buffer::ReaderError::InvalidClass(254));
    }
}
