use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError = 0,
    /// The name server was unable to interpret the query.
    FormatError = 1,
    /// The name server was unable to process this query due to a problem
    /// with the name server.
    ServerFailure = 2,
    /// Meaningful only for responses from an authoritative name server,
    /// this code signifies that the domain name referenced in the query
    /// does not exist. Commonly known as NXDOMAIN.
    NameError = 3,
    /// The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// The name server refuses to perform the specified operation for
    /// policy reasons.
    Refused = 5,
}

impl TryFrom<u8> for ResponseCode {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::NoError),
            1 => Ok(ResponseCode::FormatError),
            2 => Ok(ResponseCode::ServerFailure),
            3 => Ok(ResponseCode::NameError),
            4 => Ok(ResponseCode::NotImplemented),
            5 => Ok(ResponseCode::Refused),
            other => Err(ReaderError::InvalidResponseCode(other)),
        }
    }
}

/// The 16 bit id and the two flag octets of the wire header.
///
/// The four section counts are not carried here: they are derived from
/// the section lengths when writing and consumed directly when reading,
/// so a packet can never advertise counts that differ from its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Identifier assigned by the program that generates the query, copied
    /// into the corresponding reply so the requester can match them up.
    pub id: u16, // 16 bits

    /// RD, set in a query and copied into the response. Directs the name
    /// server to pursue the query recursively.
    pub recursion_desired: bool, // 1 bit
    /// TC, the message was cut to fit the transmission channel.
    pub truncated_message: bool, // 1 bit
    /// AA, the responding name server is an authority for the name in the
    /// question section.
    pub authoritative_answer: bool, // 1 bit
    /// Kind of query: 0 a standard query, 1 an inverse query, 2 a server
    /// status request. Copied into the response.
    pub opcode: u8, // 4 bits
    /// QR, whether this message is a query (false) or a response (true).
    pub response: bool, // 1 bit

    /// RCODE, set as part of responses.
    pub response_code: ResponseCode, // 4 bits
    /// CD, DNSSEC checking disabled.
    pub checking_disabled: bool, // 1 bit
    /// AD, DNSSEC authenticated data.
    pub authed_data: bool, // 1 bit
    /// Z, reserved, must be zero in queries and responses.
    pub z: bool, // 1 bit
    /// RA, whether the responding server offers recursion.
    pub recursion_available: bool, // 1 bit
}

impl Header {
    pub fn question(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn response(id: u16) -> Self {
        Self {
            id,
            response: true,
            ..Default::default()
        }
    }

    /// Header of the response to `request`: same id and opcode, RD echoed,
    /// RA cleared since recursion is not advertised.
    pub fn response_from(request: &Self) -> Self {
        Self {
            id: request.id,
            recursion_desired: request.recursion_desired,
            truncated_message: false,
            authoritative_answer: false,
            opcode: request.opcode,
            response: true,
            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,
        }
    }

}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,

            recursion_desired: false,
            truncated_message: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,
        }
    }
}

impl Header {
    /// Reads the first 4 bytes
    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let id = buffer.read_u16()?;

        let head = buffer.read()?;
        let tail = buffer.read()?;

        Ok(Self {
            id,
            recursion_desired: (head & (1 << 0)) > 0,
            truncated_message: (head & (1 << 1)) > 0,
            authoritative_answer: (head & (1 << 2)) > 0,
            opcode: (head >> 3) & 0x0F,
            response: (head & (1 << 7)) > 0,
            response_code: ResponseCode::try_from(tail & 0x0F)?,
            checking_disabled: (tail & (1 << 4)) > 0,
            authed_data: (tail & (1 << 5)) > 0,
            z: (tail & (1 << 6)) > 0,
            recursion_available: (tail & (1 << 7)) > 0,
        })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        buffer.write_u8(
            (self.response_code as u8)
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        Ok(())
    }
}
