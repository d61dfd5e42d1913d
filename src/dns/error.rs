use std::fmt::Display;
use taproot_proto::buffer::writer::WriterError;

#[derive(Debug)]
pub enum HandleError {
    /// The client packet decoded fine but asked nothing.
    NoQuestion,
    Writer(WriterError),
}

impl Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoQuestion => write!(f, "packet carries no question"),
            Self::Writer(inner) => write!(f, "unable to encode response: {inner}"),
        }
    }
}

impl std::error::Error for HandleError {}

impl From<WriterError> for HandleError {
    fn from(value: WriterError) -> Self {
        Self::Writer(value)
    }
}
