pub mod buffer;
pub mod packet;
