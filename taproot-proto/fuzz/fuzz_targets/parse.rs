#![no_main]

use taproot_proto::buffer::BytePacketBuffer;
use taproot_proto::packet::DnsPacket;

libfuzzer_sys::fuzz_target!(|buffer: BytePacketBuffer| {
    let _ = DnsPacket::try_from(buffer);
});
