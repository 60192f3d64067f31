//! 消息组编码器 - begin / group_data / end 按序发送

use super::transport::OscSink;
use super::{MessageGroup, OscAddresses};
use crate::error::TransportError;
use rosc::{encoder, OscPacket};

/// 消息组编码发送
///
/// 三条消息先全部编码, 再依次发送; 独占发送端, 组间不会交错
pub struct StreamEncoder {
    sink: Box<dyn OscSink>,
    addresses: OscAddresses,
    groups_sent: u64,
}

impl StreamEncoder {
    pub fn new(sink: Box<dyn OscSink>, addresses: OscAddresses) -> Self {
        Self {
            sink,
            addresses,
            groups_sent: 0,
        }
    }

    pub fn addresses(&self) -> &OscAddresses {
        &self.addresses
    }

    pub fn groups_sent(&self) -> u64 {
        self.groups_sent
    }

    /// 编码并发送一个消息组; 发送失败时放弃该组剩余消息
    pub fn emit(&mut self, group: &MessageGroup) -> Result<(), TransportError> {
        let datagrams = group
            .to_messages(&self.addresses)
            .into_iter()
            .map(|msg| {
                encoder::encode(&OscPacket::Message(msg))
                    .map_err(|e| TransportError::Encode(format!("{:?}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for datagram in &datagrams {
            self.sink.send(datagram)?;
        }
        self.groups_sent += 1;
        Ok(())
    }
}
