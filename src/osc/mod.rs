/// OSC 消息组 (begin / group_data / end 三段式)
///
/// 一个逻辑消息组拆成三条 OSC 消息按序发送:
/// ```text
/// {prefix}/begin       [channel, frame, dimensions, groups]
/// {prefix}/group_data  [channel, frame, tag, sub_index, dimensions, count, payload...]
/// {prefix}/end         [channel, frame]
/// ```
pub mod encoder;
pub mod transport;

pub use encoder::StreamEncoder;
pub use transport::{OscSink, UdpOscSender};
#[cfg(test)]
pub use transport::RecordingSink;

use rosc::{OscMessage, OscType};

/// 三段式地址
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OscAddresses {
    pub begin: String,
    pub data: String,
    pub end: String,
}

impl OscAddresses {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            begin: format!("{}/begin", prefix),
            data: format!("{}/group_data", prefix),
            end: format!("{}/end", prefix),
        }
    }
}

impl Default for OscAddresses {
    fn default() -> Self {
        Self::new("/AAASeed/ndim")
    }
}

/// 逻辑消息组
#[derive(Clone, Debug, PartialEq)]
pub struct MessageGroup {
    pub channel: String,
    pub frame_index: i32,
    pub dimensions: i32,  // begin 携带的维度数
    pub group_count: i32, // begin 携带的组数
    pub tag: String,
    pub sub_index: i32,
    pub data_dimensions: i32,
    pub count: i32,
    pub payload: Vec<OscType>,
}

impl MessageGroup {
    /// 拆成 begin / group_data / end 三条消息
    pub fn to_messages(&self, addresses: &OscAddresses) -> [OscMessage; 3] {
        let channel = OscType::String(self.channel.clone());
        let frame = OscType::Int(self.frame_index);

        let begin = OscMessage {
            addr: addresses.begin.clone(),
            args: vec![
                channel.clone(),
                frame.clone(),
                OscType::Int(self.dimensions),
                OscType::Int(self.group_count),
            ],
        };

        let mut args = Vec::with_capacity(6 + self.payload.len());
        args.extend([
            channel.clone(),
            frame.clone(),
            OscType::String(self.tag.clone()),
            OscType::Int(self.sub_index),
            OscType::Int(self.data_dimensions),
            OscType::Int(self.count),
        ]);
        args.extend(self.payload.iter().cloned());
        let data = OscMessage {
            addr: addresses.data.clone(),
            args,
        };

        let end = OscMessage {
            addr: addresses.end.clone(),
            args: vec![channel, frame],
        };

        [begin, data, end]
    }
}
