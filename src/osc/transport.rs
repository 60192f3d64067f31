//! OSC 发送端 - UDP 单目标, 发后即忘

use crate::error::TransportError;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::info;

/// 数据报发送接口
pub trait OscSink: Send {
    fn send(&mut self, datagram: &[u8]) -> Result<(), TransportError>;
}

/// UDP 发送端, 目标地址在创建时解析一次
pub struct UdpOscSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpOscSender {
    pub fn connect(destination: &str) -> Result<Self, TransportError> {
        let target = destination
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve {
                addr: destination.to_string(),
            })?
            .next()
            .ok_or_else(|| TransportError::Resolve {
                addr: destination.to_string(),
            })?;
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        info!("📡 OSC 目标: {}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl OscSink for UdpOscSender {
    fn send(&mut self, datagram: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(datagram, self.target)
            .map(|_| ())
            .map_err(|source| TransportError::Send {
                addr: self.target.to_string(),
                source,
            })
    }
}

impl<S: OscSink + ?Sized> OscSink for Box<S> {
    fn send(&mut self, datagram: &[u8]) -> Result<(), TransportError> {
        (**self).send(datagram)
    }
}

#[cfg(test)]
pub use testing::RecordingSink;
