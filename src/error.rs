use std::io;
use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("rle error: {0}")]
    Rle(String),

    #[error("no MAC address known for {0}")]
    Unresolved(Ipv4Addr),

    #[error("tcp session closed")]
    SessionClosed,

    #[error("engine is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;
