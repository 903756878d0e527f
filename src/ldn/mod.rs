//! LDN application payload carried over UDP on the emulated subnet

pub mod frame;
pub mod kind;
pub mod network_info;
pub mod rle;

pub use frame::{LdnFrame, HEADER_SIZE, MAGIC};
pub use kind::{to_console, to_room, LdnPacketType, RoomPacketType};
pub use network_info::{NetworkInfo, NodeInfo};

/// UDP port the console uses for LDN traffic
pub const LDN_PORT: u16 = 11452;
