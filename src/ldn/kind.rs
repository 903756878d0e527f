//! Packet kinds on both sides of the bridge
//!
//! The console and the room number their LDN messages differently. One
//! table of pairs drives the translation in both directions.

use std::fmt;

/// Message kind carried in the LDN frame header on the console side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LdnPacketType {
    Scan = 0,
    ScanResponse = 1,
    Connect = 2,
    SyncNetwork = 3,
    Disconnect = 4,
}

impl LdnPacketType {
    pub const ALL: [LdnPacketType; 5] = [
        LdnPacketType::Scan,
        LdnPacketType::ScanResponse,
        LdnPacketType::Connect,
        LdnPacketType::SyncNetwork,
        LdnPacketType::Disconnect,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == value)
    }
}

/// Message kind used by the simulator room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RoomPacketType {
    Scan = 0,
    ScanResp = 1,
    Connect = 2,
    SyncNetwork = 3,
    Disconnect = 4,
    DestroyNetwork = 5,
}

impl RoomPacketType {
    pub const ALL: [RoomPacketType; 6] = [
        RoomPacketType::Scan,
        RoomPacketType::ScanResp,
        RoomPacketType::Connect,
        RoomPacketType::SyncNetwork,
        RoomPacketType::Disconnect,
        RoomPacketType::DestroyNetwork,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == value)
    }
}

impl fmt::Display for LdnPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for RoomPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Console kind paired with its room counterpart. Each kind appears at most
/// once per column.
const KIND_TABLE: [(LdnPacketType, RoomPacketType); 5] = [
    (LdnPacketType::Scan, RoomPacketType::Scan),
    (LdnPacketType::ScanResponse, RoomPacketType::ScanResp),
    (LdnPacketType::Connect, RoomPacketType::Connect),
    (LdnPacketType::SyncNetwork, RoomPacketType::SyncNetwork),
    (LdnPacketType::Disconnect, RoomPacketType::Disconnect),
];

impl From<LdnPacketType> for RoomPacketType {
    fn from(kind: LdnPacketType) -> Self {
        // Every console kind has a row
        KIND_TABLE
            .iter()
            .find(|(ldn, _)| *ldn == kind)
            .map(|(_, room)| *room)
            .unwrap_or(RoomPacketType::Scan)
    }
}

/// Room kind for a console kind
pub fn to_room(kind: LdnPacketType) -> RoomPacketType {
    RoomPacketType::from(kind)
}

/// Console kind for a room kind, `None` when the console has no equivalent
pub fn to_console(kind: RoomPacketType) -> Option<LdnPacketType> {
    KIND_TABLE
        .iter()
        .find(|(_, room)| *room == kind)
        .map(|(ldn, _)| *ldn)
}
