//! Fixed-layout session records carried in LDN payloads
//!
//! All multi-byte fields are little-endian. Every field is read and written
//! at an explicit offset; reserved ranges are written as zero.

use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Size of one node record
pub const NODE_INFO_SIZE: usize = 0x40;
/// Size of a full network description
pub const NETWORK_INFO_SIZE: usize = 0x480;
/// Node slots in a network description
pub const NODE_COUNT_MAX: usize = 8;
/// Bytes of advertisement data a network can carry
pub const ADVERTISE_DATA_MAX: usize = 384;
/// Bytes of the user name field (NUL padded)
pub const USER_NAME_SIZE: usize = 33;
/// Bytes of the SSID name field (NUL padded)
pub const SSID_NAME_SIZE: usize = 33;

mod offset {
    // NodeInfo
    pub const NODE_IPV4: usize = 0;
    pub const NODE_MAC: usize = 4;
    pub const NODE_ID: usize = 10;
    pub const NODE_IS_CONNECTED: usize = 11;
    pub const NODE_USER_NAME: usize = 12;
    pub const NODE_LOCAL_VERSION: usize = 46;

    // NetworkInfo: network id
    pub const LOCAL_COMMUNICATION_ID: usize = 0x00;
    pub const SCENE_ID: usize = 0x0A;
    pub const SESSION_ID: usize = 0x10;
    // common
    pub const BSSID: usize = 0x20;
    pub const SSID_LENGTH: usize = 0x26;
    pub const SSID_NAME: usize = 0x27;
    pub const CHANNEL: usize = 0x48;
    pub const LINK_LEVEL: usize = 0x4A;
    pub const NETWORK_TYPE: usize = 0x4B;
    // ldn
    pub const SECURITY_PARAMETER: usize = 0x50;
    pub const SECURITY_MODE: usize = 0x60;
    pub const STATION_ACCEPT_POLICY: usize = 0x62;
    pub const NODE_COUNT_MAX: usize = 0x66;
    pub const NODE_COUNT: usize = 0x67;
    pub const NODES: usize = 0x68;
    pub const ADVERTISE_DATA_SIZE: usize = 0x26A;
    pub const ADVERTISE_DATA: usize = 0x26C;
    pub const AUTHENTICATION_ID: usize = 0x478;
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn array_at<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

/// Text up to the first NUL, lossily decoded
fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// One participant of an LDN network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub ipv4_address: Ipv4Addr,
    pub mac_address: MacAddr,
    /// 0 is the host, 1..=7 are stations
    pub node_id: u8,
    pub is_connected: bool,
    pub user_name: [u8; USER_NAME_SIZE],
    pub local_communication_version: u16,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            ipv4_address: Ipv4Addr::UNSPECIFIED,
            mac_address: MacAddr::ZERO,
            node_id: 0,
            is_connected: false,
            user_name: [0; USER_NAME_SIZE],
            local_communication_version: 0,
        }
    }
}

impl NodeInfo {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_INFO_SIZE {
            return Err(Error::Parse(format!(
                "NodeInfo needs {} bytes, got {}",
                NODE_INFO_SIZE,
                buf.len()
            )));
        }

        // The console stores the address as a host-order u32
        let raw_ip = u32::from_le_bytes(array_at::<4>(buf, offset::NODE_IPV4));
        Ok(Self {
            ipv4_address: Ipv4Addr::from(raw_ip),
            mac_address: MacAddr(array_at::<6>(buf, offset::NODE_MAC)),
            node_id: buf[offset::NODE_ID],
            is_connected: buf[offset::NODE_IS_CONNECTED] != 0,
            user_name: array_at::<USER_NAME_SIZE>(buf, offset::NODE_USER_NAME),
            local_communication_version: u16_at(buf, offset::NODE_LOCAL_VERSION),
        })
    }

    /// Write the record into the first [`NODE_INFO_SIZE`] bytes of `out`
    pub fn encode_into(&self, out: &mut [u8]) {
        let out = &mut out[..NODE_INFO_SIZE];
        out.fill(0);
        out[offset::NODE_IPV4..offset::NODE_IPV4 + 4]
            .copy_from_slice(&u32::from(self.ipv4_address).to_le_bytes());
        out[offset::NODE_MAC..offset::NODE_MAC + 6].copy_from_slice(&self.mac_address.0);
        out[offset::NODE_ID] = self.node_id;
        out[offset::NODE_IS_CONNECTED] = self.is_connected as u8;
        out[offset::NODE_USER_NAME..offset::NODE_USER_NAME + USER_NAME_SIZE]
            .copy_from_slice(&self.user_name);
        out[offset::NODE_LOCAL_VERSION..offset::NODE_LOCAL_VERSION + 2]
            .copy_from_slice(&self.local_communication_version.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; NODE_INFO_SIZE] {
        let mut out = [0u8; NODE_INFO_SIZE];
        self.encode_into(&mut out);
        out
    }

    pub fn user_name(&self) -> String {
        nul_terminated(&self.user_name)
    }

    /// Store `name` truncated to 32 bytes, keeping a terminating NUL
    pub fn set_user_name(&mut self, name: &str) {
        self.user_name = [0; USER_NAME_SIZE];
        let bytes = name.as_bytes();
        let len = bytes.len().min(USER_NAME_SIZE - 1);
        self.user_name[..len].copy_from_slice(&bytes[..len]);
    }
}

/// Description of a hosted LDN network (scan response / sync payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub local_communication_id: u64,
    pub scene_id: u16,
    pub session_id: [u8; 16],
    pub bssid: MacAddr,
    pub ssid_length: u8,
    pub ssid_name: [u8; SSID_NAME_SIZE],
    pub channel: u16,
    pub link_level: u8,
    pub network_type: u8,
    pub security_parameter: [u8; 16],
    pub security_mode: u16,
    pub station_accept_policy: u8,
    pub node_count_max: u8,
    pub node_count: u8,
    pub nodes: [NodeInfo; NODE_COUNT_MAX],
    pub advertise_data_size: u16,
    pub advertise_data: Vec<u8>,
    pub authentication_id: u64,
}

impl Default for NetworkInfo {
    fn default() -> Self {
        Self {
            local_communication_id: 0,
            scene_id: 0,
            session_id: [0; 16],
            bssid: MacAddr::ZERO,
            ssid_length: 0,
            ssid_name: [0; SSID_NAME_SIZE],
            channel: 0,
            link_level: 0,
            network_type: 0,
            security_parameter: [0; 16],
            security_mode: 0,
            station_accept_policy: 0,
            node_count_max: NODE_COUNT_MAX as u8,
            node_count: 0,
            nodes: Default::default(),
            advertise_data_size: 0,
            advertise_data: Vec::new(),
            authentication_id: 0,
        }
    }
}

impl NetworkInfo {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NETWORK_INFO_SIZE {
            return Err(Error::Parse(format!(
                "NetworkInfo needs {} bytes, got {}",
                NETWORK_INFO_SIZE,
                buf.len()
            )));
        }

        let mut nodes: [NodeInfo; NODE_COUNT_MAX] = Default::default();
        for (i, node) in nodes.iter_mut().enumerate() {
            let at = offset::NODES + i * NODE_INFO_SIZE;
            *node = NodeInfo::decode(&buf[at..at + NODE_INFO_SIZE])?;
        }

        let advertise_data_size = u16_at(buf, offset::ADVERTISE_DATA_SIZE);
        let advertised = (advertise_data_size as usize).min(ADVERTISE_DATA_MAX);

        Ok(Self {
            local_communication_id: u64_at(buf, offset::LOCAL_COMMUNICATION_ID),
            scene_id: u16_at(buf, offset::SCENE_ID),
            session_id: array_at::<16>(buf, offset::SESSION_ID),
            bssid: MacAddr(array_at::<6>(buf, offset::BSSID)),
            ssid_length: buf[offset::SSID_LENGTH],
            ssid_name: array_at::<SSID_NAME_SIZE>(buf, offset::SSID_NAME),
            channel: u16_at(buf, offset::CHANNEL),
            link_level: buf[offset::LINK_LEVEL],
            network_type: buf[offset::NETWORK_TYPE],
            security_parameter: array_at::<16>(buf, offset::SECURITY_PARAMETER),
            security_mode: u16_at(buf, offset::SECURITY_MODE),
            station_accept_policy: buf[offset::STATION_ACCEPT_POLICY],
            node_count_max: buf[offset::NODE_COUNT_MAX],
            node_count: buf[offset::NODE_COUNT],
            nodes,
            advertise_data_size,
            advertise_data: buf[offset::ADVERTISE_DATA..offset::ADVERTISE_DATA + advertised]
                .to_vec(),
            authentication_id: u64_at(buf, offset::AUTHENTICATION_ID),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; NETWORK_INFO_SIZE];

        out[offset::LOCAL_COMMUNICATION_ID..offset::LOCAL_COMMUNICATION_ID + 8]
            .copy_from_slice(&self.local_communication_id.to_le_bytes());
        out[offset::SCENE_ID..offset::SCENE_ID + 2].copy_from_slice(&self.scene_id.to_le_bytes());
        out[offset::SESSION_ID..offset::SESSION_ID + 16].copy_from_slice(&self.session_id);

        out[offset::BSSID..offset::BSSID + 6].copy_from_slice(&self.bssid.0);
        out[offset::SSID_LENGTH] = self.ssid_length;
        out[offset::SSID_NAME..offset::SSID_NAME + SSID_NAME_SIZE]
            .copy_from_slice(&self.ssid_name);
        out[offset::CHANNEL..offset::CHANNEL + 2].copy_from_slice(&self.channel.to_le_bytes());
        out[offset::LINK_LEVEL] = self.link_level;
        out[offset::NETWORK_TYPE] = self.network_type;

        out[offset::SECURITY_PARAMETER..offset::SECURITY_PARAMETER + 16]
            .copy_from_slice(&self.security_parameter);
        out[offset::SECURITY_MODE..offset::SECURITY_MODE + 2]
            .copy_from_slice(&self.security_mode.to_le_bytes());
        out[offset::STATION_ACCEPT_POLICY] = self.station_accept_policy;
        out[offset::NODE_COUNT_MAX] = self.node_count_max;
        out[offset::NODE_COUNT] = self.node_count;
        for (i, node) in self.nodes.iter().enumerate() {
            node.encode_into(&mut out[offset::NODES + i * NODE_INFO_SIZE..]);
        }

        let advertised = self.advertise_data.len().min(ADVERTISE_DATA_MAX);
        out[offset::ADVERTISE_DATA_SIZE..offset::ADVERTISE_DATA_SIZE + 2]
            .copy_from_slice(&(advertised as u16).to_le_bytes());
        out[offset::ADVERTISE_DATA..offset::ADVERTISE_DATA + advertised]
            .copy_from_slice(&self.advertise_data[..advertised]);
        out[offset::AUTHENTICATION_ID..offset::AUTHENTICATION_ID + 8]
            .copy_from_slice(&self.authentication_id.to_le_bytes());

        out
    }

    pub fn ssid(&self) -> String {
        let len = (self.ssid_length as usize).min(SSID_NAME_SIZE);
        nul_terminated(&self.ssid_name[..len])
    }

    /// Nodes that report themselves connected
    pub fn connected_nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.iter().filter(|node| node.is_connected)
    }
}
