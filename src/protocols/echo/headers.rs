//! Synthetic header blob sent ahead of every echo.
//!
//! Mimics the lower-layer header pair the agent prepends to packets it
//! hands to the extension: an Ethernet header followed by the agent
//! header. Both are byte-packed with multi-byte fields in network order,
//! and the whole blob is built at compile time.

/// Length of an Ethernet hardware address.
pub const ETHER_ADDR_LEN: usize = 6;

/// EtherType for IPv4.
pub const ETHERTYPE_IP: u16 = 0x0800;

/// Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtherHeader {
    pub dhost: [u8; ETHER_ADDR_LEN],
    pub shost: [u8; ETHER_ADDR_LEN],
    pub ether_type: u16,
}

impl EtherHeader {
    pub const LEN: usize = 2 * ETHER_ADDR_LEN + 2;

    pub const fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        let mut i = 0;
        while i < ETHER_ADDR_LEN {
            out[i] = self.dhost[i];
            out[ETHER_ADDR_LEN + i] = self.shost[i];
            i += 1;
        }
        put_u16(out, 2 * ETHER_ADDR_LEN, self.ether_type)
    }
}

/// Agent command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentHeader {
    pub ifindex: u16,
    pub vrf: u16,
    pub cmd: u16,
    pub cmd_param: u32,
    pub cmd_param_1: u32,
    pub cmd_param_2: u32,
    pub cmd_param_3: u32,
    pub cmd_param_4: u32,
    /// Followed by three pad bytes on the wire.
    pub cmd_param_5: u8,
}

impl AgentHeader {
    pub const LEN: usize = 3 * 2 + 5 * 4 + 1 + 3;

    pub const fn encode(&self) -> [u8; Self::LEN] {
        let out = [0u8; Self::LEN];
        let out = put_u16(out, 0, self.ifindex);
        let out = put_u16(out, 2, self.vrf);
        let out = put_u16(out, 4, self.cmd);
        let out = put_u32(out, 6, self.cmd_param);
        let out = put_u32(out, 10, self.cmd_param_1);
        let out = put_u32(out, 14, self.cmd_param_2);
        let out = put_u32(out, 18, self.cmd_param_3);
        let mut out = put_u32(out, 22, self.cmd_param_4);
        out[26] = self.cmd_param_5;
        out
    }
}

const fn put_u16<const N: usize>(mut out: [u8; N], at: usize, value: u16) -> [u8; N] {
    let bytes = value.to_be_bytes();
    out[at] = bytes[0];
    out[at + 1] = bytes[1];
    out
}

const fn put_u32<const N: usize>(mut out: [u8; N], at: usize, value: u32) -> [u8; N] {
    let bytes = value.to_be_bytes();
    let mut i = 0;
    while i < 4 {
        out[at + i] = bytes[i];
        i += 1;
    }
    out
}

/// Ethernet header of the blob: host ...:01 to host ...:02, IPv4.
pub const FAKE_ETHER_HEADER: EtherHeader = EtherHeader {
    dhost: [0, 0, 0, 0, 0, 2],
    shost: [0, 0, 0, 0, 0, 1],
    ether_type: ETHERTYPE_IP,
};

/// Agent header of the blob: interface 12 in VRF 11, command 0.
pub const FAKE_AGENT_HEADER: AgentHeader = AgentHeader {
    ifindex: 12,
    vrf: 11,
    cmd: 0,
    cmd_param: 0,
    cmd_param_1: 0,
    cmd_param_2: 0,
    cmd_param_3: 0,
    cmd_param_4: 0,
    cmd_param_5: 0,
};

/// Total blob length, `H`.
pub const HEADERS_LEN: usize = EtherHeader::LEN + AgentHeader::LEN;

/// The blob: Ethernet header followed by agent header.
pub static SYNTHETIC_HEADERS: [u8; HEADERS_LEN] = build_headers();

const fn build_headers() -> [u8; HEADERS_LEN] {
    let ether = FAKE_ETHER_HEADER.encode();
    let agent = FAKE_AGENT_HEADER.encode();

    let mut out = [0u8; HEADERS_LEN];
    let mut i = 0;
    while i < EtherHeader::LEN {
        out[i] = ether[i];
        i += 1;
    }
    let mut j = 0;
    while j < AgentHeader::LEN {
        out[EtherHeader::LEN + j] = agent[j];
        j += 1;
    }
    out
}
