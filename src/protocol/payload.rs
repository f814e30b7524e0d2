//! Payload records and their fixed wire layouts.
//!
//! The wire format overlays every payload shape in one union. Here each shape
//! is its own type and [`Payload`] tags which one a message carries. Fields are
//! written in host byte order, in the exact order listed on each record.

use super::RequestCode;

/// Maximum number of memory regions in one memory-table message.
pub const VHOST_MEMORY_MAX_NREGIONS: usize = 8;

/// Vring address flag: log used-ring writes.
pub const VHOST_VRING_F_LOG: u32 = 0;

/// Size of a 64-bit scalar payload.
pub const U64_PAYLOAD_SIZE: usize = 8;

/// Size of a vring-state payload.
pub const VRING_STATE_SIZE: usize = 8;

/// Size of a vring-address payload.
pub const VRING_ADDR_SIZE: usize = 40;

/// Size of one memory-region record.
pub const MEMORY_REGION_SIZE: usize = 32;

/// Size of the memory-table prefix (region count + padding).
pub const MEMORY_TABLE_HEADER_SIZE: usize = 8;

/// Capacity of the largest payload variant (a full memory table).
pub const MAX_PAYLOAD_SIZE: usize =
    MEMORY_TABLE_HEADER_SIZE + VHOST_MEMORY_MAX_NREGIONS * MEMORY_REGION_SIZE;

/// Index/count pair for ring size, base and enable requests.
///
/// Wire layout: `index: u32`, `num: u32`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VringState {
    /// Global vring index.
    pub index: u32,
    /// Count, base index or enable flag depending on the request.
    pub num: u32,
}

impl VringState {
    /// Create a vring state.
    pub fn new(index: u32, num: u32) -> Self {
        Self { index, num }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.num.to_ne_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            index: read_u32(bytes, 0),
            num: read_u32(bytes, 4),
        }
    }
}

/// Ring addresses, bit-compatible with `struct vhost_vring_addr`.
///
/// Wire layout: `index: u32`, `flags: u32`, `desc_user_addr: u64`,
/// `used_user_addr: u64`, `avail_user_addr: u64`, `log_guest_addr: u64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VringAddr {
    /// Global vring index.
    pub index: u32,
    /// Option flags, see [`VHOST_VRING_F_LOG`].
    pub flags: u32,
    /// Descriptor table address.
    pub desc_user_addr: u64,
    /// Used ring address.
    pub used_user_addr: u64,
    /// Available ring address.
    pub avail_user_addr: u64,
    /// Guest address for used-ring logging.
    pub log_guest_addr: u64,
}

impl VringAddr {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.flags.to_ne_bytes());
        buf.extend_from_slice(&self.desc_user_addr.to_ne_bytes());
        buf.extend_from_slice(&self.used_user_addr.to_ne_bytes());
        buf.extend_from_slice(&self.avail_user_addr.to_ne_bytes());
        buf.extend_from_slice(&self.log_guest_addr.to_ne_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            index: read_u32(bytes, 0),
            flags: read_u32(bytes, 4),
            desc_user_addr: read_u64(bytes, 8),
            used_user_addr: read_u64(bytes, 16),
            avail_user_addr: read_u64(bytes, 24),
            log_guest_addr: read_u64(bytes, 32),
        }
    }
}

/// One shared memory region.
///
/// Wire layout: `guest_phys_addr`, `memory_size`, `userspace_addr`,
/// `mmap_offset`, all `u64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Address the peer uses to translate ring addresses.
    pub guest_phys_addr: u64,
    /// Region size in bytes.
    pub memory_size: u64,
    /// Address of the region in this process.
    pub userspace_addr: u64,
    /// Offset of the region within its backing file.
    pub mmap_offset: u64,
}

impl MemoryRegion {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.guest_phys_addr.to_ne_bytes());
        buf.extend_from_slice(&self.memory_size.to_ne_bytes());
        buf.extend_from_slice(&self.userspace_addr.to_ne_bytes());
        buf.extend_from_slice(&self.mmap_offset.to_ne_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            guest_phys_addr: read_u64(bytes, 0),
            memory_size: read_u64(bytes, 8),
            userspace_addr: read_u64(bytes, 16),
            mmap_offset: read_u64(bytes, 24),
        }
    }
}

/// A memory table: up to [`VHOST_MEMORY_MAX_NREGIONS`] regions.
///
/// Only the populated regions go on the wire, so the payload length is
/// `8 + 32 * regions.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTable {
    regions: Vec<MemoryRegion>,
}

impl MemoryTable {
    /// Build a table, or `None` if there are more regions than the cap.
    pub fn new(regions: Vec<MemoryRegion>) -> Option<Self> {
        (regions.len() <= VHOST_MEMORY_MAX_NREGIONS).then_some(Self { regions })
    }

    /// The regions in wire order.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the table has no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn wire_len(&self) -> usize {
        MEMORY_TABLE_HEADER_SIZE + self.regions.len() * MEMORY_REGION_SIZE
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.regions.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        for region in &self.regions {
            region.encode(buf);
        }
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MEMORY_TABLE_HEADER_SIZE {
            return None;
        }
        let count = read_u32(bytes, 0) as usize;
        if count > VHOST_MEMORY_MAX_NREGIONS
            || bytes.len() != MEMORY_TABLE_HEADER_SIZE + count * MEMORY_REGION_SIZE
        {
            return None;
        }
        let regions = bytes[MEMORY_TABLE_HEADER_SIZE..]
            .chunks_exact(MEMORY_REGION_SIZE)
            .map(MemoryRegion::decode)
            .collect();
        Some(Self { regions })
    }
}

/// Payload carried by a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No payload.
    Empty,
    /// 64-bit scalar (features, log base, vring-file word).
    U64(u64),
    /// Vring index/count pair.
    VringState(VringState),
    /// Vring addresses.
    VringAddr(VringAddr),
    /// Memory table.
    MemoryTable(MemoryTable),
    /// Bytes whose length does not fit the request's payload shape.
    Raw(Vec<u8>),
}

impl Payload {
    /// Number of payload bytes on the wire.
    pub fn wire_len(&self) -> usize {
        match self {
            Payload::Empty => 0,
            Payload::U64(_) => U64_PAYLOAD_SIZE,
            Payload::VringState(_) => VRING_STATE_SIZE,
            Payload::VringAddr(_) => VRING_ADDR_SIZE,
            Payload::MemoryTable(table) => table.wire_len(),
            Payload::Raw(bytes) => bytes.len(),
        }
    }

    /// Append the wire encoding to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Payload::Empty => {}
            Payload::U64(value) => buf.extend_from_slice(&value.to_ne_bytes()),
            Payload::VringState(state) => state.encode(buf),
            Payload::VringAddr(addr) => addr.encode(buf),
            Payload::MemoryTable(table) => table.encode(buf),
            Payload::Raw(bytes) => buf.extend_from_slice(bytes),
        }
    }

    /// Interpret `bytes` according to the payload shape `request` uses.
    ///
    /// Bytes whose length does not match that shape come back as [`Payload::Raw`]
    /// so the caller can report the size mismatch.
    pub fn decode(request: RequestCode, bytes: &[u8]) -> Payload {
        use RequestCode::*;

        if bytes.is_empty() {
            return Payload::Empty;
        }
        let decoded = match request {
            GetFeatures | SetFeatures | SetLogBase | SetVringKick | SetVringCall
            | SetVringErr | GetProtocolFeatures | SetProtocolFeatures | GetQueueNum
            | SendRarp
                if bytes.len() == U64_PAYLOAD_SIZE =>
            {
                Some(Payload::U64(read_u64(bytes, 0)))
            }
            SetVringNum | SetVringBase | GetVringBase | SetVringEnable
                if bytes.len() == VRING_STATE_SIZE =>
            {
                Some(Payload::VringState(VringState::decode(bytes)))
            }
            SetVringAddr if bytes.len() == VRING_ADDR_SIZE => {
                Some(Payload::VringAddr(VringAddr::decode(bytes)))
            }
            SetMemTable => MemoryTable::decode(bytes).map(Payload::MemoryTable),
            _ => Option::None,
        };
        decoded.unwrap_or_else(|| Payload::Raw(bytes.to_vec()))
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_ne_bytes(raw)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_ne_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(payload: &Payload) -> Vec<u8> {
        let mut buf = Vec::new();
        payload.encode(&mut buf);
        buf
    }

    #[test]
    fn test_max_payload_is_full_memory_table() {
        assert_eq!(MAX_PAYLOAD_SIZE, 264);
    }

    #[test]
    fn test_vring_addr_field_order() {
        let addr = VringAddr {
            index: 1,
            flags: 1 << VHOST_VRING_F_LOG,
            desc_user_addr: 0x1000,
            used_user_addr: 0x2000,
            avail_user_addr: 0x3000,
            log_guest_addr: 0x4000,
        };
        let bytes = encoded(&Payload::VringAddr(addr));
        assert_eq!(bytes.len(), VRING_ADDR_SIZE);
        assert_eq!(&bytes[0..4], &1u32.to_ne_bytes());
        assert_eq!(&bytes[8..16], &0x1000u64.to_ne_bytes());
        assert_eq!(&bytes[16..24], &0x2000u64.to_ne_bytes());
        assert_eq!(&bytes[24..32], &0x3000u64.to_ne_bytes());
        assert_eq!(
            Payload::decode(RequestCode::SetVringAddr, &bytes),
            Payload::VringAddr(addr)
        );
    }

    #[test]
    fn test_memory_table_layout() {
        let region = MemoryRegion {
            guest_phys_addr: 0x7f00_0000_0000,
            memory_size: 0x4000_0000,
            userspace_addr: 0x7f00_0000_0000,
            mmap_offset: 0,
        };
        let table = MemoryTable::new(vec![region, region]).unwrap();
        let payload = Payload::MemoryTable(table.clone());
        let bytes = encoded(&payload);

        assert_eq!(payload.wire_len(), 8 + 2 * 32);
        assert_eq!(bytes.len(), payload.wire_len());
        assert_eq!(&bytes[0..4], &2u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &0x4000_0000u64.to_ne_bytes());
        assert_eq!(
            Payload::decode(RequestCode::SetMemTable, &bytes),
            Payload::MemoryTable(table)
        );
    }

    #[test]
    fn test_memory_table_cap() {
        let regions = vec![MemoryRegion::default(); VHOST_MEMORY_MAX_NREGIONS + 1];
        assert!(MemoryTable::new(regions).is_none());
    }

    #[test]
    fn test_decode_wrong_size_is_raw() {
        let bytes = [1u8, 2, 3, 4];
        assert_eq!(
            Payload::decode(RequestCode::GetFeatures, &bytes),
            Payload::Raw(bytes.to_vec())
        );
        assert_eq!(Payload::decode(RequestCode::GetFeatures, &[]), Payload::Empty);
    }

    #[test]
    fn test_same_size_decodes_by_request() {
        let state = VringState::new(3, 256);
        let bytes = encoded(&Payload::VringState(state));
        assert_eq!(
            Payload::decode(RequestCode::GetVringBase, &bytes),
            Payload::VringState(state)
        );
        assert!(matches!(
            Payload::decode(RequestCode::GetFeatures, &bytes),
            Payload::U64(_)
        ));
    }
}
