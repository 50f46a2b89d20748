//! OLE2 compound file (CFB) writer.
//!
//! Packs named streams into the 512-byte-sector structured storage
//! layout per [MS-CFB]: header with embedded DIFAT, FAT chains for
//! large streams, a MiniFAT-backed ministream for streams under 4096
//! bytes, and a directory organized as the balanced entry tree Office
//! readers expect.

use crate::error::{DocumentError, DocumentResult};

pub const SECTOR_SIZE: usize = 512;
pub const MINI_SECTOR_SIZE: usize = 64;
pub const MINI_STREAM_CUTOFF: usize = 4096;

pub const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub const FREESECT: u32 = 0xFFFF_FFFF;
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
pub const FATSECT: u32 = 0xFFFF_FFFD;
pub const DIFSECT: u32 = 0xFFFF_FFFC;

pub const NOSTREAM: u32 = 0xFFFF_FFFF;

const STGTY_STORAGE: u8 = 1;
const STGTY_STREAM: u8 = 2;
const STGTY_ROOT: u8 = 5;

// =============================================================================
// Sector Allocation
// =============================================================================

/// Sequential sector allocator: data sectors and their FAT entries grow
/// together, so the file body is just `data` appended after the header.
#[derive(Debug, Default)]
struct Sectors {
    fat: Vec<u32>,
    data: Vec<u8>,
}

impl Sectors {
    fn next_sector(&self) -> u32 {
        self.fat.len() as u32
    }

    /// Append `payload` as a linked chain of sectors, zero-padded to the
    /// sector boundary. Returns the start sector.
    fn push_chain(&mut self, payload: &[u8]) -> u32 {
        if payload.is_empty() {
            return ENDOFCHAIN;
        }
        let count = payload.len().div_ceil(SECTOR_SIZE);
        let start = self.next_sector();
        for i in 0..count {
            let next = if i + 1 < count {
                start + i as u32 + 1
            } else {
                ENDOFCHAIN
            };
            self.fat.push(next);
        }
        self.data.extend_from_slice(payload);
        self.data.resize((start as usize + count) * SECTOR_SIZE, 0);
        start
    }

    /// Reserve `count` zeroed sectors carrying `marker` in the FAT
    /// (FATSECT / DIFSECT). Their content is patched in later.
    fn reserve(&mut self, count: u32, marker: u32) -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }
        let start = self.next_sector();
        for _ in 0..count {
            self.fat.push(marker);
        }
        self.data.resize(self.data.len() + count as usize * SECTOR_SIZE, 0);
        start
    }

    fn patch(&mut self, sector: u32, bytes: &[u8]) {
        let offset = sector as usize * SECTOR_SIZE;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Serialize the FAT itself, FREESECT-padded to whole sectors.
    fn fat_bytes(&self, fat_sector_count: u32) -> Vec<u8> {
        let mut bytes = vec![0xFFu8; fat_sector_count as usize * SECTOR_SIZE];
        for (i, &entry) in self.fat.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&entry.to_le_bytes());
        }
        bytes
    }
}

// =============================================================================
// MiniFAT
// =============================================================================

#[derive(Debug, Default)]
struct MiniSectors {
    minifat: Vec<u32>,
    ministream: Vec<u8>,
}

impl MiniSectors {
    fn push_chain(&mut self, payload: &[u8]) -> u32 {
        if payload.is_empty() {
            return ENDOFCHAIN;
        }
        let count = payload.len().div_ceil(MINI_SECTOR_SIZE);
        let start = self.minifat.len() as u32;
        for i in 0..count {
            let next = if i + 1 < count {
                start + i as u32 + 1
            } else {
                ENDOFCHAIN
            };
            self.minifat.push(next);
        }
        self.ministream.extend_from_slice(payload);
        self.ministream
            .resize((start as usize + count) * MINI_SECTOR_SIZE, 0);
        start
    }

    fn is_empty(&self) -> bool {
        self.minifat.is_empty()
    }

    fn minifat_bytes(&self) -> Vec<u8> {
        let sector_count = self.minifat.len().div_ceil(SECTOR_SIZE / 4);
        let mut bytes = vec![0xFFu8; sector_count * SECTOR_SIZE];
        for (i, &entry) in self.minifat.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&entry.to_le_bytes());
        }
        bytes
    }
}

// =============================================================================
// Directory
// =============================================================================

#[derive(Debug, Clone)]
struct DirEntry {
    name: String,
    entry_type: u8,
    start_sector: u32,
    size: u64,
    sid_left: u32,
    sid_right: u32,
    sid_child: u32,
}

impl DirEntry {
    fn new(name: &str, entry_type: u8, start_sector: u32, size: u64) -> Self {
        Self {
            name: name.to_string(),
            entry_type,
            start_sector,
            size,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
        }
    }

    fn to_bytes(&self) -> [u8; 128] {
        let mut data = [0u8; 128];
        let utf16: Vec<u16> = self.name.encode_utf16().collect();
        let name_len = utf16.len().min(31);
        for (i, unit) in utf16.iter().take(name_len).enumerate() {
            data[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        // Length in bytes including the null terminator
        data[64..66].copy_from_slice(&(((name_len + 1) * 2) as u16).to_le_bytes());
        data[66] = self.entry_type;
        data[67] = 1; // black
        data[68..72].copy_from_slice(&self.sid_left.to_le_bytes());
        data[72..76].copy_from_slice(&self.sid_right.to_le_bytes());
        data[76..80].copy_from_slice(&self.sid_child.to_le_bytes());
        data[116..120].copy_from_slice(&self.start_sector.to_le_bytes());
        data[120..128].copy_from_slice(&self.size.to_le_bytes());
        data
    }
}

/// Order entries the way POI's PropertyComparator does: shorter names
/// first, then case-insensitive alphabetical.
fn entry_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.len()
        .cmp(&b.len())
        .then_with(|| a.to_uppercase().cmp(&b.to_uppercase()))
}

/// Link root's children into the balanced tree Office expects: sorted
/// list, middle entry becomes the child pointer, the rest chain off it.
fn link_children(entries: &mut [DirEntry], child_sids: &mut [u32]) {
    if child_sids.is_empty() {
        return;
    }
    child_sids.sort_by(|&a, &b| entry_order(&entries[a as usize].name, &entries[b as usize].name));

    let midpoint = child_sids.len() / 2;
    entries[0].sid_child = child_sids[midpoint];

    // Left chain runs backwards from the midpoint
    for j in 1..=midpoint {
        entries[child_sids[j] as usize].sid_left = child_sids[j - 1];
    }
    // Right chain runs forwards from the midpoint
    for j in midpoint..child_sids.len() - 1 {
        entries[child_sids[j] as usize].sid_right = child_sids[j + 1];
    }
}

// =============================================================================
// Compound File Writer
// =============================================================================

/// Accumulates named streams, then serializes the whole container.
#[derive(Debug, Default)]
pub struct CompoundFile {
    streams: Vec<(String, Vec<u8>)>,
}

impl CompoundFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root-level stream, replacing any stream of the same name.
    pub fn add_stream(&mut self, name: &str, data: Vec<u8>) {
        if let Some(existing) = self.streams.iter_mut().find(|(n, _)| n == name) {
            existing.1 = data;
        } else {
            self.streams.push((name.to_string(), data));
        }
    }

    /// Serialize the container.
    pub fn into_bytes(self) -> DocumentResult<Vec<u8>> {
        let mut sectors = Sectors::default();
        let mut mini = MiniSectors::default();

        // Small streams pack into the ministream, large ones get FAT
        // chains directly. Large streams are allocated first so their
        // sectors come before bookkeeping structures.
        let mut placed: Vec<(String, u32, u64)> = Vec::new();
        let mut small: Vec<(String, Vec<u8>)> = Vec::new();
        for (name, data) in self.streams {
            if data.len() < MINI_STREAM_CUTOFF {
                small.push((name, data));
            } else {
                let start = sectors.push_chain(&data);
                placed.push((name, start, data.len() as u64));
            }
        }
        for (name, data) in &small {
            let start = mini.push_chain(data);
            placed.push((name.clone(), start, data.len() as u64));
        }

        let (ministream_start, ministream_size) = if mini.is_empty() {
            (ENDOFCHAIN, 0u64)
        } else {
            let start = sectors.push_chain(&mini.ministream);
            (start, mini.ministream.len() as u64)
        };

        // Directory entries: root is SID 0, streams follow in
        // allocation order.
        let mut entries = vec![DirEntry::new(
            "Root Entry",
            STGTY_ROOT,
            ministream_start,
            ministream_size,
        )];
        let mut child_sids: Vec<u32> = Vec::new();
        for (name, start, size) in &placed {
            child_sids.push(entries.len() as u32);
            entries.push(DirEntry::new(name, STGTY_STREAM, *start, *size));
        }
        link_children(&mut entries, &mut child_sids);

        let mut dir_stream = Vec::with_capacity(entries.len() * 128);
        for entry in &entries {
            dir_stream.extend_from_slice(&entry.to_bytes());
        }
        let dir_start = sectors.push_chain(&dir_stream);

        let (minifat_start, minifat_sector_count) = if mini.is_empty() {
            (ENDOFCHAIN, 0u32)
        } else {
            let bytes = mini.minifat_bytes();
            let count = (bytes.len() / SECTOR_SIZE) as u32;
            (sectors.push_chain(&bytes), count)
        };

        // FAT and DIFAT sector counts depend on each other; iterate to a
        // fixpoint like POI does.
        let entries_per_fat_sector = (SECTOR_SIZE / 4) as u32;
        let ids_per_difat_sector = entries_per_fat_sector - 1;
        let used = sectors.next_sector();
        let mut fat_count: u32 = 0;
        let mut difat_count: u32 = 0;
        loop {
            let total = used + fat_count + difat_count;
            let next_fat = total.div_ceil(entries_per_fat_sector);
            let next_difat = if next_fat > 109 {
                (next_fat - 109).div_ceil(ids_per_difat_sector)
            } else {
                0
            };
            if next_fat == fat_count && next_difat == difat_count {
                break;
            }
            fat_count = next_fat;
            difat_count = next_difat;
        }

        let difat_start = sectors.reserve(difat_count, DIFSECT);
        let fat_start = sectors.reserve(fat_count, FATSECT);
        if sectors.fat.len() > fat_count as usize * entries_per_fat_sector as usize {
            return Err(DocumentError::Writer(
                "FAT sector reservation fell short".to_string(),
            ));
        }

        // Patch FAT content into its reserved sectors
        let fat_bytes = sectors.fat_bytes(fat_count);
        sectors.patch(fat_start, &fat_bytes);

        // DIFAT sectors hold FAT sector ids 109.. with a trailing
        // next-sector pointer per sector
        let fat_sector_ids: Vec<u32> = (fat_start..fat_start + fat_count).collect();
        if difat_count > 0 {
            let mut overflow = &fat_sector_ids[109..];
            for i in 0..difat_count {
                let mut sector = vec![0xFFu8; SECTOR_SIZE];
                let take = overflow.len().min(ids_per_difat_sector as usize);
                for (j, &id) in overflow[..take].iter().enumerate() {
                    sector[j * 4..j * 4 + 4].copy_from_slice(&id.to_le_bytes());
                }
                overflow = &overflow[take..];
                let next = if i + 1 < difat_count {
                    difat_start + i + 1
                } else {
                    ENDOFCHAIN
                };
                sector[SECTOR_SIZE - 4..].copy_from_slice(&next.to_le_bytes());
                sectors.patch(difat_start + i, &sector);
            }
        }

        // Header
        let mut header = vec![0u8; SECTOR_SIZE];
        header[0..8].copy_from_slice(&MAGIC);
        header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes()); // minor version
        header[26..28].copy_from_slice(&3u16.to_le_bytes()); // DLL version
        header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes()); // byte order
        header[30..32].copy_from_slice(&9u16.to_le_bytes()); // sector shift
        header[32..34].copy_from_slice(&6u16.to_le_bytes()); // mini sector shift
        header[44..48].copy_from_slice(&fat_count.to_le_bytes());
        header[48..52].copy_from_slice(&dir_start.to_le_bytes());
        header[56..60].copy_from_slice(&(MINI_STREAM_CUTOFF as u32).to_le_bytes());
        header[60..64].copy_from_slice(&minifat_start.to_le_bytes());
        header[64..68].copy_from_slice(&minifat_sector_count.to_le_bytes());
        header[68..72].copy_from_slice(&if difat_count > 0 { difat_start } else { ENDOFCHAIN }.to_le_bytes());
        header[72..76].copy_from_slice(&difat_count.to_le_bytes());
        for slot in 0..109usize {
            let value = fat_sector_ids.get(slot).copied().unwrap_or(FREESECT);
            let offset = 76 + slot * 4;
            header[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }

        let mut file = header;
        file.extend_from_slice(&sectors.data);
        Ok(file)
    }
}
