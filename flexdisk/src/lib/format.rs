//! The FLEX on-disk format, as far as the controller needs to know it:
//! fixed 256-byte sectors, a System Information Record at a fixed offset
//! in track 0, and 24-byte directory entries. Records are decoded
//! field-by-field at documented offsets with explicit endianness, never
//! by overlaying a packed struct on the image.

use std::io;

use flexdisk_utils::read_be::ReadBE;

/// Size of one sector in bytes. All addressing is in whole sectors.
pub const SECTOR_SIZE: usize = 256;

/// Byte offset of the System Information Record: 16 bytes into the
/// third sector of the image.
pub const SIR_OFFSET: usize = 2 * SECTOR_SIZE + 16;

/// Images smaller than this cannot contain the SIR, so they have no
/// geometry and cannot be addressed.
pub const MIN_GEOMETRY_IMAGE: usize = 1024;

/// FLEX does not support volumes larger than 16MiB.
pub const MAX_IMAGE_SIZE: usize = 16 * 1024 * 1024;

/// The directory starts at track 0, sector 5. Each directory sector
/// links to the next with a track/sector pair in its first two bytes;
/// a zero link terminates the chain.
pub const DIR_START_TRACK: u8 = 0;
pub const DIR_START_SECTOR: u8 = 5;

/// Directory entries start at this offset within a directory sector.
pub const DIR_ENTRY_OFFSET: usize = 16;

/// Size of one directory entry in bytes.
pub const DIR_ENTRY_SIZE: usize = 24;

/// Drive geometry, derived from the SIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of tracks, numbered from 0.
    pub tracks: u8,
    /// Number of sectors per track, numbered from 1.
    pub sectors: u8,
}

/// The System Information Record: volume metadata embedded at
/// `SIR_OFFSET` in every formatted image. The controller itself only
/// consumes `end_track`/`end_sector`; the rest is surfaced for
/// inspection and preserved verbatim in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfoRecord {
    pub volume_label: [u8; 11],
    pub volume_number: u16, // Big-endian on disk.
    pub first_free_track: u8,
    pub first_free_sector: u8,
    pub last_free_track: u8,
    pub last_free_sector: u8,
    pub free_sectors: u16, // Big-endian on disk.
    pub month: u8,
    pub day: u8,
    pub year: u8,
    pub end_track: u8,
    pub end_sector: u8,
}

impl SystemInfoRecord {
    /// Decode an SIR from the given stream, which must be positioned at
    /// `SIR_OFFSET`.
    pub fn decode<R: ReadBE>(mut source: R) -> io::Result<Self> {
        let mut volume_label = [0; 11];
        source.read_exact(&mut volume_label)?;
        Ok(Self {
            volume_label,
            volume_number: source.read_be_u16()?,
            first_free_track: source.read_u8()?,
            first_free_sector: source.read_u8()?,
            last_free_track: source.read_u8()?,
            last_free_sector: source.read_u8()?,
            free_sectors: source.read_be_u16()?,
            month: source.read_u8()?,
            day: source.read_u8()?,
            year: source.read_u8()?,
            end_track: source.read_u8()?,
            end_sector: source.read_u8()?,
        })
    }

    /// The geometry this volume was formatted with. `tracks` is
    /// `end_track + 1` (wrapping at u8 like the real controller),
    /// but `sectors` is the raw `end_sector` value. The asymmetry is
    /// how FLEX records its highest track and sector numbers; existing
    /// images depend on it, so it must not be "corrected".
    pub fn geometry(&self) -> Geometry {
        Geometry {
            tracks: self.end_track.wrapping_add(1),
            sectors: self.end_sector,
        }
    }

    /// The volume label as text, with trailing NULs and blanks trimmed.
    pub fn label(&self) -> String {
        let end = self
            .volume_label
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.volume_label[..end]).into_owned()
    }
}

/// One directory entry. Not interpreted by the controller core; decoded
/// read-only for directory listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 8],
    pub extension: [u8; 3],
    pub start_track: u8,
    pub start_sector: u8,
    pub end_track: u8,
    pub end_sector: u8,
    pub total_sectors: u16, // Big-endian on disk.
    pub random_file: u8,
    pub month: u8,
    pub day: u8,
    pub year: u8,
}

impl DirEntry {
    /// Decode a single 24-byte directory entry from the given stream.
    pub fn decode<R: ReadBE>(mut source: R) -> io::Result<Self> {
        let mut name = [0; 8];
        source.read_exact(&mut name)?;
        let mut extension = [0; 3];
        source.read_exact(&mut extension)?;
        let _reserved = source.read_be_u16()?;
        let start_track = source.read_u8()?;
        let start_sector = source.read_u8()?;
        let end_track = source.read_u8()?;
        let end_sector = source.read_u8()?;
        let total_sectors = source.read_be_u16()?;
        let random_file = source.read_u8()?;
        let _reserved2 = source.read_u8()?;
        Ok(Self {
            name,
            extension,
            start_track,
            start_sector,
            end_track,
            end_sector,
            total_sectors,
            random_file,
            month: source.read_u8()?,
            day: source.read_u8()?,
            year: source.read_u8()?,
        })
    }

    /// An entry slot that has never been used; terminates the listing.
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// A deleted entry whose slot may be reused.
    pub fn is_deleted(&self) -> bool {
        self.name[0] == 0xFF
    }

    /// The entry's file name as `NAME.EXT`, trimmed of padding.
    pub fn file_name(&self) -> String {
        let mut name = trim_padding(&self.name);
        let ext = trim_padding(&self.extension);
        if !ext.is_empty() {
            name.push('.');
            name.push_str(&ext);
        }
        name
    }
}

fn trim_padding(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Linear byte offset of the start of the given sector. Sector numbers
/// are 1-based and track numbers 0-based. The arithmetic wraps at 32
/// bits exactly like the real controller's, so a sector number of 0
/// underflows the 1-based adjustment instead of faulting.
pub fn sector_offset(sectors: u8, track: u8, sector: u8) -> u32 {
    let index = (sector as u32)
        .wrapping_sub(1)
        .wrapping_add(sectors as u32 * track as u32);
    (SECTOR_SIZE as u32).wrapping_mul(index)
}
