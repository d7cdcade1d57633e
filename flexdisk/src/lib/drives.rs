use log::{debug, info};
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::format::{
    Geometry, SystemInfoRecord, MAX_IMAGE_SIZE, MIN_GEOMETRY_IMAGE, SIR_OFFSET,
};

/// Number of drive slots the controller exposes.
pub const NUM_DRIVES: usize = 4;

/// Reasons a mount can fail. The target slot's previous contents are
/// untouched in every case.
#[derive(Debug)]
pub enum MountError {
    /// The drive number does not exist.
    BadDrive(usize),
    /// The source was longer than `MAX_IMAGE_SIZE`.
    TooLarge,
    /// The source could not be read.
    Io(io::Error),
}

impl Display for MountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MountError::BadDrive(drive) => {
                write!(f, "drive {} does not exist", drive)
            }
            MountError::TooLarge => {
                write!(f, "image is larger than {} bytes", MAX_IMAGE_SIZE)
            }
            MountError::Io(e) => write!(f, "could not read image: {}", e),
        }
    }
}

impl From<io::Error> for MountError {
    fn from(e: io::Error) -> Self {
        MountError::Io(e)
    }
}

/// A fixed set of drive slots, each holding at most one in-memory disk
/// image. An empty buffer means the slot is unmounted.
pub struct DriveSet {
    drives: Vec<Vec<u8>>,
}

impl DriveSet {
    /// Construct a drive set with every slot unmounted.
    pub fn new() -> Self {
        Self {
            drives: vec![Vec::new(); NUM_DRIVES],
        }
    }

    /// Replace the image in the given slot with the bytes of `source`.
    /// May be called at any time; only the target slot is affected.
    pub fn mount<R: Read>(&mut self, drive: usize, source: R) -> Result<(), MountError> {
        if drive >= NUM_DRIVES {
            return Err(MountError::BadDrive(drive));
        }
        // Read one byte past the cap so an oversized source is detected
        // without slurping it whole.
        let mut image = Vec::new();
        source
            .take(MAX_IMAGE_SIZE as u64 + 1)
            .read_to_end(&mut image)?;
        if image.len() > MAX_IMAGE_SIZE {
            return Err(MountError::TooLarge);
        }
        info!("Mounted a {} byte image in drive {}.", image.len(), drive);
        self.drives[drive] = image;
        Ok(())
    }

    /// Mount the disk image file at `path`.
    pub fn mount_file(&mut self, drive: usize, path: impl AsRef<Path>) -> Result<(), MountError> {
        let path = path.as_ref();
        debug!("Mounting '{}' in drive {}.", path.display(), drive);
        let file = File::open(path)?;
        self.mount(drive, file)
    }

    /// True if the slot exists and contains an image.
    pub fn is_mounted(&self, drive: usize) -> bool {
        self.drives.get(drive).map_or(false, |image| !image.is_empty())
    }

    /// Size in bytes of the image in the slot; 0 if unmounted or the
    /// slot does not exist.
    pub fn size(&self, drive: usize) -> usize {
        self.drives.get(drive).map_or(0, Vec::len)
    }

    /// The geometry of the mounted image, re-read from its SIR on every
    /// call so it always reflects whatever is currently mounted. `None`
    /// if the drive does not exist, nothing is mounted, or the image is
    /// too small to contain the SIR.
    pub fn geometry(&self, drive: u8) -> Option<Geometry> {
        self.system_info(drive).map(|sir| sir.geometry())
    }

    /// Decode the full System Information Record of the mounted image.
    pub fn system_info(&self, drive: u8) -> Option<SystemInfoRecord> {
        let image = self.drives.get(drive as usize)?;
        if image.len() < MIN_GEOMETRY_IMAGE {
            return None;
        }
        SystemInfoRecord::decode(&image[SIR_OFFSET..]).ok()
    }

    /// Direct access to one byte of a slot's image. The caller is
    /// responsible for validating the drive and offset first, via
    /// `geometry` and `size`; an invalid access is a bug and panics.
    pub fn byte(&self, drive: usize, offset: usize) -> u8 {
        self.drives[drive][offset]
    }

    /// Directly overwrite one byte of a slot's image. Same contract as
    /// `byte`.
    pub fn set_byte(&mut self, drive: usize, offset: usize, value: u8) {
        self.drives[drive][offset] = value;
    }

    /// The raw bytes of a slot's image (empty if unmounted).
    pub fn image(&self, drive: usize) -> &[u8] {
        &self.drives[drive]
    }
}
