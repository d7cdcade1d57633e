use log::{debug, trace};

use crate::drives::DriveSet;
use crate::format::sector_offset;

// Register indices within the controller's memory-mapped window.
pub const REG_COMMAND: u8 = 0;
pub const REG_DATA: u8 = 1;
pub const REG_DRIVE: u8 = 2;
pub const REG_TRACK: u8 = 3;
pub const REG_SECTOR: u8 = 4;
pub const REG_STATUS: u8 = 5;

// Status register values.
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_ERROR: u8 = 0xFF;

/// Controller commands. Values of 4 and above are invalid, but the raw
/// byte is carried so the host can read back exactly what it wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Idle,
    ReadSector,
    WriteSector,
    SeekSector,
    Invalid(u8),
}

impl Command {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => Command::Idle,
            1 => Command::ReadSector,
            2 => Command::WriteSector,
            3 => Command::SeekSector,
            n => Command::Invalid(n),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Command::Idle => 0,
            Command::ReadSector => 1,
            Command::WriteSector => 2,
            Command::SeekSector => 3,
            Command::Invalid(n) => n,
        }
    }
}

/// The disk controller: five 8-bit registers plus an 8-bit streaming
/// cursor, backed by a set of drive slots. The register file *is* the
/// protocol state; each access validates against whatever is mounted
/// at that instant.
///
/// Not reentrant: a transfer is a sequence of register accesses sharing
/// the cursor, so callers must serialize access externally.
pub struct DiskController {
    drives: DriveSet,
    command: Command,
    drive: u8,
    track: u8,
    sector: u8,
    status: u8,
    byte_index: u8,
}

impl DiskController {
    /// Construct a controller over the given drives. All registers
    /// start at zero: command Idle, status ok.
    pub fn new(drives: DriveSet) -> Self {
        Self {
            drives,
            command: Command::Idle,
            drive: 0,
            track: 0,
            sector: 0,
            status: STATUS_OK,
            byte_index: 0,
        }
    }

    pub fn drives(&self) -> &DriveSet {
        &self.drives
    }

    /// Mutable access to the drives, e.g. to mount an image. Mounting
    /// never touches the register file, so a transfer in progress on
    /// another drive is unaffected.
    pub fn drives_mut(&mut self) -> &mut DriveSet {
        &mut self.drives
    }

    /// Handle a read of one of the memory-mapped registers. Every
    /// defined read except the status register's clears the status;
    /// unknown registers read as 0 with an error status.
    pub fn read_register(&mut self, reg: u8) -> u8 {
        match reg {
            REG_COMMAND => {
                self.status = STATUS_OK;
                self.command.to_byte()
            }
            REG_DATA => self.data_read(),
            REG_DRIVE => {
                self.status = STATUS_OK;
                self.drive
            }
            REG_TRACK => {
                self.status = STATUS_OK;
                self.track
            }
            REG_SECTOR => {
                self.status = STATUS_OK;
                self.sector
            }
            REG_STATUS => self.status,
            _ => {
                debug!("Read of unknown register {}.", reg);
                self.status = STATUS_ERROR;
                0
            }
        }
    }

    /// Handle a write to one of the memory-mapped registers. Writing
    /// the command, drive, track or sector register rewinds the byte
    /// cursor to the start of the sector.
    pub fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            REG_COMMAND => {
                trace!("command <- {}", value);
                self.command = Command::from_byte(value);
                self.byte_index = 0;
                self.status = match self.command {
                    Command::Invalid(_) => STATUS_ERROR,
                    _ => STATUS_OK,
                };
            }
            REG_DATA => self.data_write(value),
            REG_DRIVE => {
                trace!("drive <- {}", value);
                self.drive = value;
                self.byte_index = 0;
            }
            REG_TRACK => {
                trace!("track <- {}", value);
                self.track = value;
                self.byte_index = 0;
            }
            REG_SECTOR => {
                trace!("sector <- {}", value);
                self.sector = value;
                self.byte_index = 0;
            }
            _ => {
                debug!("Write of {} to unknown register {}.", value, reg);
                self.status = STATUS_ERROR;
            }
        }
    }

    /// Byte address of the current stream position, if the selected
    /// drive has a geometry and the address lies within its image.
    fn data_address(&self) -> Option<usize> {
        let geometry = self.drives.geometry(self.drive)?;
        let offset = sector_offset(geometry.sectors, self.track, self.sector);
        let address = offset as usize + self.byte_index as usize;
        if address < self.drives.size(self.drive as usize) {
            Some(address)
        } else {
            None
        }
    }

    fn data_read(&mut self) -> u8 {
        if self.command != Command::ReadSector {
            self.status = STATUS_ERROR;
            return 0;
        }
        match self.data_address() {
            Some(address) => {
                let value = self.drives.byte(self.drive as usize, address);
                trace!("data[{}] -> {:#04X}", self.byte_index, value);
                self.byte_index = self.byte_index.wrapping_add(1);
                self.status = STATUS_OK;
                value
            }
            None => {
                debug!(
                    "Data read outside drive {} (track {}, sector {}).",
                    self.drive, self.track, self.sector
                );
                self.status = STATUS_ERROR;
                0
            }
        }
    }

    fn data_write(&mut self, value: u8) {
        if self.command != Command::WriteSector {
            self.status = STATUS_ERROR;
            return;
        }
        match self.data_address() {
            Some(address) => {
                trace!("data[{}] <- {:#04X}", self.byte_index, value);
                self.drives.set_byte(self.drive as usize, address, value);
                self.byte_index = self.byte_index.wrapping_add(1);
                self.status = STATUS_OK;
            }
            None => {
                debug!(
                    "Data write outside drive {} (track {}, sector {}).",
                    self.drive, self.track, self.sector
                );
                self.status = STATUS_ERROR;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{SECTOR_SIZE, SIR_OFFSET};
    use crate::init_test_logging;

    const END_TRACK: u8 = 34;
    const END_SECTOR: u8 = 10;

    /// A zeroed image whose SIR declares the given geometry fields.
    fn formatted_image(end_track: u8, end_sector: u8) -> Vec<u8> {
        let tracks = end_track as usize + 1;
        let sectors = end_sector as usize;
        let mut image = vec![0; SECTOR_SIZE * tracks * sectors];
        image[SIR_OFFSET..SIR_OFFSET + 8].copy_from_slice(b"TESTDISK");
        image[SIR_OFFSET + 22] = end_track;
        image[SIR_OFFSET + 23] = end_sector;
        image
    }

    /// A controller with a freshly formatted image in drive 0.
    fn fixture() -> DiskController {
        init_test_logging();
        let mut drives = DriveSet::new();
        drives
            .mount(0, formatted_image(END_TRACK, END_SECTOR).as_slice())
            .unwrap();
        DiskController::new(drives)
    }

    /// Issue the full drive/track/sector/command selection sequence.
    fn select(ctrl: &mut DiskController, drive: u8, track: u8, sector: u8, command: Command) {
        ctrl.write_register(REG_DRIVE, drive);
        ctrl.write_register(REG_TRACK, track);
        ctrl.write_register(REG_SECTOR, sector);
        ctrl.write_register(REG_COMMAND, command.to_byte());
    }

    /// Generate a sector's worth of random bytes.
    fn random_sector() -> Vec<u8> {
        let mut sector = Vec::with_capacity(SECTOR_SIZE);
        sector.resize_with(SECTOR_SIZE, rand::random);
        sector
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut ctrl = fixture();

        // Stream 0x00..=0xFF into track 0, sector 1.
        select(&mut ctrl, 0, 0, 1, Command::WriteSector);
        for i in 0..=255u8 {
            ctrl.write_register(REG_DATA, i);
            assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
        }

        // Re-select and stream it back out.
        select(&mut ctrl, 0, 0, 1, Command::ReadSector);
        for i in 0..=255u8 {
            assert_eq!(ctrl.read_register(REG_DATA), i);
            assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
        }
    }

    #[test]
    fn round_trip_across_tracks() {
        let mut ctrl = fixture();
        let data = random_sector();

        // The last sector of the disk.
        select(&mut ctrl, 0, END_TRACK, END_SECTOR, Command::WriteSector);
        for &byte in &data {
            ctrl.write_register(REG_DATA, byte);
        }
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);

        select(&mut ctrl, 0, END_TRACK, END_SECTOR, Command::ReadSector);
        for &byte in &data {
            assert_eq!(ctrl.read_register(REG_DATA), byte);
        }

        // The neighbouring sector is untouched.
        select(&mut ctrl, 0, END_TRACK, END_SECTOR - 1, Command::ReadSector);
        for _ in 0..SECTOR_SIZE {
            assert_eq!(ctrl.read_register(REG_DATA), 0);
        }
    }

    /// The cursor is a single unsigned 8-bit counter: the 257th access
    /// silently revisits byte 0 of the same sector, with no bounds
    /// error and no advance to the next sector.
    #[test]
    fn byte_cursor_wraps_modulo_256() {
        let mut ctrl = fixture();

        select(&mut ctrl, 0, 0, 1, Command::WriteSector);
        for i in 0..=255u8 {
            ctrl.write_register(REG_DATA, i);
        }

        select(&mut ctrl, 0, 0, 1, Command::ReadSector);
        let first = ctrl.read_register(REG_DATA);
        for _ in 0..255 {
            ctrl.read_register(REG_DATA);
        }
        assert_eq!(ctrl.read_register(REG_DATA), first);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
    }

    #[test]
    fn data_access_requires_matching_command() {
        let mut ctrl = fixture();

        // Seek is accepted as a command but moves no data.
        select(&mut ctrl, 0, 0, 1, Command::SeekSector);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        // A write while in read mode must not touch the image.
        select(&mut ctrl, 0, 0, 1, Command::ReadSector);
        ctrl.write_register(REG_DATA, 0xEE);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
        assert_eq!(ctrl.drives().byte(0, 0), 0);
    }

    #[test]
    fn invalid_commands_error_and_do_nothing() {
        for value in [4, 5, 0x80, 0xFF] {
            let mut ctrl = fixture();
            select(&mut ctrl, 0, 0, 1, Command::Invalid(value));
            assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

            // The raw command byte reads back.
            assert_eq!(ctrl.read_register(REG_COMMAND), value);

            ctrl.write_register(REG_DATA, 0xEE);
            assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
            assert_eq!(ctrl.read_register(REG_DATA), 0);
            assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
            assert_eq!(ctrl.drives().byte(0, 0), 0);
        }
    }

    #[test]
    fn register_values_read_back() {
        let mut ctrl = fixture();
        select(&mut ctrl, 2, 17, 9, Command::SeekSector);
        assert_eq!(ctrl.read_register(REG_DRIVE), 2);
        assert_eq!(ctrl.read_register(REG_TRACK), 17);
        assert_eq!(ctrl.read_register(REG_SECTOR), 9);
        assert_eq!(ctrl.read_register(REG_COMMAND), Command::SeekSector.to_byte());
    }

    /// Reading the status register is the only read that leaves the
    /// status untouched; any other defined read clears it.
    #[test]
    fn status_reads_do_not_reset_status() {
        let mut ctrl = fixture();

        // Force an error.
        ctrl.read_register(200);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        // Any other defined register read clears it.
        ctrl.read_register(REG_TRACK);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
    }

    /// Writes to drive/track/sector leave the status register alone.
    #[test]
    fn select_writes_do_not_touch_status() {
        let mut ctrl = fixture();
        ctrl.read_register(200);
        ctrl.write_register(REG_DRIVE, 1);
        ctrl.write_register(REG_TRACK, 3);
        ctrl.write_register(REG_SECTOR, 2);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
    }

    #[test]
    fn unknown_registers_error() {
        let mut ctrl = fixture();
        assert_eq!(ctrl.read_register(6), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        ctrl.read_register(REG_DRIVE); // clear
        ctrl.write_register(6, 0x55);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        // The status register is not writable either.
        ctrl.read_register(REG_DRIVE);
        ctrl.write_register(REG_STATUS, 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
    }

    #[test]
    fn unmounted_drive_errors() {
        let mut ctrl = fixture();
        select(&mut ctrl, 1, 0, 1, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        // Drive numbers beyond the last slot behave the same.
        select(&mut ctrl, 200, 0, 1, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
    }

    /// An image below 1024 bytes mounts fine but has no geometry, so
    /// every data access fails.
    #[test]
    fn undersized_image_errors() {
        let mut ctrl = fixture();
        ctrl.drives_mut().mount(1, vec![0; 512].as_slice()).unwrap();
        select(&mut ctrl, 1, 0, 1, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
    }

    /// Track/sector values pointing past the end of the image report an
    /// error rather than touching memory.
    #[test]
    fn out_of_range_addresses_error() {
        let mut ctrl = fixture();
        select(&mut ctrl, 0, END_TRACK + 1, 1, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        select(&mut ctrl, 0, END_TRACK, END_SECTOR + 1, Command::WriteSector);
        ctrl.write_register(REG_DATA, 0xEE);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);
    }

    /// There is no per-track bounds check, only the image bounds: a
    /// sector number past the track's end aliases into the following
    /// track, as it always has on this controller.
    #[test]
    fn oversized_sector_number_aliases_forward() {
        let mut ctrl = fixture();
        // (track 0, sector 11) is the same byte run as (track 1,
        // sector 1).
        let aliased = crate::format::sector_offset(END_SECTOR, 1, 1) as usize;
        ctrl.drives_mut().set_byte(0, aliased, 0x5A);
        select(&mut ctrl, 0, 0, END_SECTOR + 1, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0x5A);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
    }

    /// Sector 0 underflows the 1-based adjustment. On track 0 the
    /// offset wraps far outside the image and errors, but on a later
    /// track the wrap cancels and lands on the previous track's last
    /// sector, exactly as the legacy arithmetic did.
    #[test]
    fn sector_zero_keeps_legacy_wraparound() {
        let mut ctrl = fixture();
        select(&mut ctrl, 0, 0, 0, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_ERROR);

        // (track 1, sector 0) aliases (track 0, sector 10).
        let aliased = crate::format::sector_offset(END_SECTOR, 0, 10) as usize;
        ctrl.drives_mut().set_byte(0, aliased, 0xA5);
        select(&mut ctrl, 0, 1, 0, Command::ReadSector);
        assert_eq!(ctrl.read_register(REG_DATA), 0xA5);
        assert_eq!(ctrl.read_register(REG_STATUS), STATUS_OK);
    }

    /// Mounting into one slot mid-transfer must not disturb a stream in
    /// progress on another.
    #[test]
    fn mount_during_stream_on_other_drive() {
        let mut ctrl = fixture();
        let data = random_sector();

        select(&mut ctrl, 0, 3, 4, Command::WriteSector);
        for &byte in &data {
            ctrl.write_register(REG_DATA, byte);
        }

        select(&mut ctrl, 0, 3, 4, Command::ReadSector);
        let mut read_back = Vec::with_capacity(SECTOR_SIZE);
        for i in 0..SECTOR_SIZE {
            if i == 100 {
                // Swap a new image into another slot mid-stream.
                ctrl.drives_mut()
                    .mount(3, formatted_image(4, 4).as_slice())
                    .unwrap();
            }
            read_back.push(ctrl.read_register(REG_DATA));
        }
        assert_eq!(read_back, data);
    }

    /// Writing any selection register rewinds the cursor.
    #[test]
    fn selection_writes_rewind_the_cursor() {
        let mut ctrl = fixture();
        select(&mut ctrl, 0, 0, 1, Command::WriteSector);
        for i in 0..=255u8 {
            ctrl.write_register(REG_DATA, i);
        }

        select(&mut ctrl, 0, 0, 1, Command::ReadSector);
        for _ in 0..10 {
            ctrl.read_register(REG_DATA);
        }
        // Re-writing the sector register restarts the stream.
        ctrl.write_register(REG_SECTOR, 1);
        assert_eq!(ctrl.read_register(REG_DATA), 0);

        for _ in 0..10 {
            ctrl.read_register(REG_DATA);
        }
        ctrl.write_register(REG_TRACK, 0);
        assert_eq!(ctrl.read_register(REG_DATA), 0);
    }

    #[test]
    fn command_round_trips_through_bytes() {
        for value in 0..=255u8 {
            assert_eq!(Command::from_byte(value).to_byte(), value);
        }
        assert_eq!(Command::from_byte(1), Command::ReadSector);
        assert_eq!(Command::from_byte(7), Command::Invalid(7));
    }
}
