mod controller;
mod drives;
mod format;

// Public API.
pub use controller::{
    Command, DiskController, REG_COMMAND, REG_DATA, REG_DRIVE, REG_SECTOR, REG_STATUS, REG_TRACK,
    STATUS_ERROR, STATUS_OK,
};
pub use drives::{DriveSet, MountError, NUM_DRIVES};
pub use format::{
    sector_offset, DirEntry, Geometry, SystemInfoRecord, DIR_ENTRY_OFFSET, DIR_ENTRY_SIZE,
    DIR_START_SECTOR, DIR_START_TRACK, MAX_IMAGE_SIZE, MIN_GEOMETRY_IMAGE, SECTOR_SIZE, SIR_OFFSET,
};

/// Initialise logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    use std::io::Write;

    // The logger can only be initialised once, but we don't know the order of
    // tests. Therefore we use `try_init` and ignore the result.
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("trace"))
        .format(|out, record| {
            writeln!(out, "{:>7} {}", record.level(), record.args())
        })
        .is_test(true)
        .try_init();
}
