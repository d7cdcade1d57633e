mod error;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info, LevelFilter};
use std::io::{self, Write};

use flexdisk::{
    sector_offset, DirEntry, DiskController, DriveSet, DIR_ENTRY_OFFSET, DIR_ENTRY_SIZE,
    DIR_START_SECTOR, DIR_START_TRACK, REG_COMMAND, REG_DATA, REG_DRIVE, REG_SECTOR, REG_STATUS,
    REG_TRACK, SECTOR_SIZE, STATUS_ERROR,
};
use flexdisk_utils::hexprint::hex_block;

use crate::error::CliError;

const IMAGE_PATH: &str = "IMAGE_PATH";
const TRACK: &str = "track";
const SECTOR: &str = "sector";
const VERBOSITY: &str = "verbosity";

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    clap::command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new(VERBOSITY)
            .help("Specify up to three times to increase the verbosity of output.")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .value_parser(value_parser!(u8).range(..=3))
            .global(true))
        .subcommand(Command::new("info")
            .about("Print a disk image's volume information and geometry.")
            .arg(Arg::new(IMAGE_PATH)
                .help("The disk image to inspect.")
                .required(true)))
        .subcommand(Command::new("dump")
            .about("Hex-dump one sector of a disk image, streamed out \
                    through the controller's register protocol.")
            .arg(Arg::new(IMAGE_PATH)
                .help("The disk image to read.")
                .required(true))
            .arg(Arg::new(TRACK)
                .help("The track number (0-based).")
                .short('t')
                .long("track")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(u8)))
            .arg(Arg::new(SECTOR)
                .help("The sector number (1-based).")
                .short('s')
                .long("sector")
                .action(ArgAction::Set)
                .required(true)
                .value_parser(value_parser!(u8))))
        .subcommand(Command::new("dir")
            .about("List the directory of a disk image.")
            .arg(Arg::new(IMAGE_PATH)
                .help("The disk image to list.")
                .required(true)))
}

fn logging_format(formatter: &mut env_logger::fmt::Formatter,
                  record: &log::Record) -> io::Result<()> {
    let style = formatter.default_level_style(record.level());
    writeln!(formatter, "{:>7}  {}", style.value(record.level()), record.args())
}

/// Logging setup for normal build (not testing).
#[cfg(not(test))]
fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format(logging_format)
        .init();
}

/// Logging setup for testing build (properly captures stdout and ignores
/// multiple invocations).
#[cfg(test)]
fn init_logging(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format(logging_format)
        .is_test(true)
        .try_init();
}

/// Mount the image named on the command line into drive 0.
fn mount_from_args(args: &ArgMatches) -> Result<DriveSet, CliError> {
    let path = args.get_one::<String>(IMAGE_PATH).unwrap();
    let mut drives = DriveSet::new();
    drives.mount_file(0, path)
        .map_err(|e| CliError(format!("Failed to mount '{}': {}", path, e)))?;
    Ok(drives)
}

fn info_command(args: &ArgMatches) -> Result<(), CliError> {
    let drives = mount_from_args(args)?;
    let sir = drives.system_info(0)
        .ok_or_else(|| CliError(
            "Image is too small to contain a system information record.".into()))?;
    let geometry = sir.geometry();

    println!("Volume label:    {}", sir.label());
    println!("Volume number:   {}", sir.volume_number);
    println!("Geometry:        {} tracks of {} sectors",
             geometry.tracks, geometry.sectors);
    println!("Free chain:      {},{} to {},{}",
             sir.first_free_track, sir.first_free_sector,
             sir.last_free_track, sir.last_free_sector);
    println!("Free sectors:    {}", sir.free_sectors);
    println!("Created:         {:02}-{:02}-{:02}", sir.month, sir.day, sir.year);
    Ok(())
}

fn dump_command(args: &ArgMatches) -> Result<(), CliError> {
    let track = *args.get_one::<u8>(TRACK).unwrap();
    let sector = *args.get_one::<u8>(SECTOR).unwrap();
    let drives = mount_from_args(args)?;
    let geometry = drives.geometry(0)
        .ok_or_else(|| CliError(
            "Image is too small to contain a system information record.".into()))?;
    let mut controller = DiskController::new(drives);

    // Stream the sector out through the register protocol, exactly as
    // the host CPU would.
    controller.write_register(REG_DRIVE, 0);
    controller.write_register(REG_TRACK, track);
    controller.write_register(REG_SECTOR, sector);
    controller.write_register(REG_COMMAND, 1); // READ SECTOR
    let mut buffer = [0; SECTOR_SIZE];
    for byte in buffer.iter_mut() {
        *byte = controller.read_register(REG_DATA);
        if controller.read_register(REG_STATUS) == STATUS_ERROR {
            return Err(CliError(format!(
                "Track {} sector {} is outside the image.", track, sector)));
        }
    }
    info!("Read track {} sector {} successfully.", track, sector);

    let start = sector_offset(geometry.sectors, track, sector) as usize;
    println!("{}", hex_block(&buffer, start));
    Ok(())
}

fn dir_command(args: &ArgMatches) -> Result<(), CliError> {
    let drives = mount_from_args(args)?;
    let geometry = drives.geometry(0)
        .ok_or_else(|| CliError(
            "Image is too small to contain a system information record.".into()))?;
    let image = drives.image(0);

    let mut track = DIR_START_TRACK;
    let mut sector = DIR_START_SECTOR;
    let mut visited = 0;
    while !(track == 0 && sector == 0) {
        // Guard against a cyclic sector chain.
        visited += 1;
        if visited > image.len() / SECTOR_SIZE {
            return Err(CliError("Directory chain does not terminate.".into()));
        }

        let offset = sector_offset(geometry.sectors, track, sector) as usize;
        let raw = match image.get(offset..offset + SECTOR_SIZE) {
            Some(raw) => raw,
            None => return Err(CliError(format!(
                "Directory chain points outside the image ({},{}).", track, sector))),
        };

        for entry in raw[DIR_ENTRY_OFFSET..].chunks_exact(DIR_ENTRY_SIZE) {
            let entry = DirEntry::decode(entry)
                .map_err(|e| CliError(format!("Bad directory entry: {}", e)))?;
            if entry.is_free() {
                return Ok(());
            }
            if entry.is_deleted() {
                continue;
            }
            println!("{:<12}  {:>5} sectors  at {:>2},{:<3}  {:02}-{:02}-{:02}",
                     entry.file_name(), entry.total_sectors,
                     entry.start_track, entry.start_sector,
                     entry.month, entry.day, entry.year);
        }

        // Follow the link to the next directory sector.
        track = raw[0];
        sector = raw[1];
    }
    Ok(())
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e.0);
            1
        }
    };

    fn _run(args: ArgMatches) -> Result<(), CliError> {
        // Set up logging.
        let log_level = match args.get_count(VERBOSITY) {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            3 => LevelFilter::Trace,
            _ => unreachable!(),
        };
        init_logging(log_level);

        match args.subcommand() {
            Some(("info", sub)) => info_command(sub),
            Some(("dump", sub)) => dump_command(sub),
            Some(("dir", sub)) => dir_command(sub),
            _ => unreachable!(),
        }
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args).into());
}
