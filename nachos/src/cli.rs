//! Command-line surface, grounded in `r3bl`'s `clap::Parser` derive
//! conventions (the teacher has no hosted CLI of its own to draw from —
//! it boots from a `SystemConfigurationBuilder` a bootloader hands it).
use clap::Parser;

/// A simulated, single-disk, single-console pedagogical kernel.
#[derive(Debug, Parser)]
#[command(name = "nachos", version, about)]
pub struct Cli {
    /// Path to the disk image file. Created fresh if `--format` is set,
    /// otherwise mounted as an existing filesystem.
    #[arg(long, default_value = "nachos.dsk")]
    pub disk: std::path::PathBuf,

    /// Format the disk before doing anything else.
    #[arg(short = 'f', long = "format")]
    pub format: bool,

    /// Comma-separated debug categories to enable (thread, sync, fs, vm,
    /// syscall, machine), mirroring the original's `-d` flag.
    #[arg(short = 'd', long = "debug", value_delimiter = ',')]
    pub debug: Vec<String>,

    /// Run the user program at this path on the mounted filesystem.
    #[arg(short = 'x', long = "execute")]
    pub execute: Option<String>,

    /// Single-step: print a line per simulated clock tick. Mostly useful
    /// for watching the scheduler and event queue interleave by hand.
    #[arg(short = 's', long = "single-step")]
    pub single_step: bool,

    /// Number of physical frames the simulated machine has.
    #[arg(long, default_value_t = kernel::config::DEFAULT_NUM_FRAMES)]
    pub frames: usize,

    /// Disk size in sectors, used only together with `--format`.
    #[arg(long, default_value_t = kernel::config::DEFAULT_DISK_SECTORS)]
    pub disk_sectors: usize,
}

impl Cli {
    /// Build the `env_logger` filter string implementing the `-d`
    /// category list: each name becomes a `target=debug` clause, and
    /// everything else stays at `warn`.
    pub fn log_filter(&self) -> String {
        if self.debug.is_empty() {
            return "warn".to_string();
        }
        let mut filter = String::from("warn");
        for category in &self.debug {
            filter.push(',');
            filter.push_str(category.trim());
            filter.push_str("=debug");
        }
        filter
    }

    pub fn to_kernel_config(&self) -> kernel::Config {
        kernel::Config { num_frames: self.frames, disk_sectors: self.disk_sectors, ..Default::default() }
    }
}
