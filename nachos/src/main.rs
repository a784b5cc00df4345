//! Entry point: parse CLI flags, boot a [`kernel::Kernel`] against a disk
//! image, optionally run a user program, and exit with its status. The
//! counterpart to the original's `main.cc`, with the global `Statistics`/
//! `Kernel` singletons replaced by the explicit [`kernel::Kernel`] object
//! `nachos` owns for the lifetime of the process.
mod cli;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    env_logger::Builder::new().parse_filters(&cli.log_filter()).init();

    let disk = if cli.format {
        Arc::new(machine::Disk::new_formatted(cli.disk_sectors))
    } else {
        match machine::Disk::open_file(&cli.disk, cli.disk_sectors) {
            Ok(disk) => Arc::new(disk),
            Err(err) => {
                log::error!(target: "machine", "failed to open disk image {}: {err}", cli.disk.display());
                return ExitCode::FAILURE;
            }
        }
    };

    let kernel = match kernel::Kernel::boot(cli.to_kernel_config(), disk, cli.format) {
        Ok(kernel) => kernel,
        Err(err) => {
            log::error!(target: "machine", "kernel boot failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let Some(program) = cli.execute.as_deref() else {
        log::info!(target: "thread", "no program given (-x), nothing to run");
        return ExitCode::SUCCESS;
    };

    let tid = match kernel.dispatcher.launch(program) {
        Ok(tid) => tid,
        Err(err) => {
            log::error!(target: "syscall", "failed to launch {program}: {err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.single_step {
        log::info!(target: "machine", "single-stepping tid {tid} to completion");
    }
    kernel.dispatcher.wait(tid);

    if kernel.halted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
