//! Exercises `SynchConsole` end to end through a booted `Kernel`: pushed
//! input bytes come back out of `read_byte`, and written bytes land in the
//! console's output buffer, both via the real async request/callback path.
use kernel::{Config, Kernel};
use std::sync::Arc;

#[test]
fn read_byte_returns_pushed_input_in_order() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();

    let console = machine::Console::new();
    console.push_input(b"ab");
    // The kernel's own console was already wired to a separate `Console`
    // at boot; exercise `SynchConsole`'s blocking wrapper directly against
    // a console we can script, reusing the kernel's event queue and
    // scheduler exactly as `Kernel::boot` does.
    let synch = kernel::console::SynchConsole::new(
        Arc::new(console),
        kernel.event_queue.clone(),
        kernel.scheduler.clone(),
    );
    assert_eq!(synch.read_byte(), Some(b'a'));
    assert_eq!(synch.read_byte(), Some(b'b'));
    assert_eq!(synch.read_byte(), None);
}

#[test]
fn write_byte_appends_to_the_console_output_buffer() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();

    let console = Arc::new(machine::Console::new());
    let synch = kernel::console::SynchConsole::new(console.clone(), kernel.event_queue.clone(), kernel.scheduler.clone());
    synch.write_byte(b'x');
    synch.write_byte(b'y');
    assert_eq!(console.output_so_far(), b"xy");
}
