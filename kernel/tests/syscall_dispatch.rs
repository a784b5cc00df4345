//! Drives `Dispatcher::handle` directly against a manufactured trap frame,
//! the way a page-fault-free syscall trap would arrive from user mode, and
//! `Dispatcher::launch`/`wait`, the host CLI's entry point for `-x`.
use kernel::mm::AddressSpace;
use kernel::syscall::{SYS_CREATE, SYS_WRITE};
use kernel::thread::{Current, ThreadBuilder};
use kernel::{Config, Kernel};
use machine::cpu::{REG_ARGS, REG_SYSCALL_CODE};
use machine::{RegisterFile, Va};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn create_syscall_creates_the_named_file_through_the_dispatcher() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();
    let dispatcher = kernel.dispatcher.clone();

    let ran = Arc::new(AtomicBool::new(false));
    let ran2 = ran.clone();
    let handle = ThreadBuilder::new("probe").spawn(&kernel.scheduler.clone(), 16, move || {
        let thread = Current::with(|t| t.clone());
        let space = Arc::new(AddressSpace::new(4, Arc::new(Vec::new())));
        thread.set_address_space(space.clone());

        let tick = dispatcher.mm.next_tick();
        let pa = dispatcher.mm.translate(&space, Va::new(0), tick, true).unwrap();
        dispatcher.mm.write_frame(pa.frame(), 0, b"made.txt\0");

        let mut regs = RegisterFile::new(0);
        regs.gpr[REG_SYSCALL_CODE] = SYS_CREATE;
        regs.gpr[REG_ARGS[0]] = 0;
        thread.set_registers(regs);

        dispatcher.handle(&thread);
        ran2.store(true, Ordering::SeqCst);
    });
    handle.join();

    assert!(ran.load(Ordering::SeqCst));
    assert!(kernel.fs.open("made.txt").is_ok());
}

#[test]
fn write_syscall_to_stdout_reaches_the_console() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();
    let dispatcher = kernel.dispatcher.clone();

    let handle = ThreadBuilder::new("writer").spawn(&kernel.scheduler.clone(), 16, move || {
        let thread = Current::with(|t| t.clone());
        let space = Arc::new(AddressSpace::new(4, Arc::new(Vec::new())));
        thread.set_address_space(space.clone());

        let tick = dispatcher.mm.next_tick();
        let pa = dispatcher.mm.translate(&space, Va::new(0), tick, true).unwrap();
        dispatcher.mm.write_frame(pa.frame(), 0, b"hey");

        let mut regs = RegisterFile::new(0);
        regs.gpr[REG_SYSCALL_CODE] = SYS_WRITE;
        regs.gpr[REG_ARGS[0]] = 0; // buf_addr
        regs.gpr[REG_ARGS[1]] = 3; // size
        regs.gpr[REG_ARGS[2]] = 1; // fd = stdout
        thread.set_registers(regs);

        dispatcher.handle(&thread);
        thread.registers().gpr[machine::cpu::REG_RETURN]
    });
    assert_eq!(handle.join(), 0, "thread exits 0 regardless of the syscall's own return value");
}

#[test]
fn launch_spawns_the_named_executable_and_wait_blocks_until_it_exits() {
    let config = Config::default();
    let disk = Arc::new(machine::Disk::new_formatted(config.disk_sectors));
    let kernel = Kernel::boot(config, disk, true).unwrap();

    kernel.fs.create("prog.bin", 4).unwrap();
    kernel.fs.open("prog.bin").unwrap().write(b"\x00\x01\x02\x03").unwrap();

    let tid = kernel.dispatcher.launch("prog.bin").unwrap();
    kernel.dispatcher.wait(tid);
    assert!(!kernel::thread::is_alive(tid));
}
