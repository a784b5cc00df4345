//! The exception dispatcher: the single entry point a user-mode trap
//! transfers control to, grounded on the original's `ExceptionHandler` in
//! `exception.cc`. Syscalls decode the code in r2, read arguments from
//! r4-r7, and write a return value back into r2; the dispatcher advances
//! the program counter afterward so the user program doesn't re-trap into
//! the same instruction. A page fault (not handled here; see
//! [`crate::mm::MemoryManager::handle_fault`]) must *not* advance the PC.
//!
//! `exec`/`fork` stop at the kernel-side bookkeeping the original's
//! `Exec1`/`Fork1` do before jumping into user mode — building the address
//! space, the initial register file, the new thread — since actually
//! running user-mode instructions needs a fetch-decode-execute loop, which
//! [`machine::cpu`] deliberately does not provide (see its module
//! documentation). The spawned thread exits immediately rather than
//! silently pretending to execute a program.
pub mod uaccess;

use crate::console::SynchConsole;
use crate::error::{KernelError, NachosError, Result};
use crate::fs::FileSystem;
use crate::mm::{AddressSpace, MemoryManager};
use crate::thread::{Current, Thread, ThreadBuilder};
use machine::cpu::{REG_ARGS, REG_RETURN, REG_SYSCALL_CODE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uaccess::UserAccess;

pub const SYS_HALT: u64 = 0;
pub const SYS_EXIT: u64 = 1;
pub const SYS_EXEC: u64 = 2;
pub const SYS_FORK: u64 = 3;
pub const SYS_JOIN: u64 = 4;
pub const SYS_CREATE: u64 = 5;
pub const SYS_OPEN: u64 = 6;
pub const SYS_CLOSE: u64 = 7;
pub const SYS_READ: u64 = 8;
pub const SYS_WRITE: u64 = 9;
pub const SYS_YIELD: u64 = 10;

/// Longest path or program-name string a syscall will read out of user
/// memory before giving up.
const MAX_PATH_LEN: usize = 256;

const FD_STDIN: i32 = 0;
const FD_STDOUT: i32 = 1;

/// The collaborators a syscall trap needs: the VM subsystem (to translate
/// user pointers), the mounted filesystem, and the console. Grounded on
/// `keos::syscall::do_handle_syscall`'s shape, generalized from a single
/// `Task` to this kernel's separate `mm`/`fs`/`console` services.
pub struct Dispatcher {
    pub mm: Arc<MemoryManager>,
    pub fs: Arc<FileSystem>,
    pub console: Arc<SynchConsole>,
    max_threads: usize,
    halted: AtomicBool,
}

impl Dispatcher {
    pub fn new(mm: Arc<MemoryManager>, fs: Arc<FileSystem>, console: Arc<SynchConsole>, max_threads: usize) -> Self {
        Self { mm, fs, console, max_threads, halted: AtomicBool::new(false) }
    }

    /// Whether `halt` has been called. The host run loop polls this to
    /// know when to stop pumping the event queue.
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Service one syscall trap for `thread`, whose register file already
    /// holds the code and arguments the user program placed there.
    pub fn handle(&self, thread: &Arc<Thread>) {
        let mut regs = thread.registers();
        let code = regs.gpr[REG_SYSCALL_CODE];
        let args = REG_ARGS.map(|r| regs.gpr[r]);
        let outcome = self.dispatch(thread, code, args);
        regs.gpr[REG_RETURN] = match outcome {
            Ok(v) => v as u64,
            Err(NachosError::Kernel(e)) => e.into_usize() as u64,
            Err(e) => panic!("unexpected host-level error surfaced through the syscall ABI: {e} (fatal kernel invariant violated)"),
        };
        regs.advance_pc();
        thread.set_registers(regs);
        Current::check_preemption();
    }

    fn current_space(&self, thread: &Arc<Thread>) -> Result<Arc<AddressSpace>> {
        thread.address_space().ok_or(NachosError::Kernel(KernelError::BadAddress))
    }

    fn dispatch(&self, thread: &Arc<Thread>, code: u64, args: [u64; 4]) -> Result<isize> {
        match code {
            SYS_HALT => {
                self.halted.store(true, Ordering::SeqCst);
                Ok(0)
            }
            SYS_EXIT => {
                let exit_code = args[0] as i32;
                if let Some(space) = thread.address_space() {
                    self.mm.release_address_space(&space);
                }
                Current::exit(exit_code);
            }
            SYS_EXEC => self.exec(thread, args[0] as usize),
            SYS_FORK => self.fork(thread, args[0] as usize),
            SYS_JOIN => {
                self.join(args[0]);
                Ok(0)
            }
            SYS_CREATE => {
                let path = self.read_path(thread, args[0] as usize)?;
                self.fs.create(&path, 0)?;
                Ok(0)
            }
            SYS_OPEN => {
                let path = self.read_path(thread, args[0] as usize)?;
                let file = self.fs.open(&path)?;
                Ok(thread.install_fd(Arc::new(file)) as isize)
            }
            SYS_CLOSE => {
                let fd = args[0] as i32;
                if fd == FD_STDIN || fd == FD_STDOUT {
                    return Ok(0);
                }
                thread.take_fd(fd).ok_or(NachosError::Kernel(KernelError::BadFileDescriptor))?;
                Ok(0)
            }
            SYS_READ => self.read(thread, args[0] as usize, args[1] as usize, args[2] as i32),
            SYS_WRITE => self.write(thread, args[0] as usize, args[1] as usize, args[2] as i32),
            SYS_YIELD => {
                Current::yield_now();
                Ok(0)
            }
            _ => panic!("unknown syscall code {code} (fatal kernel invariant violated)"),
        }
    }

    fn read_path(&self, thread: &Arc<Thread>, addr: usize) -> Result<String> {
        let space = self.current_space(thread)?;
        let tick = self.mm.next_tick();
        UserAccess::new(&space, &self.mm, tick).read_cstring(addr, MAX_PATH_LEN)
    }

    fn read(&self, thread: &Arc<Thread>, buf_addr: usize, size: usize, fd: i32) -> Result<isize> {
        if fd == FD_STDOUT {
            return Err(NachosError::Kernel(KernelError::BadFileDescriptor));
        }
        let space = self.current_space(thread)?;
        if fd == FD_STDIN {
            let mut n = 0usize;
            let tick0 = self.mm.next_tick();
            let access = UserAccess::new(&space, &self.mm, tick0);
            for i in 0..size {
                match self.console.read_byte() {
                    Some(byte) => {
                        access.write(buf_addr + i, &[byte])?;
                        n += 1;
                    }
                    None => break,
                }
            }
            return Ok(n as isize);
        }
        let file = thread.fd(fd).ok_or(NachosError::Kernel(KernelError::BadFileDescriptor))?;
        let mut staging = vec![0u8; size];
        let n = file.read(&mut staging);
        let tick = self.mm.next_tick();
        UserAccess::new(&space, &self.mm, tick).write(buf_addr, &staging[..n])?;
        Ok(n as isize)
    }

    fn write(&self, thread: &Arc<Thread>, buf_addr: usize, size: usize, fd: i32) -> Result<isize> {
        if fd == FD_STDIN {
            return Err(NachosError::Kernel(KernelError::BadFileDescriptor));
        }
        let space = self.current_space(thread)?;
        let tick = self.mm.next_tick();
        let mut staging = vec![0u8; size];
        UserAccess::new(&space, &self.mm, tick).read(buf_addr, &mut staging)?;
        if fd == FD_STDOUT {
            for &byte in &staging {
                self.console.write_byte(byte);
            }
            return Ok(staging.len() as isize);
        }
        let file = thread.fd(fd).ok_or(NachosError::Kernel(KernelError::BadFileDescriptor))?;
        Ok(file.write(&staging)? as isize)
    }

    /// Load `path` as a fresh process: read its bytes as the executable
    /// image, build an address space from them, and spawn the thread that
    /// will own it. Returns the new thread's tid.
    fn exec(&self, thread: &Arc<Thread>, path_addr: usize) -> Result<isize> {
        let path = self.read_path(thread, path_addr)?;
        Ok(self.load_and_spawn(&path)? as isize)
    }

    /// The kernel-side half of `exec`, shared with [`Self::launch`]: open
    /// `path` on the mounted filesystem, build an address space from its
    /// bytes and spawn the thread that owns it.
    fn load_and_spawn(&self, path: &str) -> Result<u64> {
        let file = self.fs.open(path)?;
        let mut image = vec![0u8; file.length()];
        file.read_at(0, &mut image);
        let space = Arc::new(AddressSpace::new(image.len().div_ceil(machine::PAGE_SIZE), Arc::new(image)));
        Ok(self.spawn_user_thread(&format!("exec:{path}"), space, 0))
    }

    /// Load and spawn the initial user program named on the command line
    /// (the `-x file` flag), the host-side equivalent of the original
    /// `main`'s call into `Exec` before the scheduler takes over. Unlike
    /// the `exec` syscall, there is no calling user thread to read the
    /// path out of — the host passes it in directly. Returns the new
    /// thread's tid so the caller can join it.
    pub fn launch(&self, path: &str) -> Result<u64> {
        self.load_and_spawn(path)
    }

    /// Fork a sibling process sharing this process's executable image but
    /// with its own demand-paged address space, entering at `fn_addr`.
    fn fork(&self, thread: &Arc<Thread>, fn_addr: usize) -> Result<isize> {
        let parent = self.current_space(thread)?;
        let child = Arc::new(parent.clone_layout());
        Ok(self.spawn_user_thread("fork", child, fn_addr as u64) as isize)
    }

    fn spawn_user_thread(&self, name: &str, space: Arc<AddressSpace>, entry: u64) -> u64 {
        let scheduler = Current::with(|t| t.scheduler.clone());
        let handle = ThreadBuilder::new(name).spawn(&scheduler, self.max_threads, move || {
            Current::with(|t| {
                t.set_address_space(space.clone());
                t.set_registers(machine::RegisterFile::new(entry));
            });
            // Entering user mode is outside this core's scope (see the
            // module doc); a hosted CPU interpreter would resume here.
        });
        handle.tid()
    }

    /// Spin-yield while `tid` is still a live kernel thread, the baseline
    /// behavior the spec calls for (a per-tid condition variable is a
    /// noted but unimplemented refinement; ordinary `JoinHandle::join`
    /// already blocks via condvar for kernel-internal joins).
    fn join(&self, tid: u64) {
        while crate::thread::is_alive(tid) {
            Current::yield_now();
        }
    }

    /// Public entry point for the host binary to wait for a thread
    /// started with [`Self::launch`] to finish, the same wait the `Join`
    /// syscall performs for a user program waiting on its own child.
    pub fn wait(&self, tid: u64) {
        self.join(tid)
    }
}
