//! An in-process static ELF64 loader.
//!
//! Instead of `execve()`, a forked child maps the target binary's `PT_LOAD`
//! segments itself, builds a System-V AMD64 initial stack, and jumps to the
//! entry point directly. Only statically linked, non-PIE ELF64 executables
//! are supported — anything carrying a `PT_INTERP` (i.e. needing the
//! dynamic linker) is rejected up front.
//!
//! Grounded on the original C's `loader.c`, function for function
//! (`elf_load`, `build_stack`, `jump_to_entry`); the `asm!` trampoline
//! pattern (a stable-Rust `options(noreturn)` block instead of a `#[naked]`
//! function) follows the kernel entry-point shown in the reference pack's
//! bare-metal x86_64 example.

use std::ffi::CString;
use std::fs;
use std::io;
use std::mem;

const EI_NIDENT: usize = 16;
const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;
const PT_INTERP: u32 = 3;
const PAGE_SIZE: usize = 4096;
const STACK_SIZE: usize = 8 * 1024 * 1024;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Ehdr {
    e_ident: [u8; EI_NIDENT],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

/// Why a binary couldn't be loaded. The executor maps all of these to exit
/// status 127, matching the "command not found"-style failure path.
#[derive(Debug)]
pub enum LoadError {
    Io(io::Error),
    NotElf,
    Not64Bit,
    NotExecutable,
    NeedsInterpreter,
    UnsupportedMachine,
    BadProgramHeaderSize,
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "{e}"),
            LoadError::NotElf => write!(f, "not an ELF file"),
            LoadError::Not64Bit => write!(f, "not a 64-bit ELF file"),
            LoadError::NotExecutable => write!(f, "not a statically linked executable"),
            LoadError::NeedsInterpreter => {
                write!(f, "dynamic executables not supported, use -static")
            }
            LoadError::UnsupportedMachine => write!(f, "unsupported machine architecture"),
            LoadError::BadProgramHeaderSize => write!(f, "unexpected program header size"),
        }
    }
}

fn read_ehdr(bytes: &[u8]) -> Result<Elf64Ehdr, LoadError> {
    if bytes.len() < mem::size_of::<Elf64Ehdr>() {
        return Err(LoadError::NotElf);
    }
    if &bytes[0..4] != b"\x7fELF" {
        return Err(LoadError::NotElf);
    }
    if bytes[4] != 2 {
        return Err(LoadError::Not64Bit);
    }
    // SAFETY: size checked above, and Elf64Ehdr has no padding-sensitive
    // invariants — we only read it back, never mutate through this pointer.
    let ehdr = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Elf64Ehdr) };
    if ehdr.e_type != ET_EXEC {
        return Err(LoadError::NotExecutable);
    }
    const EM_X86_64: u16 = 62;
    if ehdr.e_machine != EM_X86_64 {
        return Err(LoadError::UnsupportedMachine);
    }
    if ehdr.e_phentsize as usize != mem::size_of::<Elf64Phdr>() {
        return Err(LoadError::BadProgramHeaderSize);
    }
    Ok(ehdr)
}

fn read_phdrs(bytes: &[u8], ehdr: &Elf64Ehdr) -> Vec<Elf64Phdr> {
    let mut out = Vec::with_capacity(ehdr.e_phnum as usize);
    let base = ehdr.e_phoff as usize;
    for i in 0..ehdr.e_phnum as usize {
        let off = base + i * ehdr.e_phentsize as usize;
        if off + mem::size_of::<Elf64Phdr>() > bytes.len() {
            break;
        }
        let phdr = unsafe { std::ptr::read_unaligned(bytes[off..].as_ptr() as *const Elf64Phdr) };
        out.push(phdr);
    }
    out
}

fn page_align_down(x: u64) -> u64 {
    x & !((PAGE_SIZE as u64) - 1)
}

fn page_align_up(x: u64) -> u64 {
    page_align_down(x + PAGE_SIZE as u64 - 1)
}

/// Map every `PT_LOAD` segment of `phdrs` from `file` into this process's
/// address space at its `p_vaddr`, zeroing the BSS tail (`p_memsz - p_filesz`).
unsafe fn map_segments(file: &fs::File, phdrs: &[Elf64Phdr]) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();

    for phdr in phdrs {
        if phdr.p_type != PT_LOAD {
            continue;
        }

        let vaddr_start = page_align_down(phdr.p_vaddr);
        let vaddr_end = page_align_up(phdr.p_vaddr + phdr.p_memsz);
        let map_len = (vaddr_end - vaddr_start) as usize;
        let page_offset = (phdr.p_vaddr - vaddr_start) as usize;

        let mut prot = 0;
        if phdr.p_flags & 0x4 != 0 {
            prot |= libc::PROT_READ;
        }
        if phdr.p_flags & 0x2 != 0 {
            prot |= libc::PROT_WRITE;
        }
        if phdr.p_flags & 0x1 != 0 {
            prot |= libc::PROT_EXEC;
        }
        // Segments are mapped writable first so we can zero the BSS tail,
        // matching the original's two-step map-then-zero-then-(optionally)-reprotect.
        let map_prot = prot | libc::PROT_WRITE;

        let addr = unsafe {
            libc::mmap(
                vaddr_start as *mut libc::c_void,
                map_len,
                map_prot,
                libc::MAP_PRIVATE | libc::MAP_FIXED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        if phdr.p_filesz > 0 {
            let n = unsafe {
                libc::pread(
                    fd,
                    (addr as usize + page_offset) as *mut libc::c_void,
                    phdr.p_filesz as usize,
                    phdr.p_offset as i64,
                )
            };
            if n < 0 || n as u64 != phdr.p_filesz {
                return Err(io::Error::last_os_error());
            }
        }

        if phdr.p_memsz > phdr.p_filesz {
            let bss_start = addr as usize + page_offset + phdr.p_filesz as usize;
            let bss_len = (phdr.p_memsz - phdr.p_filesz) as usize;
            unsafe {
                std::ptr::write_bytes(bss_start as *mut u8, 0, bss_len);
            }
        }

        if map_prot != prot {
            let rc = unsafe { libc::mprotect(addr, map_len, prot) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    Ok(())
}

/// Map an anonymous, read-write stack region of [`STACK_SIZE`] bytes.
/// Returns the address of the top of the region (stack grows down from here).
unsafe fn map_stack() -> io::Result<usize> {
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            STACK_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
            -1,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(addr as usize + STACK_SIZE)
}

/// Build the System-V AMD64 initial stack layout at `top`:
/// strings, 16-byte alignment pad, auxv terminator, envp (reversed, null
/// terminated), argv (null terminated), then argc at the very bottom.
/// Returns the final stack pointer to enter the program with.
unsafe fn build_stack(top: usize, argv: &[CString], envp: &[CString]) -> usize {
    let mut sp = top;

    let mut arg_ptrs = Vec::with_capacity(argv.len());
    for a in argv.iter().rev() {
        let bytes = a.as_bytes_with_nul();
        sp -= bytes.len();
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), sp as *mut u8, bytes.len());
        }
        arg_ptrs.push(sp as u64);
    }
    arg_ptrs.reverse();

    let mut env_ptrs = Vec::with_capacity(envp.len());
    for e in envp.iter().rev() {
        let bytes = e.as_bytes_with_nul();
        sp -= bytes.len();
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), sp as *mut u8, bytes.len());
        }
        env_ptrs.push(sp as u64);
    }
    env_ptrs.reverse();

    sp &= !0xf;

    // auxv: a single AT_NULL terminator is sufficient for a static, non-PIE binary.
    let auxv: [u64; 2] = [0, 0];
    sp -= mem::size_of_val(&auxv);
    sp &= !0xf;
    unsafe {
        std::ptr::copy_nonoverlapping(auxv.as_ptr(), sp as *mut u64, auxv.len());
    }

    sp -= 8; // envp null terminator
    unsafe {
        *(sp as *mut u64) = 0;
    }
    for &ptr in env_ptrs.iter().rev() {
        sp -= 8;
        unsafe {
            *(sp as *mut u64) = ptr;
        }
    }

    sp -= 8; // argv null terminator
    unsafe {
        *(sp as *mut u64) = 0;
    }
    for &ptr in arg_ptrs.iter().rev() {
        sp -= 8;
        unsafe {
            *(sp as *mut u64) = ptr;
        }
    }

    sp -= 8; // argc
    unsafe {
        *(sp as *mut u64) = arg_ptrs.len() as u64;
    }

    sp
}

/// Load `path` as a static ELF64 executable into this process's own address
/// space and transfer control to its entry point. Never returns on success;
/// the calling process image is entirely replaced, just as it would be after
/// `execve()`. Only returns `Err` if loading failed before the jump.
///
/// # Safety
/// Must only be called in a freshly forked child that is about to become
/// the target program — it overwrites this process's memory mappings
/// wholesale via `MAP_FIXED`.
pub unsafe fn exec_in_place(path: &str, argv: &[CString], envp: &[CString]) -> Result<(), LoadError> {
    let file = fs::File::open(path)?;
    let bytes = fs::read(path)?;

    let ehdr = read_ehdr(&bytes)?;
    let phdrs = read_phdrs(&bytes, &ehdr);

    if phdrs.iter().any(|p| p.p_type == PT_INTERP) {
        return Err(LoadError::NeedsInterpreter);
    }

    unsafe { map_segments(&file, &phdrs)? };
    let stack_top = unsafe { map_stack()? };
    let sp = unsafe { build_stack(stack_top, argv, envp) };

    let entry = ehdr.e_entry as usize;
    unsafe {
        jump_to_entry(entry, sp);
    }
}

/// Transfer control to `entry` with `%rsp` set to `sp`, per the System-V
/// AMD64 process-entry ABI (argc/argv/envp are read off the stack by the
/// target's own startup code, not passed in registers).
unsafe fn jump_to_entry(entry: usize, sp: usize) -> ! {
    unsafe {
        std::arch::asm!(
            "mov rsp, {sp}",
            "xor rbp, rbp",
            "jmp {entry}",
            sp = in(reg) sp,
            entry = in(reg) entry,
            options(noreturn),
        )
    }
}
