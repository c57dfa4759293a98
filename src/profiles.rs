//! Named security presets.
//!
//! Spec options refer to presets by name only. The seccomp preset is
//! materialised here as an allowlist filter; AppArmor profiles are resolved
//! against the host in [`crate::apparmor`].

use crate::platform::Arch;
use crate::spec::{Seccomp, SyscallRule};

/// Seccomp presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeccompPreset {
    /// Allowlist of syscalls needed by ordinary workloads; everything else
    /// fails with `EPERM`.
    Default,
}

impl SeccompPreset {
    /// Stable preset name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
        }
    }
}

/// Syscalls allowed for every architecture. Mirrors the container
/// ecosystem's default profile minus the capability-gated entries.
const ALLOWED_SYSCALLS: &[&str] = &[
    "accept", "accept4", "access", "alarm", "bind", "brk", "capget", "capset", "chdir", "chmod",
    "chown", "clock_adjtime", "clock_getres", "clock_gettime", "clock_nanosleep", "clone",
    "close", "close_range", "connect", "copy_file_range", "creat", "dup", "dup2", "dup3",
    "epoll_create", "epoll_create1", "epoll_ctl", "epoll_pwait", "epoll_pwait2", "epoll_wait",
    "eventfd", "eventfd2", "execve", "execveat", "exit", "exit_group", "faccessat",
    "faccessat2", "fadvise64", "fallocate", "fanotify_mark", "fchdir", "fchmod", "fchmodat",
    "fchown", "fchownat", "fcntl", "fdatasync", "fgetxattr", "flistxattr", "flock", "fork",
    "fremovexattr", "fsetxattr", "fstat", "fstatfs", "fsync", "ftruncate", "futex",
    "futex_waitv", "futimesat", "get_robust_list", "getcpu", "getcwd", "getdents",
    "getdents64", "getegid", "geteuid", "getgid", "getgroups", "getitimer", "getpeername",
    "getpgid", "getpgrp", "getpid", "getppid", "getpriority", "getrandom", "getresgid",
    "getresuid", "getrlimit", "getrusage", "getsid", "getsockname", "getsockopt", "gettid",
    "gettimeofday", "getuid", "getxattr", "inotify_add_watch", "inotify_init",
    "inotify_init1", "inotify_rm_watch", "io_cancel", "io_destroy", "io_getevents",
    "io_pgetevents", "io_setup", "io_submit", "ioctl", "ioprio_get", "ioprio_set", "kill",
    "lchown", "lgetxattr", "link", "linkat", "listen", "listxattr", "llistxattr",
    "lremovexattr", "lseek", "lsetxattr", "lstat", "madvise", "membarrier", "memfd_create",
    "mincore", "mkdir", "mkdirat", "mknod", "mknodat", "mlock", "mlock2", "mlockall", "mmap",
    "mprotect", "mq_getsetattr", "mq_notify", "mq_open", "mq_timedreceive", "mq_timedsend",
    "mq_unlink", "mremap", "msgctl", "msgget", "msgrcv", "msgsnd", "msync", "munlock",
    "munlockall", "munmap", "nanosleep", "newfstatat", "open", "openat", "openat2", "pause",
    "pidfd_open", "pidfd_send_signal", "pipe", "pipe2", "pkey_alloc", "pkey_free",
    "pkey_mprotect", "poll", "ppoll", "prctl", "pread64", "preadv", "preadv2", "prlimit64",
    "pselect6", "pwrite64", "pwritev", "pwritev2", "read", "readahead", "readlink",
    "readlinkat", "readv", "recvfrom", "recvmmsg", "recvmsg", "remap_file_pages",
    "removexattr", "rename", "renameat", "renameat2", "restart_syscall", "rmdir", "rseq",
    "rt_sigaction", "rt_sigpending", "rt_sigprocmask", "rt_sigqueueinfo", "rt_sigreturn",
    "rt_sigsuspend", "rt_sigtimedwait", "rt_tgsigqueueinfo", "sched_get_priority_max",
    "sched_get_priority_min", "sched_getaffinity", "sched_getattr", "sched_getparam",
    "sched_getscheduler", "sched_rr_get_interval", "sched_setaffinity", "sched_setattr",
    "sched_setparam", "sched_setscheduler", "sched_yield", "select", "semctl", "semget",
    "semop", "semtimedop", "sendfile", "sendmmsg", "sendmsg", "sendto", "set_robust_list",
    "set_tid_address", "setfsgid", "setfsuid", "setgid", "setgroups", "setitimer", "setpgid",
    "setpriority", "setregid", "setresgid", "setresuid", "setreuid", "setrlimit", "setsid",
    "setsockopt", "setuid", "setxattr", "shmat", "shmctl", "shmdt", "shmget", "shutdown",
    "sigaltstack", "signalfd", "signalfd4", "socket", "socketpair", "splice", "stat",
    "statfs", "statx", "symlink", "symlinkat", "sync", "sync_file_range", "syncfs", "sysinfo",
    "tee", "tgkill", "time", "timer_create", "timer_delete", "timer_getoverrun",
    "timer_gettime", "timer_settime", "timerfd_create", "timerfd_gettime", "timerfd_settime",
    "times", "tkill", "truncate", "umask", "uname", "unlink", "unlinkat", "utime",
    "utimensat", "utimes", "vfork", "vmsplice", "wait4", "waitid", "write", "writev",
];

const X86_SYSCALLS: &[&str] = &["arch_prctl", "modify_ldt", "set_thread_area"];

const ARM_SYSCALLS: &[&str] = &["arm_fadvise64_64", "arm_sync_file_range", "breakpoint",
    "cacheflush", "set_tls", "sync_file_range2"];

/// `clone3` cannot be filtered on its flags, so it reports `ENOSYS` and libc
/// falls back to `clone`.
const ENOSYS_SYSCALLS: &[&str] = &["clone3"];

const ENOSYS: u32 = 38;

/// Builds the seccomp filter for a preset on the given architecture.
pub fn seccomp(preset: SeccompPreset, arch: Arch) -> Seccomp {
    match preset {
        SeccompPreset::Default => Seccomp {
            default_action: "SCMP_ACT_ERRNO".to_string(),
            architectures: seccomp_architectures(arch)
                .iter()
                .map(|a| a.to_string())
                .collect(),
            syscalls: vec![
                SyscallRule {
                    names: ALLOWED_SYSCALLS
                        .iter()
                        .chain(arch_syscalls(arch))
                        .map(|s| s.to_string())
                        .collect(),
                    action: "SCMP_ACT_ALLOW".to_string(),
                    errno_ret: None,
                },
                SyscallRule {
                    names: ENOSYS_SYSCALLS.iter().map(|s| s.to_string()).collect(),
                    action: "SCMP_ACT_ERRNO".to_string(),
                    errno_ret: Some(ENOSYS),
                },
            ],
        },
    }
}

fn arch_syscalls(arch: Arch) -> &'static [&'static str] {
    match arch {
        Arch::Amd64 => X86_SYSCALLS,
        Arch::Arm64 | Arch::Arm => ARM_SYSCALLS,
        Arch::Unknown => &[],
    }
}

fn seccomp_architectures(arch: Arch) -> &'static [&'static str] {
    match arch {
        Arch::Amd64 => &["SCMP_ARCH_X86_64", "SCMP_ARCH_X86", "SCMP_ARCH_X32"],
        Arch::Arm64 => &["SCMP_ARCH_AARCH64", "SCMP_ARCH_ARM"],
        Arch::Arm => &["SCMP_ARCH_ARM"],
        Arch::Unknown => &[],
    }
}
