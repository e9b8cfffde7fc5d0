//! Anonymous OS pipe feeding the streaming transport.

use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;

/// Create an anonymous pipe, returned as (read end, write end).
///
/// Both descriptors are close-on-exec.
pub(crate) fn anonymous_pipe() -> io::Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: both descriptors were just created and are owned by nobody else.
    let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };

    for fd in fds {
        // SAFETY: `fd` is a valid open descriptor owned by `reader` or `writer`.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok((reader, writer))
}
