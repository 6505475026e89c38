//! Advisory exclusive lock on an open device, released when dropped.
use gdmlink_protocol::TransportError;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use std::io;
        use std::os::unix::io::{AsRawFd, RawFd};

        /// Holds a duplicate of the device descriptor, so unlocking never touches a closed or
        /// reused descriptor.
        pub struct DeviceLock {
            fd: RawFd,
        }

        impl DeviceLock {
            pub fn acquire<T: AsRawFd>(device: &T, path: &str) -> crate::Result<Self> {
                let fd = unsafe { libc::dup(device.as_raw_fd()) };
                if fd < 0 {
                    return Err(crate::Error::transport(io::Error::last_os_error()));
                }
                let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
                if ret != 0 {
                    let err = io::Error::last_os_error();
                    unsafe {
                        libc::close(fd);
                    }
                    if err.kind() == io::ErrorKind::WouldBlock {
                        log::warn!("{} is locked by another process", path);
                        return Err(crate::Error::transport(TransportError::Busy(path.to_string())));
                    }
                    return Err(crate::Error::transport(err));
                }
                log::debug!("locked {}", path);
                Ok(DeviceLock { fd })
            }
        }

        impl Drop for DeviceLock {
            fn drop(&mut self) {
                unsafe {
                    libc::flock(self.fd, libc::LOCK_UN);
                    libc::close(self.fd);
                }
            }
        }
    } else {
        pub struct DeviceLock;

        impl DeviceLock {
            pub fn acquire<T>(_device: &T, _path: &str) -> crate::Result<Self> {
                Ok(DeviceLock)
            }
        }
    }
}
