//! Serial port
//!
//! Opens the device non-blocking and puts it in raw 8N1 mode with
//! `VMIN = 0`, so reads and writes return straight away.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use super::config::SerialConfig;
use super::{Endpoint, TransportKind};
use crate::error::{Error, Result};

/// Default line speed
pub const DEFAULT_BAUD: u32 = 57600;

/// Open serial device
#[derive(Debug)]
pub struct SerialEndpoint {
    file: File,
    device: String,
}

impl SerialEndpoint {
    /// Open and configure the device named in `config`
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let device = config.device.display().to_string();
        let serial_err = |source: io::Error| Error::Serial {
            device: device.clone(),
            source,
        };

        let file = open_device(&config.device).map_err(serial_err)?;
        configure(file.as_raw_fd(), config.baud).map_err(serial_err)?;

        tracing::info!(device = %device, baud = config.baud, "Serial port opened");
        Ok(Self { file, device })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Endpoint for SerialEndpoint {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.file.write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn open_device(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
}

fn baud_constant(baud: u32) -> io::Result<libc::speed_t> {
    let speed = match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921600 => libc::B921600,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {}", other),
            ))
        }
    };
    Ok(speed)
}

/// Raw mode, 8N1, no flow control, reads return immediately
fn configure(fd: RawFd, baud: u32) -> io::Result<()> {
    let speed = baud_constant(baud)?;

    // SAFETY: fd is an open descriptor owned by the caller and termios is
    // plain data filled in by tcgetattr.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            return Err(io::Error::last_os_error());
        }

        libc::cfmakeraw(&mut termios);
        libc::cfsetispeed(&mut termios, speed);
        libc::cfsetospeed(&mut termios, speed);

        termios.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE | libc::CRTSCTS);
        termios.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
        termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);

        termios.c_cc[libc::VTIME] = 0;
        termios.c_cc[libc::VMIN] = 0;

        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::FromRawFd;
    use std::time::Duration;

    #[test]
    fn test_baud_table() {
        assert_eq!(baud_constant(57600).unwrap(), libc::B57600);
        assert_eq!(baud_constant(115200).unwrap(), libc::B115200);
        assert!(baud_constant(12345).is_err());
    }

    #[tokio::test]
    async fn test_missing_device() {
        let config = SerialConfig::with_device("/dev/does-not-exist-mavlink");
        match SerialEndpoint::open(&config) {
            Err(Error::Serial { device, source }) => {
                assert_eq!(device, "/dev/does-not-exist-mavlink");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    /// Pseudo-terminal pair: master file plus slave device path
    #[cfg(target_os = "linux")]
    fn create_pty() -> (File, String) {
        unsafe {
            let mut master: libc::c_int = 0;
            let mut slave: libc::c_int = 0;
            assert_eq!(
                libc::openpty(
                    &mut master,
                    &mut slave,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                ),
                0
            );

            let mut buf: [libc::c_char; 256] = [0; 256];
            assert_eq!(libc::ttyname_r(slave, buf.as_mut_ptr(), buf.len()), 0);
            let name = std::ffi::CStr::from_ptr(buf.as_ptr())
                .to_string_lossy()
                .into_owned();
            libc::close(slave);

            (File::from_raw_fd(master), name)
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_pty_roundtrip() {
        let (mut master, slave) = create_pty();
        let mut endpoint = SerialEndpoint::open(&SerialConfig::with_device(&slave)).unwrap();
        assert_eq!(endpoint.kind(), TransportKind::Serial);

        let mut buf = [0u8; 16];
        assert_eq!(endpoint.try_read(&mut buf).unwrap(), 0);

        master.write_all(b"\xfe\x09").unwrap();
        let mut got = 0;
        for _ in 0..100 {
            got = endpoint.try_read(&mut buf).unwrap();
            if got > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(&buf[..got], b"\xfe\x09");

        assert_eq!(endpoint.try_write(b"ack").unwrap(), 3);
        let mut out = [0u8; 3];
        master.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"ack");
    }
}
