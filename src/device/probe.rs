//! Touch probe client
//!
//! Single-byte protocol: `r` retracts the pin, `e` extends it and `t` asks
//! whether it touched since the last query (`1` yes, anything else no).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::ProbeSettings;
use crate::device::{Connection, TouchProbe, ZBounds};
use crate::error::DeviceError;

const RETRACT: u8 = b'r';
const EXTEND: u8 = b'e';
const TOUCH_QUERY: u8 = b't';
const TOUCHED: u8 = b'1';

pub struct ProbeClient<C = TcpStream> {
    conn: C,
    read_timeout: Duration,
    attempts: u32,
    bounds: ZBounds,
}

impl ProbeClient<TcpStream> {
    /// Connect and retract the probe
    pub fn connect(settings: &ProbeSettings) -> Result<Self, DeviceError> {
        log::info!("connecting to probe at {}", settings.address);
        let stream =
            TcpStream::connect(&settings.address).map_err(|source| DeviceError::Connect {
                address: settings.address.clone(),
                source,
            })?;
        let mut client = Self::new(stream, settings);
        client.retract()?;
        Ok(client)
    }
}

impl<C: Connection> ProbeClient<C> {
    pub fn new(conn: C, settings: &ProbeSettings) -> Self {
        Self {
            conn,
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
            attempts: settings.touch_retries.max(1),
            bounds: ZBounds::new(settings.floor_z, settings.max_z),
        }
    }

    fn send(&mut self, code: u8) -> Result<(), DeviceError> {
        self.conn.write_all(&[code])?;
        self.conn.flush()?;
        Ok(())
    }

    fn query_once(&mut self) -> Result<bool, DeviceError> {
        self.send(TOUCH_QUERY)?;
        self.conn.set_read_deadline(self.read_timeout)?;
        let mut reply = [0u8; 1];
        self.conn
            .read_exact(&mut reply)
            .map_err(|err| DeviceError::from_read(err, self.read_timeout.as_millis() as u64))?;
        Ok(reply[0] == TOUCHED)
    }
}

impl<C: Connection> TouchProbe for ProbeClient<C> {
    fn retract(&mut self) -> Result<(), DeviceError> {
        self.send(RETRACT)
    }

    fn extend(&mut self) -> Result<(), DeviceError> {
        self.send(EXTEND)
    }

    /// Any transport failure is retried; a clean answer is final
    fn has_touched(&mut self) -> Result<bool, DeviceError> {
        let mut errors = Vec::new();
        for attempt in 1..=self.attempts {
            match self.query_once() {
                Ok(touched) => return Ok(touched),
                Err(err) => {
                    log::warn!("probe query attempt {} failed: {}", attempt, err);
                    errors.push(err.to_string());
                }
            }
        }
        Err(DeviceError::TouchQueryFailed {
            attempts: self.attempts,
            errors,
        })
    }

    fn z_bounds(&self) -> ZBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Scripted connection: each read pops the next reply
    #[derive(Default)]
    struct Scripted {
        sent: Vec<u8>,
        replies: VecDeque<io::Result<u8>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(Ok(byte)) => {
                    buf[0] = byte;
                    Ok(1)
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for Scripted {
        fn set_read_deadline(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    fn client(replies: Vec<io::Result<u8>>) -> ProbeClient<Scripted> {
        let conn = Scripted {
            sent: Vec::new(),
            replies: replies.into(),
        };
        ProbeClient::new(conn, &ProbeSettings::default())
    }

    #[test]
    fn test_command_bytes() {
        let mut probe = client(vec![Ok(b'0')]);
        probe.retract().unwrap();
        probe.extend().unwrap();
        assert!(!probe.has_touched().unwrap());
        assert_eq!(probe.conn.sent, b"ret");
    }

    #[test]
    fn test_retries_after_transport_failure() {
        let mut probe = client(vec![
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::ErrorKind::ConnectionReset.into()),
            Ok(b'1'),
        ]);
        assert!(probe.has_touched().unwrap());
        assert_eq!(probe.conn.sent, b"ttt");
    }

    #[test]
    fn test_gives_up_after_three_attempts() {
        let mut probe = client(vec![
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::ErrorKind::WouldBlock.into()),
            Ok(b'1'),
        ]);
        let err = probe.has_touched().unwrap_err();
        assert!(matches!(
            err,
            DeviceError::TouchQueryFailed { attempts: 3, ref errors } if errors.len() == 3
        ));
        assert_eq!(probe.conn.sent, b"ttt");
    }

    #[test]
    fn test_closed_connection_is_retried() {
        let mut probe = client(vec![]);
        assert!(probe.has_touched().is_err());
        assert_eq!(probe.conn.sent.len(), 3);
    }

    #[test]
    fn test_bounds_from_settings() {
        let probe = client(vec![]);
        assert_eq!(probe.z_bounds(), ZBounds::new(50.0, 100.0));
    }
}
