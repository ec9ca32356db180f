//! Motion controller client
//!
//! Commands go out as `~<gcode>\r\n`; the controller answers every command
//! with an acknowledgement frame that must arrive before the deadline. The
//! head position is tracked on this side from the commands sent, and no Z
//! outside the configured range ever leaves this client.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::PrinterSettings;
use crate::device::{travel_time, Connection, MotionDevice, ZBounds};
use crate::error::DeviceError;

const ACK_BUFFER_LEN: usize = 1024;

pub struct MotionClient<C = TcpStream> {
    conn: C,
    ack_timeout: Duration,
    movement_time_multiplier: f64,
    z_bounds: ZBounds,
    park_z: f64,
    park_feed: f64,
    settle: Duration,
    last_x: f64,
    last_y: f64,
    last_z: f64,
}

impl MotionClient<TcpStream> {
    /// Connect, switch to absolute positioning and park the head
    pub fn connect(settings: &PrinterSettings) -> Result<Self, DeviceError> {
        log::info!("connecting to printer at {}", settings.address);
        let stream =
            TcpStream::connect(&settings.address).map_err(|source| DeviceError::Connect {
                address: settings.address.clone(),
                source,
            })?;
        let mut client = Self::new(stream, settings);
        client.start()?;
        Ok(client)
    }
}

impl<C: Connection> MotionClient<C> {
    pub fn new(conn: C, settings: &PrinterSettings) -> Self {
        Self {
            conn,
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
            movement_time_multiplier: settings.movement_time_multiplier,
            z_bounds: ZBounds::new(settings.min_z, settings.max_z),
            park_z: settings.park_z,
            park_feed: settings.park_feed,
            settle: Duration::from_millis(settings.settle_ms),
            last_x: 0.0,
            last_y: 0.0,
            last_z: settings.park_z,
        }
    }

    /// Start-up sequence: absolute positioning, then park at X0 Y0 and the park height
    pub fn start(&mut self) -> Result<(), DeviceError> {
        let park_z = self.z_bounds.check(self.park_z)?;
        self.exec_gcode("G90")?;
        self.exec_gcode(&format!(
            "G1 E0 F{:.0} X0 Y0 Z{:.3}",
            self.park_feed, park_z
        ))?;
        self.last_x = 0.0;
        self.last_y = 0.0;
        self.last_z = park_z;
        std::thread::sleep(self.settle);
        Ok(())
    }

    pub fn z_bounds(&self) -> ZBounds {
        self.z_bounds
    }

    /// Last commanded head position
    pub fn position(&self) -> (f64, f64, f64) {
        (self.last_x, self.last_y, self.last_z)
    }

    /// Send one command and wait for its acknowledgement
    pub fn exec_gcode(&mut self, gcode: &str) -> Result<(), DeviceError> {
        log::debug!("printer <- {}", gcode);
        self.conn.write_all(format!("~{}\r\n", gcode).as_bytes())?;
        self.conn.flush()?;
        self.conn.set_read_deadline(self.ack_timeout)?;

        let timeout_ms = self.ack_timeout.as_millis() as u64;
        let mut buffer = [0u8; ACK_BUFFER_LEN];
        match self.conn.read(&mut buffer) {
            Ok(0) => Err(DeviceError::ConnectionClosed),
            Ok(n) => {
                log::trace!("printer -> {:?}", String::from_utf8_lossy(&buffer[..n]));
                Ok(())
            }
            Err(err) => Err(DeviceError::from_read(err, timeout_ms)),
        }
    }
}

impl<C: Connection> MotionDevice for MotionClient<C> {
    fn move_xy(&mut self, x: f64, y: f64, speed: f64) -> Result<Duration, DeviceError> {
        self.exec_gcode(&format!("G1 E0 F{:.0} X{:.3} Y{:.3}", speed * 60.0, x, y))?;
        let distance = (self.last_x - x).hypot(self.last_y - y);
        self.last_x = x;
        self.last_y = y;
        Ok(travel_time(distance, speed, self.movement_time_multiplier))
    }

    fn move_z(&mut self, z: f64, speed: f64) -> Result<Duration, DeviceError> {
        let z = self.z_bounds.check(z)?;
        self.exec_gcode(&format!("G1 E0 F{:.0} Z{:.3}", speed * 60.0, z))?;
        let distance = (self.last_z - z).abs();
        self.last_z = z;
        Ok(travel_time(distance, speed, self.movement_time_multiplier))
    }
}
