//! Stop-and-wait tile delivery over a single device connection.
//!
//! [`TileTransport`] owns the socket and the reconstruction of what the
//! device currently shows. Each diff cycle sends tiles one at a time; a tile
//! must be acknowledged before the next is written.
//!
//! Per tile the transport moves through
//! `Sending -> AwaitingAck -> {Acked | Rejected}`. A rejection (NACK, bad
//! reply, timeout) resends the same frame until `max_attempts` is used up,
//! then the whole cycle fails. Socket errors close the connection at once.
//!
//! A timed-out or garbled reply may be followed by late bytes. Before the
//! next frame is written the transport drains whatever is already waiting,
//! so a late ACK is never credited to a later attempt.
//!
//! The resident image is only replaced after every tile of a cycle is
//! acknowledged, so a failed cycle leaves the previous state untouched.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Config;
use crate::diff::{compute_bounding_box, encode_region, slice_into_tiles, BoundingBox, Tile};
use crate::error::{Error, Rejection};
use crate::frame::{
    pack_frame, tile_crc, tile_payload, unpack_frame_header, FrameType, TileHeader,
    FRAME_HEADER_SIZE, TILE_HEADER_SIZE,
};
use crate::pixel;
use crate::raster::RasterImage;

/// How long to listen for late reply bytes before the next write.
const STALE_REPLY_WINDOW: Duration = Duration::from_millis(50);

/// Upper bound on bytes discarded in one drain.
const MAX_STALE_BYTES: usize = 64 * 1024;

/// A bidirectional byte stream to the display.
pub trait DeviceLink: Read + Write {
    /// Bound every subsequent blocking read by `timeout`.
    fn set_ack_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Release the underlying socket. Errors are ignored.
    fn shutdown(&mut self) {}
}

impl DeviceLink for TcpStream {
    fn set_ack_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }

    fn shutdown(&mut self) {
        let _ = TcpStream::shutdown(self, Shutdown::Both);
    }
}

/// Opens new [`DeviceLink`]s.
pub trait Connector {
    type Link: DeviceLink;

    fn connect(&self) -> io::Result<Self::Link>;
}

/// Connects to the display over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    timeout: Duration,
}

impl TcpConnector {
    /// Create a connector for `address` (`host:port`).
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.address(), config.connect_timeout())
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Connector for TcpConnector {
    type Link = TcpStream;

    fn connect(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} did not resolve to any address", self.address),
            )
        }))
    }
}

/// Protocol limits used by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Frame payload ceiling, tile header included
    pub max_frame_payload: usize,
    /// How long to wait for each ACK/NACK
    pub ack_timeout: Duration,
    /// Attempts per tile before the cycle is aborted
    pub max_attempts: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_frame_payload: crate::TILE_PAYLOAD_SIZE,
            ack_timeout: Duration::from_secs(crate::DEFAULT_ACK_TIMEOUT_SECS),
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl TransportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_frame_payload: config.tile_payload_size,
            ack_timeout: config.ack_timeout(),
            max_attempts: config.max_attempts,
        }
    }

    /// Pixel bytes that fit in one tile after the tile header.
    pub fn max_pixel_bytes(&self) -> usize {
        self.max_frame_payload.saturating_sub(TILE_HEADER_SIZE)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Outcome of one successful diff cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    /// Nothing changed; no bytes were sent
    Unchanged,
    /// Every tile of `bbox` was acknowledged
    Updated {
        bbox: BoundingBox,
        /// Tiles delivered
        tiles: usize,
        /// Extra attempts spent across all tiles
        retries: u32,
    },
}

/// Per-tile send state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TileState {
    Sending { attempt: u32 },
    AwaitingAck { attempt: u32 },
    Acked { attempts: u32 },
    Exhausted { attempts: u32, last: Rejection },
}

/// Parsed reply to a tile frame.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Ack,
    Rejected(Rejection),
}

/// Owns the device connection and the device-resident image.
///
/// Not thread-safe by design of the protocol: exactly one owner drives it.
pub struct TileTransport<C: Connector> {
    connector: C,
    settings: TransportSettings,
    link: Option<C::Link>,
    resident: Option<RasterImage>,
    /// A reply was lost or garbled; drain before the next write
    needs_resync: bool,
}

impl<C: Connector> TileTransport<C> {
    pub fn new(connector: C, settings: TransportSettings) -> Self {
        Self {
            connector,
            settings,
            link: None,
            resident: None,
            needs_resync: false,
        }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn state(&self) -> LinkState {
        if self.link.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// What the device is believed to show, or `None` if unknown.
    pub fn resident(&self) -> Option<&RasterImage> {
        self.resident.as_ref()
    }

    /// Open the connection if it is not already open.
    ///
    /// A fresh connection always starts with an unknown resident image, so
    /// the next cycle sends the full frame.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.link.is_some() {
            return Ok(());
        }
        let mut link = self.connector.connect().map_err(Error::Connection)?;
        link.set_ack_timeout(self.settings.ack_timeout)
            .map_err(Error::Connection)?;
        self.resident = None;
        self.needs_resync = false;
        self.link = Some(link);
        tracing::info!("Connected to device");
        Ok(())
    }

    /// Release the connection. Safe to call when already disconnected.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.shutdown();
            tracing::info!("Device disconnected");
        }
        self.resident = None;
        self.needs_resync = false;
    }

    /// Forget what the device shows; the next cycle sends a full frame.
    pub fn invalidate(&mut self) {
        if self.resident.take().is_some() {
            tracing::debug!("Resident image invalidated");
        }
    }

    /// Bring the device up to date with `current`.
    ///
    /// `current` must already be quantized (see [`pixel::quantize`]).
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if [`connect`](Self::connect) has not succeeded.
    /// - [`Error::DegenerateGeometry`] if the changed region cannot be tiled;
    ///   nothing is sent and state is kept.
    /// - [`Error::RetriesExhausted`] if a tile is rejected on every attempt.
    /// - [`Error::Connection`] on socket failure; the link is closed.
    pub fn push_frame(&mut self, current: &RasterImage) -> Result<CycleReport, Error> {
        if self.link.is_none() {
            return Err(Error::NotConnected);
        }

        let Some(bbox) = compute_bounding_box(self.resident.as_ref(), current) else {
            tracing::debug!("No changes since last cycle");
            return Ok(CycleReport::Unchanged);
        };
        if self.resident.is_none() {
            tracing::info!("Sending full frame {}", bbox);
        } else {
            tracing::info!("Update bounding box: {}", bbox);
        }

        let packed = encode_region(current, &bbox);
        let tiles = slice_into_tiles(&bbox, &packed, self.settings.max_pixel_bytes())?;

        let mut reconstructed = self
            .resident
            .clone()
            .unwrap_or_else(|| RasterImage::new(current.width(), current.height()));
        let mut retries = 0;

        for (index, tile) in tiles.iter().enumerate() {
            let attempts = self.send_tile(tile, index)?;
            retries += attempts - 1;

            let decoded = pixel::decode(tile.pixels, tile.width, tile.height)?;
            reconstructed.paste(&decoded, tile.x, tile.y);
        }

        self.resident = Some(reconstructed);
        Ok(CycleReport::Updated {
            bbox,
            tiles: tiles.len(),
            retries,
        })
    }

    /// Send one tile until it is acknowledged or the attempts run out.
    ///
    /// Returns the number of attempts used.
    fn send_tile(&mut self, tile: &Tile<'_>, tiles_confirmed: usize) -> Result<u32, Error> {
        let header = TileHeader {
            x: tile.x,
            y: tile.y,
            width: tile.width,
            height: tile.height,
            crc: tile_crc(tile.pixels),
        };
        let frame = pack_frame(
            FrameType::ImageTile,
            &tile_payload(&header, tile.pixels),
            self.settings.max_frame_payload,
        )?;
        let max_attempts = self.settings.max_attempts.max(1);

        let mut state = TileState::Sending { attempt: 1 };
        loop {
            state = match state {
                TileState::Sending { attempt } => {
                    tracing::debug!(
                        "Sending tile {}: pos({},{}) size({}x{}) crc(0x{:08X}) attempt {}/{}",
                        tiles_confirmed + 1,
                        header.x,
                        header.y,
                        header.width,
                        header.height,
                        header.crc,
                        attempt,
                        max_attempts
                    );
                    if self.needs_resync {
                        self.discard_stale_replies()?;
                    }
                    self.write_frame(&frame)?;
                    TileState::AwaitingAck { attempt }
                }
                TileState::AwaitingAck { attempt } => match self.await_reply()? {
                    Reply::Ack => TileState::Acked { attempts: attempt },
                    Reply::Rejected(reason) => {
                        if reason.leaves_stale_bytes() {
                            self.needs_resync = true;
                        }
                        tracing::warn!(
                            "Tile at ({},{}) attempt {}/{} failed: {}",
                            header.x,
                            header.y,
                            attempt,
                            max_attempts,
                            reason
                        );
                        if attempt < max_attempts {
                            TileState::Sending {
                                attempt: attempt + 1,
                            }
                        } else {
                            TileState::Exhausted {
                                attempts: attempt,
                                last: reason,
                            }
                        }
                    }
                },
                TileState::Acked { attempts } => return Ok(attempts),
                TileState::Exhausted { attempts, last } => {
                    tracing::error!(
                        "Giving up on tile at ({},{}) after {} attempts; aborting cycle",
                        header.x,
                        header.y,
                        attempts
                    );
                    return Err(Error::RetriesExhausted {
                        attempts,
                        tiles_confirmed,
                        last,
                    });
                }
            };
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        match link.write_all(frame).and_then(|_| link.flush()) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail_connection(e)),
        }
    }

    /// Read one reply frame, classifying protocol failures as rejections.
    fn await_reply(&mut self) -> Result<Reply, Error> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;

        let mut raw = [0u8; FRAME_HEADER_SIZE];
        match link.read_exact(&mut raw) {
            Ok(()) => {}
            Err(e) if is_timeout(&e) => return Ok(Reply::Rejected(Rejection::Timeout)),
            Err(e) => return Err(self.fail_connection(e)),
        }

        let header = match unpack_frame_header(&raw) {
            Ok(header) => header,
            Err(Error::MalformedFrame(reason)) => {
                return Ok(Reply::Rejected(Rejection::Malformed(reason)))
            }
            Err(other) => return Ok(Reply::Rejected(Rejection::Malformed(other.to_string()))),
        };

        let length = header.length as usize;
        if length > self.settings.max_frame_payload {
            return Ok(Reply::Rejected(Rejection::Malformed(format!(
                "reply length {} exceeds {}",
                length, self.settings.max_frame_payload
            ))));
        }
        if length > 0 {
            // Replies carry no payload; drain it to stay aligned.
            let mut discard = vec![0u8; length];
            let link = self.link.as_mut().ok_or(Error::NotConnected)?;
            match link.read_exact(&mut discard) {
                Ok(()) => {}
                Err(e) if is_timeout(&e) => return Ok(Reply::Rejected(Rejection::Timeout)),
                Err(e) => return Err(self.fail_connection(e)),
            }
        }

        Ok(match header.kind() {
            Some(FrameType::TileAck) => Reply::Ack,
            Some(FrameType::TileNack) => Reply::Rejected(Rejection::Nack),
            _ => Reply::Rejected(Rejection::Malformed(format!(
                "unexpected frame type 0x{:02X}",
                header.frame_type
            ))),
        })
    }

    /// Throw away reply bytes that arrived after their attempt was given up.
    fn discard_stale_replies(&mut self) -> Result<(), Error> {
        let ack_timeout = self.settings.ack_timeout;
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        match drain_link(link, STALE_REPLY_WINDOW, ack_timeout) {
            Ok(0) => {}
            Ok(discarded) => tracing::debug!("Discarded {} stale reply bytes", discarded),
            Err(e) => return Err(self.fail_connection(e)),
        }
        self.needs_resync = false;
        Ok(())
    }

    fn fail_connection(&mut self, err: io::Error) -> Error {
        tracing::warn!("Socket error: {}", err);
        self.close();
        Error::Connection(err)
    }
}

/// Read and discard until `link` stays quiet for `window`, then restore
/// the normal ACK timeout. Returns the number of bytes dropped.
fn drain_link<L: DeviceLink>(
    link: &mut L,
    window: Duration,
    restore: Duration,
) -> io::Result<usize> {
    link.set_ack_timeout(window)?;
    let mut scratch = [0u8; 512];
    let mut discarded = 0;
    while discarded < MAX_STALE_BYTES {
        match link.read(&mut scratch) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device closed the connection",
                ))
            }
            Ok(n) => discarded += n,
            Err(e) if is_timeout(&e) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    link.set_ack_timeout(restore)?;
    Ok(discarded)
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

impl<C: Connector> Drop for TileTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}
