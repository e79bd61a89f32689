//! # Byte ingress
//!
//! Splits the raw byte stream of ESP-AT into frames. Data is processed byte by byte and state is
//! kept between calls, so lines and payloads may be split at any position across reads.
//!
//! Socket data announced by `+IPD,<link_id>,<length>:` is read as exactly `<length>` raw bytes,
//! independent of any contained line terminators.
use crate::stack::MAX_SOCKETS;
use core::str::FromStr;
use heapless::{String, Vec};

/// Capacity of the line buffer and upper limit of the configurable max. command length
pub const MAX_LINE_LEN: usize = 256;

/// Upper limit of an announced `+IPD` length. Longer announcements are treated as garbage.
pub(crate) const MAX_PAYLOAD_LEN: usize = 8192;

/// Prefix of socket data announcements
const DATA_PREFIX: &[u8] = b"+IPD,";

/// A single unit of device output
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Frame<const RX_SIZE: usize> {
    /// Trimmed, non-empty text line
    Line(String<MAX_LINE_LEN>),

    /// Data prompt `>` of AT+CIPSEND
    Prompt,

    /// Header of incoming socket data was received, payload is following
    DataAnnounced { link_id: usize, length: usize },

    /// (Part of) incoming socket data. Payloads longer then RX_SIZE are split into multiple frames.
    Data { link_id: usize, data: Vec<u8, RX_SIZE> },
}

/// Incoming payload in progress
struct Payload<const RX_SIZE: usize> {
    /// None if the announced link_id is invalid. Payload is dropped in this case.
    link_id: Option<usize>,

    /// Bytes still expected
    remaining: usize,

    /// Bytes received but not forwarded yet
    chunk: Vec<u8, RX_SIZE>,
}

pub(crate) struct Ingress<const RX_SIZE: usize> {
    /// Current incomplete line
    line: Vec<u8, MAX_LINE_LEN>,

    /// Lines exceeding this length are dropped
    max_len: usize,

    /// True if the current line is dropped until the next line terminator
    discarding: bool,

    payload: Option<Payload<RX_SIZE>>,

    /// Number of dropped lines and payloads
    parse_errors: usize,
}

impl<const RX_SIZE: usize> Ingress<RX_SIZE> {
    pub(crate) fn new() -> Self {
        Self {
            line: Vec::new(),
            max_len: MAX_LINE_LEN,
            discarding: false,
            payload: None,
            parse_errors: 0,
        }
    }

    /// Sets the max. line length, limited by [MAX_LINE_LEN]
    pub(crate) fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len.min(MAX_LINE_LEN);
    }

    /// Drops any partial line or payload
    pub(crate) fn reset(&mut self) {
        self.line.clear();
        self.discarding = false;
        self.payload = None;
    }

    pub(crate) fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    /// Processes the next byte and returns a frame if completed
    pub(crate) fn push(&mut self, byte: u8) -> Option<Frame<RX_SIZE>> {
        if self.payload.is_some() {
            return self.push_payload(byte);
        }

        match byte {
            b'\n' => self.take_line(),
            b'\r' => None,
            b'>' if self.line.is_empty() && !self.discarding => Some(Frame::Prompt),
            b':' if !self.discarding && self.line.starts_with(DATA_PREFIX) => self.start_payload(),
            _ => {
                self.push_line(byte);
                None
            }
        }
    }

    fn push_line(&mut self, byte: u8) {
        if self.discarding {
            return;
        }

        if self.line.len() >= self.max_len {
            warn!("Dropping line exceeding {} bytes", self.max_len);
            self.parse_errors += 1;
            self.discarding = true;
            self.line.clear();
            return;
        }

        let _ = self.line.push(byte);
    }

    fn take_line(&mut self) -> Option<Frame<RX_SIZE>> {
        if self.discarding {
            self.discarding = false;
            self.line.clear();
            return None;
        }

        let frame = match core::str::from_utf8(&self.line) {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    trace!("Received line: {}", text);
                    String::from_str(text).ok().map(Frame::Line)
                }
            }
            Err(_) => {
                warn!("Dropping non UTF-8 line of {} bytes", self.line.len());
                self.parse_errors += 1;
                None
            }
        };

        self.line.clear();
        frame
    }

    /// Parses the `+IPD,<link_id>,<length>` header and switches to payload mode
    fn start_payload(&mut self) -> Option<Frame<RX_SIZE>> {
        let header = core::str::from_utf8(&self.line[DATA_PREFIX.len()..])
            .ok()
            .and_then(Self::parse_header);
        self.line.clear();

        let (link_id, length) = match header {
            Some(header) => header,
            None => {
                warn!("Dropping malformed data header");
                self.parse_errors += 1;
                self.discarding = true;
                return None;
            }
        };

        if length > MAX_PAYLOAD_LEN {
            warn!("Dropping data header announcing {} bytes", length);
            self.parse_errors += 1;
            self.discarding = true;
            return None;
        }

        let link_id = if link_id < MAX_SOCKETS {
            Some(link_id)
        } else {
            warn!("Dropping {} bytes of data for invalid link {}", length, link_id);
            self.parse_errors += 1;
            None
        };

        if length > 0 {
            self.payload = Some(Payload {
                link_id,
                remaining: length,
                chunk: Vec::new(),
            });
        }

        link_id.map(|link_id| Frame::DataAnnounced { link_id, length })
    }

    fn push_payload(&mut self, byte: u8) -> Option<Frame<RX_SIZE>> {
        let payload = self.payload.as_mut()?;
        payload.remaining -= 1;

        if payload.link_id.is_some() {
            let _ = payload.chunk.push(byte);
        }

        if !payload.chunk.is_full() && payload.remaining > 0 {
            return None;
        }

        let finished = payload.remaining == 0;
        let frame = payload.link_id.map(|link_id| Frame::Data {
            link_id,
            data: core::mem::take(&mut payload.chunk),
        });

        if finished {
            self.payload = None;
        }

        frame
    }

    /// Parses `<link_id>,<length>[,<remote_ip>,<remote_port>]`
    fn parse_header(header: &str) -> Option<(usize, usize)> {
        let mut fields = header.split(',');
        let link_id = Self::parse_number(fields.next()?)?;
        let length = Self::parse_number(fields.next()?)?;

        Some((link_id, length))
    }

    fn parse_number(field: &str) -> Option<usize> {
        if field.is_empty() || !field.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }

        field.parse().ok()
    }
}
