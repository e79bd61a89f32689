use crate::stack::MAX_SOCKETS;
use atat::AtatUrc;

/// Unsolicited messages of ESP-AT, parsed from a single line without line terminator.
///
/// Lines not matching any URC return `None` and are treated as command responses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum URCMessages {
    /// Modem is ready for receiving AT commands. Emitted after every (re)boot.
    Ready,
    /// WIFi connection state changed to to connected
    WifiConnected,
    /// Wifi connection state changed to disconnected
    WifiDisconnected,
    /// Received an IP from the access point
    ReceivedIP,
    /// Any other WIFI state line, e.g. 'WIFI CONNECTING'
    WifiUnknown,
    /// Socket with the given link_id connected
    SocketConnected(usize),
    /// Socket with the given link_id closed
    SocketClosed(usize),
    /// Connect was rejected as the given link is already connected
    AlreadyConnected,
    /// Confirmation that the given number of bytes have been received by ESP-AT
    ReceivedBytes(usize),
    /// ESP-AT is still processing the previous command, e.g. 'busy p...'
    Busy,
}

impl AtatUrc for URCMessages {
    type Response = Self;

    fn parse(resp: &[u8]) -> Option<Self::Response> {
        match resp {
            b"ready" => return Some(Self::Ready),
            b"WIFI CONNECTED" => return Some(Self::WifiConnected),
            b"WIFI DISCONNECT" => return Some(Self::WifiDisconnected),
            b"WIFI GOT IP" => return Some(Self::ReceivedIP),
            b"ALREADY CONNECTED" => return Some(Self::AlreadyConnected),
            _ => {}
        }

        if let Some(link_id) = resp.strip_suffix(b",CONNECT") {
            return Some(Self::SocketConnected(URCMessages::parse_link_id(link_id)?));
        }

        if let Some(link_id) = resp.strip_suffix(b",CLOSED") {
            return Some(Self::SocketClosed(URCMessages::parse_link_id(link_id)?));
        }

        if resp.starts_with(b"Recv ") {
            return Some(Self::ReceivedBytes(URCMessages::parse_receive_byte_count(resp)?));
        }

        if resp.starts_with(b"WIFI ") {
            return Some(Self::WifiUnknown);
        }

        if resp.starts_with(b"busy ") {
            return Some(Self::Busy);
        }

        None
    }
}

impl URCMessages {
    /// Parses the socket id. Supports just the single digit link ids of ESP-AT.
    fn parse_link_id(link_id: &[u8]) -> Option<usize> {
        match link_id {
            [digit @ b'0'..=b'9'] if usize::from(digit - b'0') < MAX_SOCKETS => Some(usize::from(digit - b'0')),
            _ => None,
        }
    }

    /// Tries to parse the N byte count of 'Recv N bytes'
    fn parse_receive_byte_count(resp: &[u8]) -> Option<usize> {
        let byte_count = resp.strip_prefix(b"Recv ")?.strip_suffix(b" bytes")?;
        let string = core::str::from_utf8(byte_count).ok()?;

        if !string.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }

        string.parse::<usize>().ok()
    }

    /// True if this message is a WIFI client state change
    pub(crate) fn is_wifi_state(&self) -> bool {
        matches!(
            self,
            Self::WifiConnected | Self::WifiDisconnected | Self::ReceivedIP | Self::WifiUnknown
        )
    }
}
