//! # WIFI types
//!
//! Operating modes, access point information and the event hooks of the driver.
//!
//! All enums passed to ESP-AT carry their AT values as explicit discriminants. Do not change them.
use crate::responses::{parameters, Fields, Responses, NO_AP};
use crate::stack::SocketAction;
use core::str::FromStr;
use embedded_nal::Ipv4Addr;
use heapless::String;

/// Max. SSID length in bytes, including the C string terminator of the AT firmware
pub const SSID_LEN_MAX: usize = 24;

/// Max. MAC address text length in bytes, including terminator
pub const MAC_LEN_MAX: usize = 18;

/// Max. IPv4 address text length in bytes, including terminator
pub const IPV4_LEN_MAX: usize = 16;

/// Max. passphrase length in bytes, including terminator
pub const PASSWD_LEN_MAX: usize = 24;

/// Max. length of a remote host (IPv4 address or domain name)
pub const HOST_LEN_MAX: usize = 64;

/// SSID text
pub type Ssid = String<{ SSID_LEN_MAX - 1 }>;

/// Passphrase text
pub type Password = String<{ PASSWD_LEN_MAX - 1 }>;

/// MAC address text, e.g. `10:fe:ed:05:ba:50`
pub type MacAddress = String<{ MAC_LEN_MAX - 1 }>;

/// WIFI operating mode, AT values of AT+CWMODE
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OpMode {
    #[default]
    Unknown = 0,
    Client = 1,
    Ap = 2,
    /// Client & AP
    Both = 3,
}

impl TryFrom<u8> for OpMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Client),
            2 => Ok(Self::Ap),
            3 => Ok(Self::Both),
            _ => Err(()),
        }
    }
}

impl OpMode {
    /// False if the mode is known to exclude the station (client) interface
    pub(crate) fn permits_client(&self) -> bool {
        *self != Self::Ap
    }

    /// False if the mode is known to exclude the SoftAP interface
    pub(crate) fn permits_ap(&self) -> bool {
        *self != Self::Client
    }
}

/// SoftAP encryption, AT values of AT+CWSAP
#[repr(i8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encryption {
    Invalid = -1,
    None = 0,
    /// Not supported by SoftAP configuration
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
}

impl TryFrom<i8> for Encryption {
    type Error = ();

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Invalid),
            0 => Ok(Self::None),
            1 => Ok(Self::Wep),
            2 => Ok(Self::WpaPsk),
            3 => Ok(Self::Wpa2Psk),
            4 => Ok(Self::WpaWpa2Psk),
            _ => Err(()),
        }
    }
}

/// Server action, AT values of AT+CIPSERVER
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerAction {
    Delete = 0,
    Create = 1,
}

/// Current WIFI connection state, gets updated by URC messages
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct JoinState {
    /// True if connected to an WIFI access point
    pub connected: bool,

    /// True if an IP was assigned
    pub ip_assigned: bool,
}

/// Access point the client is associated with
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// False if not joined to any access point. All other fields are empty in this case.
    pub has_ap: bool,

    pub ssid: Ssid,

    /// BSSID of the access point
    pub mac: MacAddress,
}

impl ClientInfo {
    /// Parses the response of AT+CWJAP?. ESP-AT responds with 'No AP' if not joined.
    ///
    /// Fails if neither is present, e.g. as the line was dropped.
    pub(crate) fn from_responses(responses: &Responses) -> Result<Self, ()> {
        if responses.iter().any(|line| line == NO_AP) {
            return Ok(Self::default());
        }

        let line = responses
            .iter()
            .find_map(|line| parameters(line, "+CWJAP"))
            .ok_or(())?;

        let mut fields = Fields::new(line);
        let ssid = Ssid::from_str(fields.next().ok_or(())?)?;
        let mac = MacAddress::from_str(fields.next().ok_or(())?)?;

        Ok(Self {
            has_ap: true,
            ssid,
            mac,
        })
    }
}

/// SoftAP configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApInfo {
    pub ssid: Ssid,
    pub password: Password,
    pub channel: u8,
    pub encryption: Encryption,
}

impl ApInfo {
    /// Creates a validated configuration.
    ///
    /// Encrypted networks require a password of 8 or more characters, WEP is not supported by ESP-AT.
    pub fn new(ssid: &str, password: &str, channel: u8, encryption: Encryption) -> Result<Self, Error> {
        if ssid.is_empty() {
            return Err(Error::InvalidSsidLength);
        }

        let ssid = Ssid::from_str(ssid).map_err(|_| Error::InvalidSsidLength)?;
        let password = Password::from_str(password).map_err(|_| Error::InvalidPasswordLength)?;

        if !(1..=13).contains(&channel) {
            return Err(Error::InvalidChannel);
        }

        match encryption {
            Encryption::Invalid | Encryption::Wep => return Err(Error::InvalidEncryption),
            Encryption::None => {}
            _ => {
                if password.len() < 8 {
                    return Err(Error::InvalidPasswordLength);
                }
            }
        }

        Ok(Self {
            ssid,
            password,
            channel,
            encryption,
        })
    }

    /// Parses the response of AT+CWSAP?
    pub(crate) fn from_responses(responses: &Responses) -> Result<Self, ()> {
        let line = responses
            .iter()
            .find_map(|line| parameters(line, "+CWSAP"))
            .ok_or(())?;

        let mut fields = Fields::new(line);
        let ssid = Ssid::from_str(fields.next().ok_or(())?)?;
        let password = Password::from_str(fields.next().ok_or(())?)?;
        let channel = fields.next().ok_or(())?.parse::<u8>().map_err(|_| ())?;
        let encryption = fields.next().ok_or(())?.parse::<i8>().map_err(|_| ())?;

        Ok(Self {
            ssid,
            password,
            channel,
            encryption: Encryption::try_from(encryption).unwrap_or(Encryption::Invalid),
        })
    }
}

/// Local IPv4 addresses
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IpInfo {
    /// Address of the station (client) interface
    pub client: Option<Ipv4Addr>,

    /// Address of the SoftAP interface
    pub ap: Option<Ipv4Addr>,
}

impl IpInfo {
    /// Parses the response of AT+CIFSR. Unassigned addresses (0.0.0.0) are returned as None.
    ///
    /// ESP-AT lists at least the MAC addresses, so a response without any address line is invalid.
    pub(crate) fn from_responses(responses: &Responses) -> Result<Self, ()> {
        if !responses.iter().any(|line| parameters(line, "+CIFSR").is_some()) {
            return Err(());
        }

        let mut info = Self::default();

        for response in responses {
            let line = match parameters(response, "+CIFSR") {
                Some(line) => line,
                None => continue,
            };

            let mut fields = Fields::new(line);
            let address_type = fields.next().ok_or(())?;
            let address = fields.next().ok_or(())?;

            let target = match address_type {
                "STAIP" => &mut info.client,
                "APIP" => &mut info.ap,
                _ => continue,
            };

            if address.len() >= IPV4_LEN_MAX {
                return Err(());
            }

            let address = Ipv4Addr::from_str(address).map_err(|_| ())?;
            if !address.is_unspecified() {
                *target = Some(address);
            }
        }

        Ok(info)
    }
}

/// Parses the response of AT+CWMODE?
pub(crate) fn op_mode_from_responses(responses: &Responses) -> Result<OpMode, ()> {
    let mode = responses
        .iter()
        .find_map(|line| parameters(line, "+CWMODE"))
        .ok_or(())?;

    OpMode::try_from(mode.trim().parse::<u8>().map_err(|_| ())?)
}

/// Errors detected before a command is enqueued. The callback of the operation is never called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Driver is not initialized or initialization failed
    NotReady,

    /// An initialization is already in progress
    InitInProgress,

    /// Max. command length is too short or exceeds [MAX_LINE_LEN](crate::ingress::MAX_LINE_LEN)
    InvalidMaxCommandLength,

    /// Given SSID is empty or longer then [SSID_LEN_MAX] - 1
    InvalidSsidLength,

    /// Given password is longer then [PASSWD_LEN_MAX] - 1, or too short for the encryption
    InvalidPasswordLength,

    /// Remote host is empty or longer then [HOST_LEN_MAX]
    InvalidHostLength,

    /// Link id exceeds [MAX_SOCKETS](crate::stack::MAX_SOCKETS)
    InvalidLinkId,

    /// Link is already connected or a connect/close is in progress
    SocketInUse,

    /// Unable to send data or close if socket is not connected
    SocketUnconnected,

    /// Operating mode `Unknown` can not be set
    InvalidMode,

    /// Encryption is invalid or not supported
    InvalidEncryption,

    /// WIFI channel outside of 1..=13
    InvalidChannel,

    /// Port zero is not allowed
    InvalidPort,

    /// Payload is empty or exceeds TX_SIZE
    InvalidPayloadLength,

    /// Encoded command exceeds the max. command length
    CommandTooLong,

    /// Max. number of queued commands reached
    QueueFull,

    /// Operation is not available in the current operating mode
    ModeMismatch,
}

/// Event hooks of the driver. All methods are called from within [pump](crate::adapter::Adapter::pump).
pub trait EventHandler {
    /// WIFI client state changed, e.g. 'WIFI CONNECTED', 'WIFI GOT IP' or 'WIFI DISCONNECT'
    fn client_state_changed(&mut self, _message: &str) {}

    /// Socket was connected or disconnected
    fn socket_state_changed(&mut self, _link_id: usize, _action: SocketAction) {}

    /// Data was received. Slice is just valid for the duration of the call.
    fn data_received(&mut self, _link_id: usize, _data: &[u8]) {}
}
