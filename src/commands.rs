use crate::responses::NoResponse;
use crate::stack::Protocol;
use crate::wifi::{HOST_LEN_MAX, PASSWD_LEN_MAX, SSID_LEN_MAX};
use atat::atat_derive::AtatCmd;
use heapless::String;

/// How the device terminates the exchange of a command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Expect {
    /// Completed by `OK`, failed by `ERROR` or `FAIL`
    Ok,

    /// `OK` followed by the `>` data prompt. Completed by `SEND OK` after the payload was written.
    Prompt,

    /// `OK` followed by a reboot of the module. Completed by the `ready` banner.
    Ready,
}

/// Trait for describing the termination pattern of a command
pub(crate) trait CommandKind {
    /// Expected termination pattern
    const EXPECT: Expect = Expect::Ok;
}

/// Restarts the module
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+RST", NoResponse, timeout_ms = 5_000, attempts = 1)]
pub struct RestartCommand;

impl CommandKind for RestartCommand {
    const EXPECT: Expect = Expect::Ready;
}

/// Disables the command echo
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("E0", NoResponse, timeout_ms = 1_000, attempts = 3)]
pub struct EchoOffCommand;

impl CommandKind for EchoOffCommand {}

/// Enables/Disables multiple connections
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPMUX", NoResponse, timeout_ms = 1_000, attempts = 3)]
pub struct SetMultipleConnectionsCommand {
    /// 0: single connection, 1: multiple connections
    mode: usize,
}

impl SetMultipleConnectionsCommand {
    /// Enables multiple connections
    pub fn multiple() -> Self {
        Self { mode: 1 }
    }
}

impl CommandKind for SetMultipleConnectionsCommand {}

/// Queries the current WIFI mode, responded by `+CWMODE:<mode>`
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWMODE?", NoResponse, timeout_ms = 1_000, attempts = 3)]
pub struct WifiModeQuery;

impl CommandKind for WifiModeQuery {}

/// Sets the WIFI mode
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWMODE", NoResponse, timeout_ms = 1_000)]
pub struct WifiModeCommand {
    /// WIFI mode:
    ///     1: Station mode.
    ///     2: SoftAP mode.
    ///     3: SoftAP+Station mode.
    #[at_arg(position = 0)]
    mode: u8,
}

impl WifiModeCommand {
    pub fn new(mode: u8) -> Self {
        Self { mode }
    }
}

impl CommandKind for WifiModeCommand {}

/// Command for joining the target WIFI access point
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWJAP", NoResponse, timeout_ms = 20_000, attempts = 1)]
pub struct AccessPointConnectCommand {
    /// The SSID of the target access point
    #[at_arg(position = 0)]
    ssid: String<{ SSID_LEN_MAX - 1 }>,

    /// The password/key of the target access point
    #[at_arg(position = 1)]
    password: String<{ PASSWD_LEN_MAX - 1 }>,
}

impl AccessPointConnectCommand {
    pub fn new(ssid: String<{ SSID_LEN_MAX - 1 }>, password: String<{ PASSWD_LEN_MAX - 1 }>) -> Self {
        Self { ssid, password }
    }
}

impl CommandKind for AccessPointConnectCommand {}

/// Queries the joined access point, responded by `+CWJAP:"<ssid>","<bssid>",<channel>,<rssi>`
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWJAP?", NoResponse, timeout_ms = 1_000, attempts = 2)]
pub struct AccessPointQuery;

impl CommandKind for AccessPointQuery {}

/// Queries the local IP and MAC addresses
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CIFSR", NoResponse, timeout_ms = 1_000, attempts = 2)]
pub struct ObtainLocalAddressCommand;

impl CommandKind for ObtainLocalAddressCommand {}

/// Queries the SoftAP configuration, responded by `+CWSAP:"<ssid>","<pwd>",<chl>,<ecn>,...`
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWSAP?", NoResponse, timeout_ms = 1_000, attempts = 2)]
pub struct SoftApQuery;

impl CommandKind for SoftApQuery {}

/// Configures the SoftAP
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWSAP", NoResponse, timeout_ms = 5_000, attempts = 1)]
pub struct SoftApConfigCommand {
    #[at_arg(position = 0)]
    ssid: String<{ SSID_LEN_MAX - 1 }>,

    #[at_arg(position = 1)]
    password: String<{ PASSWD_LEN_MAX - 1 }>,

    /// WIFI channel
    #[at_arg(position = 2)]
    channel: u8,

    /// Encryption, s. [Encryption](crate::wifi::Encryption)
    #[at_arg(position = 3)]
    encryption: u8,
}

impl SoftApConfigCommand {
    pub fn new(
        ssid: String<{ SSID_LEN_MAX - 1 }>,
        password: String<{ PASSWD_LEN_MAX - 1 }>,
        channel: u8,
        encryption: u8,
    ) -> Self {
        Self {
            ssid,
            password,
            channel,
            encryption,
        }
    }
}

impl CommandKind for SoftApConfigCommand {}

/// Establish TCP Connection or UDP Transmission
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSTART", NoResponse, timeout_ms = 10_000, attempts = 1)]
pub struct ConnectCommand {
    /// Socket ID
    link_id: usize,

    /// Connection type, TCP or UDP
    connection_type: String<3>,

    /// Remote IPv4 address or domain name
    remote_host: String<HOST_LEN_MAX>,

    /// Remote port
    port: u16,
}

impl ConnectCommand {
    pub fn new(link_id: usize, protocol: Protocol, remote_host: String<HOST_LEN_MAX>, port: u16) -> Self {
        let mut connection_type = String::new();
        let _ = connection_type.push_str(protocol.as_str());

        Self {
            link_id,
            connection_type,
            remote_host,
            port,
        }
    }
}

impl CommandKind for ConnectCommand {}

/// Initiates the transmission of the given data length. ESP-AT responds with the `>` prompt.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSEND", NoResponse, timeout_ms = 2_000, attempts = 1)]
pub struct TransmissionPrepareCommand {
    /// Socket ID
    link_id: usize,

    /// Length of the payload in bytes
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(link_id: usize, length: usize) -> Self {
        Self { link_id, length }
    }
}

impl CommandKind for TransmissionPrepareCommand {
    const EXPECT: Expect = Expect::Prompt;
}

/// Closes the given socket
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPCLOSE", NoResponse, timeout_ms = 5_000, attempts = 1)]
pub struct CloseSocketCommand {
    /// Socket ID
    link_id: usize,
}

impl CloseSocketCommand {
    pub fn new(link_id: usize) -> Self {
        Self { link_id }
    }
}

impl CommandKind for CloseSocketCommand {}

/// Creates a TCP server listening on the given port
#[derive(Clone, AtatCmd)]
#[at_cmd("+CIPSERVER", NoResponse, timeout_ms = 1_000, attempts = 1)]
pub struct ServerCreateCommand {
    /// Always 1
    mode: u8,

    /// Local port
    port: u16,
}

impl ServerCreateCommand {
    pub fn new(port: u16) -> Self {
        Self { mode: 1, port }
    }
}

impl CommandKind for ServerCreateCommand {}

/// Deletes the TCP server
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CIPSERVER", NoResponse, timeout_ms = 1_000, attempts = 1)]
pub struct ServerDeleteCommand {
    /// Always 0
    mode: u8,
}

impl ServerDeleteCommand {
    pub fn new() -> Self {
        Self { mode: 0 }
    }
}

impl CommandKind for ServerDeleteCommand {}
