//! # Socket table
//!
//! ESP-AT multiplexes up to [MAX_SOCKETS] connections over the single serial link. Each
//! connection is addressed by its link_id, which is the index into the [SocketTable].
//!
//! The state of a link is changed by two sources: command completions (connect, close) and
//! unsolicited messages (`<link_id>,CONNECT`, `<link_id>,CLOSED`). Whichever source reports a
//! change first wins, the second one is a no-op. State changes are returned to the caller, which
//! is responsible for invoking the socket hook exactly once per change.
use crate::wifi::HOST_LEN_MAX;
use heapless::String;

/// Max. number of parallel connections supported by ESP-AT
pub const MAX_SOCKETS: usize = 5;

/// Transport protocol of a connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Connection type as used by AT+CIPSTART
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// An action taken by ESP-AT on a socket. Values are passed to the socket hook.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SocketAction {
    #[default]
    Unknown = 0,
    Disconnect = 1,
    Connect = 2,
}

/// Internal connection state
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum ConnectionState {
    /// Socket is closed an may be (re)used
    #[default]
    Closed,
    /// Connect command is in progress
    Connecting,
    /// Connection is fully open
    Connected,
    /// Close command is in progress
    Closing,
}

/// Remote endpoint of a client connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remote {
    pub host: String<HOST_LEN_MAX>,
    pub port: u16,
}

/// Internal state of a single socket
#[derive(Clone, Debug, Default)]
pub(crate) struct SocketState {
    /// Connection state
    pub(crate) state: ConnectionState,

    /// Protocol, None for connections accepted by the server
    pub(crate) protocol: Option<Protocol>,

    /// Remote endpoint, only known for client connections
    pub(crate) remote: Option<Remote>,

    /// Last action reported for this link
    pub(crate) last_action: SocketAction,

    /// Bytes of the current incoming data frame not yet received
    pub(crate) pending_bytes: usize,
}

/// Connection states of all links, index = link_id
#[derive(Clone, Debug, Default)]
pub struct SocketTable {
    sockets: [SocketState; MAX_SOCKETS],
}

impl SocketTable {
    /// Returns true if the link is in use, including connects and closes in progress
    pub fn is_in_use(&self, link_id: usize) -> bool {
        self.state(link_id).is_some_and(|state| state != ConnectionState::Closed)
    }

    /// Returns true if the link is fully connected
    pub fn is_connected(&self, link_id: usize) -> bool {
        self.state(link_id) == Some(ConnectionState::Connected)
    }

    /// Returns the protocol of the given link, if known
    pub fn protocol(&self, link_id: usize) -> Option<Protocol> {
        self.sockets.get(link_id)?.protocol
    }

    /// Returns the remote endpoint of the given link, if known
    pub fn remote(&self, link_id: usize) -> Option<&Remote> {
        self.sockets.get(link_id)?.remote.as_ref()
    }

    /// Returns the last action reported for the given link
    pub fn last_action(&self, link_id: usize) -> SocketAction {
        self.sockets
            .get(link_id)
            .map(|socket| socket.last_action)
            .unwrap_or_default()
    }

    /// Returns the outstanding byte count of the current incoming data frame
    pub fn pending_bytes(&self, link_id: usize) -> usize {
        self.sockets.get(link_id).map(|socket| socket.pending_bytes).unwrap_or(0)
    }

    pub(crate) fn state(&self, link_id: usize) -> Option<ConnectionState> {
        self.sockets.get(link_id).map(|socket| socket.state)
    }

    /// Allocates the link for a connect command in progress
    pub(crate) fn begin_connect(&mut self, link_id: usize, protocol: Protocol, remote: Remote) {
        if let Some(socket) = self.sockets.get_mut(link_id) {
            *socket = SocketState {
                state: ConnectionState::Connecting,
                protocol: Some(protocol),
                remote: Some(remote),
                last_action: socket.last_action,
                pending_bytes: 0,
            };
        }
    }

    /// Frees the link after a failed connect command. Links already confirmed by URC are kept.
    pub(crate) fn abort_connect(&mut self, link_id: usize) {
        if self.state(link_id) == Some(ConnectionState::Connecting) {
            self.sockets[link_id].state = ConnectionState::Closed;
            self.sockets[link_id].remote = None;
            self.sockets[link_id].protocol = None;
        }
    }

    /// Marks the link as closing while a close command is in progress
    pub(crate) fn begin_close(&mut self, link_id: usize) {
        if self.state(link_id) == Some(ConnectionState::Connected) {
            self.sockets[link_id].state = ConnectionState::Closing;
        }
    }

    /// Marks the link as connected. Returns true if this is a state change.
    pub(crate) fn mark_connected(&mut self, link_id: usize) -> bool {
        let socket = match self.sockets.get_mut(link_id) {
            Some(socket) => socket,
            None => return false,
        };

        match socket.state {
            ConnectionState::Connected | ConnectionState::Closing => false,
            ConnectionState::Connecting => {
                socket.state = ConnectionState::Connected;
                socket.last_action = SocketAction::Connect;
                true
            }
            ConnectionState::Closed => {
                // Incoming connection accepted by the server
                *socket = SocketState {
                    state: ConnectionState::Connected,
                    protocol: None,
                    remote: None,
                    last_action: SocketAction::Connect,
                    pending_bytes: 0,
                };
                true
            }
        }
    }

    /// Marks the link as closed. Returns true if the link was connected before.
    pub(crate) fn mark_closed(&mut self, link_id: usize) -> bool {
        let socket = match self.sockets.get_mut(link_id) {
            Some(socket) => socket,
            None => return false,
        };

        let was_connected = matches!(socket.state, ConnectionState::Connected | ConnectionState::Closing);

        if socket.state == ConnectionState::Connecting {
            // The pending connect command fails and frees the link
            return false;
        }

        if was_connected {
            socket.last_action = SocketAction::Disconnect;
        }

        socket.state = ConnectionState::Closed;
        socket.remote = None;
        socket.protocol = None;
        socket.pending_bytes = 0;
        was_connected
    }

    /// Closes all links and returns the ids of links which were connected
    pub(crate) fn close_all(&mut self) -> heapless::Vec<usize, MAX_SOCKETS> {
        let mut closed = heapless::Vec::new();

        for link_id in 0..MAX_SOCKETS {
            let connecting = self.sockets[link_id].state == ConnectionState::Connecting;

            if self.mark_closed(link_id) {
                let _ = closed.push(link_id);
            }

            if connecting {
                self.abort_connect(link_id);
            }
        }

        closed
    }

    /// Stores the length of an announced data frame
    pub(crate) fn announce_data(&mut self, link_id: usize, length: usize) {
        if let Some(socket) = self.sockets.get_mut(link_id) {
            socket.pending_bytes = length;
        }
    }

    /// Reduces the pending length after a received data chunk
    pub(crate) fn consume_data(&mut self, link_id: usize, length: usize) {
        if let Some(socket) = self.sockets.get_mut(link_id) {
            socket.pending_bytes = socket.pending_bytes.saturating_sub(length);
        }
    }
}
