use crate::commands::{
    AccessPointConnectCommand, AccessPointQuery, CloseSocketCommand, CommandKind, ConnectCommand,
    ObtainLocalAddressCommand, ServerCreateCommand, ServerDeleteCommand, SoftApConfigCommand, SoftApQuery,
    TransmissionPrepareCommand, WifiModeCommand, WifiModeQuery,
};
use crate::dispatcher::{Callback, Command, CommandError, Completion, Dispatcher};
use crate::ingress::{Frame, Ingress, MAX_LINE_LEN};
use crate::init::{InitCallback, InitState, InitStep};
use crate::responses::{ResponseCode, Responses};
use crate::stack::{ConnectionState, Protocol, Remote, SocketAction, SocketTable, MAX_SOCKETS};
use crate::urc::URCMessages;
use crate::wifi::{
    op_mode_from_responses, ApInfo, ClientInfo, Error, EventHandler, IpInfo, JoinState, OpMode, Password,
    ServerAction, Ssid, HOST_LEN_MAX,
};
use alloc::boxed::Box;
use atat::{AtatCmd, AtatUrc};
use core::str::FromStr;
use embedded_io::{Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use heapless::{String, Vec};

/// Min. value of the max. command length, all bring-up commands need to fit
pub const MIN_CMD_LEN: usize = 16;

/// Default max. number of queued commands
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Max. payload length of a single AT+CIPSEND
pub const MAX_SEND_LEN: usize = 2048;

/// Bytes read from the transport at once
const READ_CHUNK_SIZE: usize = 64;

/// Central driver of the ESP8266 module
///
/// All operations return immediately. Commands are written and responses are processed by [pump](Self::pump),
/// which needs to be called periodically. Callbacks and event hooks are invoked from within `pump`.
///
/// TX_SIZE: Max. payload length of a single [send](Self::send) call. Max. value: [MAX_SEND_LEN] (ESP-AT limit)
///
/// RX_SIZE: Chunk size of received socket data passed to [EventHandler::data_received]. Longer payloads are
/// split into multiple calls. Min. value: 1
///
/// Invalid sizes are rejected at compile time:
/// ```compile_fail
/// # use esp8266_at_driver::adapter::Adapter;
/// # use esp8266_at_driver::example::{ExampleSerial, ExampleTimer};
/// let adapter: Adapter<_, _, 1_000, 1_024, 0> = Adapter::new(ExampleSerial::default(), ExampleTimer::default());
/// ```
pub struct Adapter<T, TM, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
where
    T: Read + ReadReady + Write,
    TM: Timer<TIMER_HZ>,
{
    /// Serial connection to ESP-AT
    pub(crate) transport: T,

    /// Timer used for command timeouts and the pump budget
    pub(crate) timer: TM,

    ingress: Ingress<RX_SIZE>,

    dispatcher: Dispatcher<Operation, TIMER_HZ, TX_SIZE>,

    /// Device state, reset on every init
    session: Session,

    /// Registered event hooks, kept across inits
    hooks: Option<Box<dyn EventHandler>>,

    /// Max. length of encoded commands and received lines
    max_cmd_len: usize,
}

/// Device state
#[derive(Default)]
struct Session {
    init_state: InitState,

    /// Operating mode as last probed or set
    op_mode: OpMode,

    /// Gets updated by WIFI URC messages
    join_state: JoinState,

    /// Last queried access point association
    client_info: Option<ClientInfo>,

    /// Last queried or set SoftAP configuration
    ap_info: Option<ApInfo>,

    /// Last queried local addresses
    ip_info: Option<IpInfo>,

    /// Port of the listening server, if created
    server_port: Option<u16>,

    sockets: SocketTable,
}

/// Continuation of an enqueued command
pub(crate) enum Operation {
    Init { step: InitStep, callback: InitCallback },
    SoftReset { step: InitStep, callback: Callback<()> },
    /// Bring-up configuration re-applied after an unexpected restart
    Recover(InitStep),
    SetMode { mode: OpMode, callback: Callback<()> },
    GetMode(Callback<OpMode>),
    Join(Callback<()>),
    ClientInfo(Callback<ClientInfo>),
    IpInfo(Callback<IpInfo>),
    ApInfo(Callback<ApInfo>),
    SetApInfo { info: ApInfo, callback: Callback<()> },
    Connect { link_id: usize, callback: Callback<usize> },
    Send { length: usize, callback: Callback<usize> },
    Close { link_id: usize, callback: Callback<()> },
    Server { action: ServerAction, port: u16, callback: Callback<()> },
}

impl Operation {
    /// Completes the operation without a device response
    fn reject(self, error: CommandError) {
        match self {
            Operation::Init { callback, .. } => callback(InitState::Failed),
            Operation::Recover(_) => {}
            Operation::SoftReset { callback, .. }
            | Operation::SetMode { callback, .. }
            | Operation::Join(callback)
            | Operation::SetApInfo { callback, .. }
            | Operation::Close { callback, .. }
            | Operation::Server { callback, .. } => callback(Err(error)),
            Operation::GetMode(callback) => callback(Err(error)),
            Operation::ClientInfo(callback) => callback(Err(error)),
            Operation::IpInfo(callback) => callback(Err(error)),
            Operation::ApInfo(callback) => callback(Err(error)),
            Operation::Connect { callback, .. } | Operation::Send { callback, .. } => callback(Err(error)),
        }
    }
}

impl<T, TM, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize> Adapter<T, TM, TIMER_HZ, TX_SIZE, RX_SIZE>
where
    T: Read + ReadReady + Write,
    TM: Timer<TIMER_HZ>,
{
    const VALID_SIZES: () = assert!(
        RX_SIZE > 0 && TX_SIZE <= MAX_SEND_LEN,
        "RX_SIZE must not be zero, TX_SIZE must not exceed 2048"
    );

    /// Creates a new driver. The driver is not ready until [init](Self::init) has succeeded.
    pub fn new(transport: T, timer: TM) -> Self {
        let () = Self::VALID_SIZES;

        Self {
            transport,
            timer,
            ingress: Ingress::new(),
            dispatcher: Dispatcher::new(DEFAULT_QUEUE_CAPACITY),
            session: Session::default(),
            hooks: None,
            max_cmd_len: MAX_LINE_LEN,
        }
    }

    /// Starts the initialization sequence (restart, echo off, multiple connections, mode probe).
    ///
    /// A previous initialization is discarded: pending commands are completed with [CommandError::Reset]
    /// and all sockets in use get disconnected.
    ///
    /// The callback is called once with [InitState::Ready] or [InitState::Failed].
    pub fn init(&mut self, max_cmd_len: usize, callback: impl FnOnce(InitState) + 'static) -> Result<(), Error> {
        if self.session.init_state == InitState::Initializing {
            return Err(Error::InitInProgress);
        }

        if !(MIN_CMD_LEN..=MAX_LINE_LEN).contains(&max_cmd_len) {
            return Err(Error::InvalidMaxCommandLength);
        }

        let command = InitStep::FIRST.command(max_cmd_len, ())?;
        self.reset_session();

        self.max_cmd_len = max_cmd_len;
        self.ingress.set_max_len(max_cmd_len);

        self.dispatcher.enqueue_front(command.with_operation(Operation::Init {
            step: InitStep::FIRST,
            callback: Box::new(callback),
        }));
        self.session.init_state = InitState::Initializing;
        debug!("Initialization started");

        Ok(())
    }

    /// Registers the event hooks, replacing any previously registered ones
    pub fn register_hooks(&mut self, hooks: impl EventHandler + 'static) {
        self.hooks = Some(Box::new(hooks));
    }

    /// Sets the WIFI operating mode
    pub fn set_op_mode(
        &mut self,
        mode: OpMode,
        callback: impl FnOnce(Result<(), CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;

        if mode == OpMode::Unknown {
            return Err(Error::InvalidMode);
        }

        let operation = Operation::SetMode {
            mode,
            callback: Box::new(callback),
        };
        self.enqueue(&WifiModeCommand::new(mode as u8), operation)
    }

    /// Queries the WIFI operating mode
    pub fn get_op_mode(&mut self, callback: impl FnOnce(Result<OpMode, CommandError>) + 'static) -> Result<(), Error> {
        self.ensure_ready()?;
        self.enqueue(&WifiModeQuery, Operation::GetMode(Box::new(callback)))
    }

    /// Joins the given access point. Connection state changes are reported by [EventHandler::client_state_changed].
    ///
    /// If the connection is lost later, ESP-AT tries independently to reconnect.
    pub fn join(
        &mut self,
        ssid: &str,
        password: &str,
        callback: impl FnOnce(Result<(), CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        self.ensure_client_mode()?;

        if ssid.is_empty() {
            return Err(Error::InvalidSsidLength);
        }

        let ssid = Ssid::from_str(ssid).map_err(|_| Error::InvalidSsidLength)?;
        let password = Password::from_str(password).map_err(|_| Error::InvalidPasswordLength)?;

        let command = AccessPointConnectCommand::new(ssid, password);
        self.enqueue(&command, Operation::Join(Box::new(callback)))
    }

    /// Queries the access point the client is associated with
    pub fn get_client_ap(
        &mut self,
        callback: impl FnOnce(Result<ClientInfo, CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        self.ensure_client_mode()?;
        self.enqueue(&AccessPointQuery, Operation::ClientInfo(Box::new(callback)))
    }

    /// Queries the local IP addresses
    pub fn get_ip_info(&mut self, callback: impl FnOnce(Result<IpInfo, CommandError>) + 'static) -> Result<(), Error> {
        self.ensure_ready()?;
        self.enqueue(&ObtainLocalAddressCommand, Operation::IpInfo(Box::new(callback)))
    }

    /// Queries the SoftAP configuration
    pub fn get_ap_info(&mut self, callback: impl FnOnce(Result<ApInfo, CommandError>) + 'static) -> Result<(), Error> {
        self.ensure_ready()?;
        self.ensure_ap_mode()?;
        self.enqueue(&SoftApQuery, Operation::ApInfo(Box::new(callback)))
    }

    /// Configures the SoftAP
    pub fn set_ap_info(
        &mut self,
        info: ApInfo,
        callback: impl FnOnce(Result<(), CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        self.ensure_ap_mode()?;

        // Fields are public, so the configuration may have been altered after construction
        let info = ApInfo::new(&info.ssid, &info.password, info.channel, info.encryption)?;

        let command = SoftApConfigCommand::new(
            info.ssid.clone(),
            info.password.clone(),
            info.channel,
            info.encryption as u8,
        );
        let operation = Operation::SetApInfo {
            info,
            callback: Box::new(callback),
        };
        self.enqueue(&command, operation)
    }

    /// Opens a TCP connection or UDP transmission on the given link.
    ///
    /// The callback receives the link id on success. [EventHandler::socket_state_changed] is called once
    /// the connection is established.
    pub fn connect(
        &mut self,
        link_id: usize,
        protocol: Protocol,
        host: &str,
        port: u16,
        callback: impl FnOnce(Result<usize, CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        Self::ensure_link_id(link_id)?;

        if self.session.sockets.is_in_use(link_id) {
            return Err(Error::SocketInUse);
        }

        if host.is_empty() || host.len() > HOST_LEN_MAX {
            return Err(Error::InvalidHostLength);
        }

        if port == 0 {
            return Err(Error::InvalidPort);
        }

        let host = String::<HOST_LEN_MAX>::from_str(host).map_err(|_| Error::InvalidHostLength)?;
        let command = ConnectCommand::new(link_id, protocol, host.clone(), port);
        let operation = Operation::Connect {
            link_id,
            callback: Box::new(callback),
        };

        self.enqueue(&command, operation)?;
        self.session
            .sockets
            .begin_connect(link_id, protocol, Remote { host, port });

        Ok(())
    }

    /// Sends the given data on a connected link. The callback receives the number of bytes sent.
    pub fn send(
        &mut self,
        link_id: usize,
        data: &[u8],
        callback: impl FnOnce(Result<usize, CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        Self::ensure_link_id(link_id)?;

        if !self.session.sockets.is_connected(link_id) {
            return Err(Error::SocketUnconnected);
        }

        if data.is_empty() {
            return Err(Error::InvalidPayloadLength);
        }

        let payload = Vec::from_slice(data).map_err(|_| Error::InvalidPayloadLength)?;
        let operation = Operation::Send {
            length: data.len(),
            callback: Box::new(callback),
        };

        let command = TransmissionPrepareCommand::new(link_id, data.len());
        let command = Command::new(&command, self.max_cmd_len, operation)?.with_payload(payload);
        self.dispatcher.enqueue(command)
    }

    /// Closes the given link
    pub fn close(&mut self, link_id: usize, callback: impl FnOnce(Result<(), CommandError>) + 'static) -> Result<(), Error> {
        self.ensure_ready()?;
        Self::ensure_link_id(link_id)?;

        match self.session.sockets.state(link_id) {
            Some(ConnectionState::Connected) => {}
            Some(ConnectionState::Closed) | None => return Err(Error::SocketUnconnected),
            Some(_) => return Err(Error::SocketInUse),
        }

        let operation = Operation::Close {
            link_id,
            callback: Box::new(callback),
        };
        self.enqueue(&CloseSocketCommand::new(link_id), operation)?;
        self.session.sockets.begin_close(link_id);

        Ok(())
    }

    /// Creates a TCP server on the given port or deletes it. Port is ignored on deletion.
    ///
    /// Accepted connections are reported by [EventHandler::socket_state_changed].
    pub fn server(
        &mut self,
        action: ServerAction,
        port: u16,
        callback: impl FnOnce(Result<(), CommandError>) + 'static,
    ) -> Result<(), Error> {
        self.ensure_ready()?;

        let operation = Operation::Server {
            action,
            port,
            callback: Box::new(callback),
        };

        match action {
            ServerAction::Create => {
                if port == 0 {
                    return Err(Error::InvalidPort);
                }

                self.enqueue(&ServerCreateCommand::new(port), operation)
            }
            ServerAction::Delete => self.enqueue(&ServerDeleteCommand::new(), operation),
        }
    }

    /// Restarts the module and re-applies the bring-up configuration. The init state is not changed.
    pub fn soft_reset(&mut self, callback: impl FnOnce(Result<(), CommandError>) + 'static) -> Result<(), Error> {
        if self.session.init_state == InitState::Initializing {
            return Err(Error::InitInProgress);
        }

        let command = InitStep::FIRST.command(self.max_cmd_len, ())?;
        self.dispatcher.enqueue(command.with_operation(Operation::SoftReset {
            step: InitStep::FIRST,
            callback: Box::new(callback),
        }))
    }

    /// Processes pending work: writes the next command, processes received bytes and checks the command timeout.
    ///
    /// Returns when no more bytes are available or the budget is exhausted. At least one chunk is
    /// processed if available, so a zero budget still makes progress.
    pub fn pump(&mut self, budget: TimerDurationU32<TIMER_HZ>) {
        let started = self.timer.now();
        let mut buffer = [0x0; READ_CHUNK_SIZE];

        self.start_next();

        loop {
            match self.transport.read_ready() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    error!("Checking transport for data failed");
                    break;
                }
            }

            let length = match self.transport.read(&mut buffer) {
                Ok(0) => break,
                Ok(length) => length,
                Err(_) => {
                    error!("Reading from transport failed");
                    break;
                }
            };

            for byte in &buffer[..length] {
                if let Some(frame) = self.ingress.push(*byte) {
                    self.handle_frame(frame);
                }
            }

            self.start_next();

            if self.budget_exhausted(started, budget) {
                trace!("Pump budget exhausted");
                break;
            }
        }

        let completion = self.dispatcher.poll_timeout(&mut self.transport, &mut self.timer);
        self.finish(completion);
        self.start_next();
    }

    /// Sets the timeout for the `SEND OK` confirmation after the payload was written
    pub fn set_send_timeout_ms(&mut self, timeout: u32) {
        self.dispatcher.set_send_timeout(TimerDurationU32::millis(timeout));
    }

    /// Sets the max. number of queued commands. Already queued commands are kept.
    pub fn set_queue_capacity(&mut self, capacity: usize) {
        self.dispatcher.set_capacity(capacity);
    }

    pub fn init_state(&self) -> InitState {
        self.session.init_state
    }

    pub fn op_mode(&self) -> OpMode {
        self.session.op_mode
    }

    /// Returns the current WIFI connection state
    pub fn join_status(&self) -> JoinState {
        self.session.join_state
    }

    /// Returns the last queried access point association
    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.session.client_info.as_ref()
    }

    /// Returns the last queried or set SoftAP configuration
    pub fn ap_info(&self) -> Option<&ApInfo> {
        self.session.ap_info.as_ref()
    }

    /// Returns the last queried local addresses
    pub fn ip_info(&self) -> Option<IpInfo> {
        self.session.ip_info
    }

    /// Returns the port of the listening server
    pub fn server_port(&self) -> Option<u16> {
        self.session.server_port
    }

    pub fn is_connected(&self, link_id: usize) -> bool {
        self.session.sockets.is_connected(link_id)
    }

    pub fn sockets(&self) -> &SocketTable {
        &self.session.sockets
    }

    /// Number of dropped lines and payloads since creation
    pub fn parse_errors(&self) -> usize {
        self.ingress.parse_errors()
    }

    /// Number of commands waiting for completion, including the one in flight
    pub fn pending_commands(&self) -> usize {
        self.dispatcher.queued() + usize::from(self.dispatcher.is_busy())
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        if self.session.init_state != InitState::Ready {
            return Err(Error::NotReady);
        }

        Ok(())
    }

    fn ensure_client_mode(&self) -> Result<(), Error> {
        if !self.session.op_mode.permits_client() {
            return Err(Error::ModeMismatch);
        }

        Ok(())
    }

    fn ensure_ap_mode(&self) -> Result<(), Error> {
        if !self.session.op_mode.permits_ap() {
            return Err(Error::ModeMismatch);
        }

        Ok(())
    }

    fn ensure_link_id(link_id: usize) -> Result<(), Error> {
        if link_id >= MAX_SOCKETS {
            return Err(Error::InvalidLinkId);
        }

        Ok(())
    }

    /// Encodes and enqueues the command. The operation is dropped on error.
    fn enqueue<Cmd: AtatCmd + CommandKind>(&mut self, command: &Cmd, operation: Operation) -> Result<(), Error> {
        let command = Command::new(command, self.max_cmd_len, operation)?;
        self.dispatcher.enqueue(command)
    }

    fn budget_exhausted(&mut self, started: TimerInstantU32<TIMER_HZ>, budget: TimerDurationU32<TIMER_HZ>) -> bool {
        self.timer
            .now()
            .checked_duration_since(started)
            .map_or(true, |elapsed| elapsed >= budget)
    }

    fn start_next(&mut self) {
        while let Some(completion) = self.dispatcher.start_next(&mut self.transport, &mut self.timer) {
            self.complete(completion);
        }
    }

    fn handle_frame(&mut self, frame: Frame<RX_SIZE>) {
        match frame {
            Frame::Line(line) => self.handle_line(&line),
            Frame::Prompt => {
                let completion = self.dispatcher.on_prompt(&mut self.transport, &mut self.timer);
                self.finish(completion);
            }
            Frame::DataAnnounced { link_id, length } => {
                trace!("Receiving {} bytes on link {}", length, link_id);
                self.session.sockets.announce_data(link_id, length);
            }
            Frame::Data { link_id, data } => {
                self.session.sockets.consume_data(link_id, data.len());

                if !self.session.sockets.is_connected(link_id) {
                    warn!("Received data on unconnected link {}", link_id);
                }

                if let Some(hooks) = self.hooks.as_mut() {
                    hooks.data_received(link_id, &data);
                }
            }
        }
    }

    /// Routes a line to the dispatcher (result codes, information), or applies it as URC message
    fn handle_line(&mut self, line: &str) {
        if let Some(code) = ResponseCode::parse(line) {
            let completion = self
                .dispatcher
                .on_response_code(code, &mut self.transport, &mut self.timer);
            return self.finish(completion);
        }

        match URCMessages::parse(line.as_bytes()) {
            Some(message) => self.handle_urc(message, line),
            None => self.dispatcher.collect(line),
        }
    }

    fn handle_urc(&mut self, message: URCMessages, line: &str) {
        trace!("Received URC message: {:?}", message);

        match message {
            URCMessages::Ready => match self.dispatcher.on_ready() {
                Some(completion) => self.complete(completion),
                None => {
                    warn!("Unexpected restart of ESP-AT");
                    self.on_restart();
                    self.recover();
                }
            },
            URCMessages::WifiConnected => self.session.join_state.connected = true,
            URCMessages::WifiDisconnected => {
                self.session.join_state.connected = false;
                self.session.join_state.ip_assigned = false;
            }
            URCMessages::ReceivedIP => self.session.join_state.ip_assigned = true,
            URCMessages::WifiUnknown => {}
            URCMessages::SocketConnected(link_id) => {
                if self.session.sockets.mark_connected(link_id) {
                    self.notify_socket(link_id, SocketAction::Connect);
                }
            }
            URCMessages::SocketClosed(link_id) => {
                if self.session.sockets.mark_closed(link_id) {
                    self.notify_socket(link_id, SocketAction::Disconnect);
                }
            }
            URCMessages::AlreadyConnected => self.dispatcher.on_already_connected(),
            URCMessages::ReceivedBytes(count) => self.dispatcher.on_received_bytes(count),
            URCMessages::Busy => debug!("ESP-AT is busy"),
        }

        if message.is_wifi_state() {
            if let Some(hooks) = self.hooks.as_mut() {
                hooks.client_state_changed(line);
            }
        }
    }

    fn finish(&mut self, completion: Option<Completion<Operation>>) {
        if let Some(completion) = completion {
            self.complete(completion);
        }
    }

    /// Applies the result of a completed command and invokes the callback
    fn complete(&mut self, completion: Completion<Operation>) {
        let Completion {
            operation,
            result,
            already_connected,
        } = completion;

        match operation {
            Operation::Init { step, callback } => self.continue_init(step, result, callback),
            Operation::SoftReset { step, callback } => self.continue_soft_reset(step, result, callback),
            Operation::Recover(step) => self.continue_recover(step, result),
            Operation::SetMode { mode, callback } => {
                if result.is_ok() {
                    self.session.op_mode = mode;
                }

                callback(result.map(|_| ()));
            }
            Operation::GetMode(callback) => {
                let result = result.and_then(|responses| Self::decode(op_mode_from_responses(&responses)));
                if let Ok(mode) = result {
                    self.session.op_mode = mode;
                }

                callback(result);
            }
            Operation::Join(callback) => callback(result.map(|_| ())),
            Operation::ClientInfo(callback) => {
                let result = result.and_then(|responses| Self::decode(ClientInfo::from_responses(&responses)));
                if let Ok(info) = &result {
                    self.session.client_info = Some(info.clone());
                }

                callback(result);
            }
            Operation::IpInfo(callback) => {
                let result = result.and_then(|responses| Self::decode(IpInfo::from_responses(&responses)));
                if let Ok(info) = result {
                    self.session.ip_info = Some(info);
                }

                callback(result);
            }
            Operation::ApInfo(callback) => {
                let result = result.and_then(|responses| Self::decode(ApInfo::from_responses(&responses)));
                if let Ok(info) = &result {
                    self.session.ap_info = Some(info.clone());
                }

                callback(result);
            }
            Operation::SetApInfo { info, callback } => {
                if result.is_ok() {
                    self.session.ap_info = Some(info);
                }

                callback(result.map(|_| ()));
            }
            Operation::Connect { link_id, callback } => {
                let result = match result {
                    Err(CommandError::Error) if already_connected => {
                        debug!("Link {} is already connected", link_id);
                        Ok(Responses::new())
                    }
                    result => result,
                };

                match result {
                    Ok(_) => {
                        if self.session.sockets.mark_connected(link_id) {
                            self.notify_socket(link_id, SocketAction::Connect);
                        }

                        callback(Ok(link_id));
                    }
                    Err(error) => {
                        self.session.sockets.abort_connect(link_id);
                        callback(Err(error));
                    }
                }
            }
            Operation::Send { length, callback } => callback(result.map(|_| length)),
            Operation::Close { link_id, callback } => {
                // ESP-AT does not track the link anymore, independent of the result
                if self.session.sockets.mark_closed(link_id) {
                    self.notify_socket(link_id, SocketAction::Disconnect);
                }

                callback(result.map(|_| ()));
            }
            Operation::Server { action, port, callback } => {
                if result.is_ok() {
                    self.session.server_port = match action {
                        ServerAction::Create => Some(port),
                        ServerAction::Delete => None,
                    };
                }

                callback(result.map(|_| ()));
            }
        }
    }

    fn continue_init(&mut self, step: InitStep, result: Result<Responses, CommandError>, callback: InitCallback) {
        if let Err(error) = self.apply_step(step, result) {
            warn!("Initialization step {:?} failed: {:?}", step, error);
            return self.finish_init(InitState::Failed, callback);
        }

        let next = match step.next() {
            Some(next) => next,
            None => return self.finish_init(InitState::Ready, callback),
        };

        match next.command(self.max_cmd_len, ()) {
            Ok(command) => self
                .dispatcher
                .enqueue_front(command.with_operation(Operation::Init { step: next, callback })),
            Err(_) => {
                error!("Encoding initialization step {:?} failed", next);
                self.finish_init(InitState::Failed, callback);
            }
        }
    }

    fn finish_init(&mut self, state: InitState, callback: InitCallback) {
        debug!("Initialization finished: {:?}", state);
        self.session.init_state = state;
        callback(state);
    }

    fn continue_soft_reset(&mut self, step: InitStep, result: Result<Responses, CommandError>, callback: Callback<()>) {
        if let Err(error) = self.apply_step(step, result) {
            warn!("Soft reset step {:?} failed: {:?}", step, error);
            return callback(Err(error));
        }

        let next = match step.next() {
            Some(next) => next,
            None => return callback(Ok(())),
        };

        match next.command(self.max_cmd_len, ()) {
            Ok(command) => self
                .dispatcher
                .enqueue_front(command.with_operation(Operation::SoftReset { step: next, callback })),
            Err(_) => {
                error!("Encoding soft reset step {:?} failed", next);
                callback(Err(CommandError::InvalidResponse));
            }
        }
    }

    /// Re-applies the bring-up configuration after a restart, which ESP-AT did not announce.
    /// The restart itself already happened, so the chain starts with echo off.
    fn recover(&mut self) {
        if self.session.init_state != InitState::Ready {
            return;
        }

        self.enqueue_recovery(InitStep::EchoOff);
    }

    fn continue_recover(&mut self, step: InitStep, result: Result<Responses, CommandError>) {
        if let Err(error) = self.apply_step(step, result) {
            error!("Recovery step {:?} failed: {:?}", step, error);
            self.session.init_state = InitState::Failed;
            return;
        }

        match step.next() {
            Some(next) => self.enqueue_recovery(next),
            None => debug!("Recovered from restart"),
        }
    }

    fn enqueue_recovery(&mut self, step: InitStep) {
        match step.command(self.max_cmd_len, Operation::Recover(step)) {
            Ok(command) => self.dispatcher.enqueue_front(command),
            Err(_) => {
                error!("Encoding recovery step {:?} failed", step);
                self.session.init_state = InitState::Failed;
            }
        }
    }

    /// Applies the result of a bring-up step to the device state
    fn apply_step(&mut self, step: InitStep, result: Result<Responses, CommandError>) -> Result<(), CommandError> {
        let responses = result?;

        match step {
            InitStep::Reset => self.on_restart(),
            InitStep::ModeProbe => self.session.op_mode = Self::decode(op_mode_from_responses(&responses))?,
            InitStep::EchoOff | InitStep::MultipleConnections => {}
        }

        Ok(())
    }

    /// All connections and the server are gone after a restart of ESP-AT
    fn on_restart(&mut self) {
        for link_id in self.session.sockets.close_all() {
            self.notify_socket(link_id, SocketAction::Disconnect);
        }

        self.session.join_state = JoinState::default();
        self.session.server_port = None;
    }

    /// Discards all pending commands and the device state
    fn reset_session(&mut self) {
        for operation in self.dispatcher.flush() {
            operation.reject(CommandError::Reset);
        }

        for link_id in self.session.sockets.close_all() {
            self.notify_socket(link_id, SocketAction::Disconnect);
        }

        self.session = Session::default();
        self.ingress.reset();
    }

    fn notify_socket(&mut self, link_id: usize, action: SocketAction) {
        debug!("Link {} changed: {:?}", link_id, action);

        if let Some(hooks) = self.hooks.as_mut() {
            hooks.socket_state_changed(link_id, action);
        }
    }

    fn decode<V>(result: Result<V, ()>) -> Result<V, CommandError> {
        result.map_err(|_| {
            warn!("Failed to parse command response");
            CommandError::InvalidResponse
        })
    }
}
