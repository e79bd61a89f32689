//! # Command dispatcher
//!
//! Commands are queued FIFO and written one at a time, as ESP-AT serializes all AT exchanges.
//! A command stays in flight until a matching terminator is received or its attempts are exhausted.
//!
//! Each command leaves the dispatcher exactly once as [Completion], carrying its operation
//! (continuation) and the result. Unsolicited messages are never routed here as terminators.
use crate::commands::{CommandKind, Expect};
use crate::ingress::MAX_LINE_LEN;
use crate::responses::{ResponseCode, Responses, NO_AP};
use crate::wifi::Error;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use atat::AtatCmd;
use embedded_io::Write;
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use heapless::Vec;

/// Continuation of an operation, called exactly once with the result
pub type Callback<T> = Box<dyn FnOnce(Result<T, CommandError>)>;

/// Errors of enqueued commands, delivered to the callback
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// No terminator received within the timeout on all attempts
    Timeout,

    /// ESP-AT responded with ERROR
    Error,

    /// ESP-AT responded with FAIL
    Fail,

    /// Transmission of socket data failed (SEND FAIL)
    SendFailed,

    /// AT-ESP confirmed receiving an unexpected byte count
    PartialSend,

    /// Command succeeded, but the response could not be parsed
    InvalidResponse,

    /// Upstream timer error
    TimerError,

    /// Command was discarded by a new initialization
    Reset,
}

/// Descriptor of a queued AT exchange
pub(crate) struct Command<O, const TX_SIZE: usize> {
    /// Encoded command including line terminator
    pub(crate) text: Vec<u8, MAX_LINE_LEN>,

    /// Data written after the `>` prompt
    pub(crate) payload: Vec<u8, TX_SIZE>,

    pub(crate) expect: Expect,

    pub(crate) timeout_ms: u32,

    /// Total number of attempts, at least one
    pub(crate) attempts: u8,

    pub(crate) operation: O,
}

impl<O, const TX_SIZE: usize> Command<O, TX_SIZE> {
    /// Encodes the given command. Timeout, attempts and termination pattern are taken from the command type.
    pub(crate) fn new<Cmd: AtatCmd + CommandKind>(command: &Cmd, max_len: usize, operation: O) -> Result<Self, Error> {
        Ok(Self {
            text: Self::encode(command, max_len)?,
            payload: Vec::new(),
            expect: Cmd::EXPECT,
            timeout_ms: Cmd::MAX_TIMEOUT_MS,
            attempts: Cmd::ATTEMPTS.max(1),
            operation,
        })
    }

    /// Replaces the operation, e.g. for building the command before the continuation is moved
    pub(crate) fn with_operation<P>(self, operation: P) -> Command<P, TX_SIZE> {
        Command {
            text: self.text,
            payload: self.payload,
            expect: self.expect,
            timeout_ms: self.timeout_ms,
            attempts: self.attempts,
            operation,
        }
    }

    /// Attaches the data written after the `>` prompt
    pub(crate) fn with_payload(mut self, payload: Vec<u8, TX_SIZE>) -> Self {
        self.payload = payload;
        self
    }

    fn encode<Cmd: AtatCmd>(command: &Cmd, max_len: usize) -> Result<Vec<u8, MAX_LINE_LEN>, Error> {
        if Cmd::MAX_LEN > MAX_LINE_LEN {
            return Err(Error::CommandTooLong);
        }

        let mut buffer = [0x0; MAX_LINE_LEN];
        let length = command.write(&mut buffer);

        if length > max_len {
            return Err(Error::CommandTooLong);
        }

        Vec::from_slice(&buffer[..length]).map_err(|_| Error::CommandTooLong)
    }
}

/// Terminal outcome of a command
pub(crate) struct Completion<O> {
    pub(crate) operation: O,

    /// Information lines on success
    pub(crate) result: Result<Responses, CommandError>,

    /// ESP-AT signaled 'ALREADY CONNECTED' during the exchange
    pub(crate) already_connected: bool,
}

/// The command currently processed by ESP-AT
struct InFlight<O, const TX_SIZE: usize> {
    command: Command<O, TX_SIZE>,

    attempts_left: u8,

    /// True once the payload was written after the prompt. No more retries are possible afterwards.
    payload_sent: bool,

    responses: Responses,

    /// Byte count confirmed by 'Recv N bytes'
    received_bytes: Option<usize>,

    already_connected: bool,
}

impl<O, const TX_SIZE: usize> InFlight<O, TX_SIZE> {
    fn new(command: Command<O, TX_SIZE>) -> Self {
        Self {
            attempts_left: command.attempts,
            command,
            payload_sent: false,
            responses: Vec::new(),
            received_bytes: None,
            already_connected: false,
        }
    }
}

pub(crate) struct Dispatcher<O, const TIMER_HZ: u32, const TX_SIZE: usize> {
    queue: VecDeque<Command<O, TX_SIZE>>,

    /// Max. number of queued commands, not including the one in flight
    capacity: usize,

    in_flight: Option<InFlight<O, TX_SIZE>>,

    /// Timeout for SEND OK after the payload was written
    send_timeout: TimerDurationU32<TIMER_HZ>,
}

impl<O, const TIMER_HZ: u32, const TX_SIZE: usize> Dispatcher<O, TIMER_HZ, TX_SIZE> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            in_flight: None,
            send_timeout: TimerDurationU32::millis(5_000),
        }
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub(crate) fn set_send_timeout(&mut self, timeout: TimerDurationU32<TIMER_HZ>) {
        self.send_timeout = timeout;
    }

    /// Appends the command to the queue. The command is dropped without completion if the queue is full.
    pub(crate) fn enqueue(&mut self, command: Command<O, TX_SIZE>) -> Result<(), Error> {
        if self.queue.len() >= self.capacity {
            return Err(Error::QueueFull);
        }

        self.queue.push_back(command);
        Ok(())
    }

    /// Inserts the command at the queue head, so it gets written next. Used for multi step sequences.
    pub(crate) fn enqueue_front(&mut self, command: Command<O, TX_SIZE>) {
        self.queue.push_front(command);
    }

    /// True if a command is in flight
    pub(crate) fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of queued commands, not including the one in flight
    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Writes the next queued command if no command is in flight
    pub(crate) fn start_next<W: Write, T: Timer<TIMER_HZ>>(
        &mut self,
        transport: &mut W,
        timer: &mut T,
    ) -> Option<Completion<O>> {
        if self.in_flight.is_some() {
            return None;
        }

        let command = self.queue.pop_front()?;
        self.in_flight = Some(InFlight::new(command));
        self.write_in_flight(transport, timer)
    }

    /// Collects an information line for the command in flight
    pub(crate) fn collect(&mut self, line: &str) {
        let in_flight = match self.in_flight.as_mut() {
            Some(in_flight) => in_flight,
            None => {
                debug!("Ignoring line without command in flight: {}", line);
                return;
            }
        };

        if !line.starts_with('+') && line != NO_AP {
            trace!("Ignoring line: {}", line);
            return;
        }

        let mut response = heapless::String::new();
        if response.push_str(line).is_err() || in_flight.responses.push(response).is_err() {
            warn!("Dropping response line: {}", line);
        }
    }

    /// Stores the byte count of a 'Recv N bytes' message
    pub(crate) fn on_received_bytes(&mut self, count: usize) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.received_bytes = Some(count);
        }
    }

    /// Stores that the link of the command in flight is already connected
    pub(crate) fn on_already_connected(&mut self) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.already_connected = true;
        }
    }

    /// Handles a final result code
    pub(crate) fn on_response_code<W: Write, T: Timer<TIMER_HZ>>(
        &mut self,
        code: ResponseCode,
        transport: &mut W,
        timer: &mut T,
    ) -> Option<Completion<O>> {
        let in_flight = self.in_flight.as_ref()?;
        let expect = in_flight.command.expect;
        let payload_sent = in_flight.payload_sent;
        let partial = in_flight
            .received_bytes
            .is_some_and(|count| count != in_flight.command.payload.len());

        match (expect, code) {
            (Expect::Ok, ResponseCode::Ok) => self.complete(Ok(())),
            (Expect::Ok | Expect::Ready, ResponseCode::Error) => self.fail(CommandError::Error, transport, timer),
            (Expect::Ok | Expect::Ready, ResponseCode::Fail) => self.fail(CommandError::Fail, transport, timer),

            // Intermediate OK before the prompt or the reboot
            (Expect::Prompt | Expect::Ready, ResponseCode::Ok) => None,

            (Expect::Prompt, ResponseCode::SendOk) if payload_sent => {
                if partial {
                    return self.complete(Err(CommandError::PartialSend));
                }

                self.complete(Ok(()))
            }
            (Expect::Prompt, ResponseCode::SendFail) if payload_sent => self.complete(Err(CommandError::SendFailed)),
            (Expect::Prompt, ResponseCode::Error | ResponseCode::Fail) => {
                if payload_sent {
                    return self.complete(Err(CommandError::SendFailed));
                }

                self.fail(CommandError::Error, transport, timer)
            }
            _ => {
                debug!("Ignoring unexpected result code {:?}", code);
                None
            }
        }
    }

    /// Writes the payload if the command in flight is waiting for the data prompt
    pub(crate) fn on_prompt<W: Write, T: Timer<TIMER_HZ>>(
        &mut self,
        transport: &mut W,
        timer: &mut T,
    ) -> Option<Completion<O>> {
        let in_flight = self.in_flight.as_mut()?;
        if in_flight.command.expect != Expect::Prompt || in_flight.payload_sent {
            debug!("Ignoring unexpected data prompt");
            return None;
        }

        in_flight.payload_sent = true;
        debug!("Writing {} bytes of payload", in_flight.command.payload.len());

        if transport.write_all(&in_flight.command.payload).is_err() || transport.flush().is_err() {
            error!("Writing payload to transport failed");
        }

        if timer.start(self.send_timeout).is_err() {
            error!("Starting send timer failed");
            return self.complete(Err(CommandError::TimerError));
        }

        None
    }

    /// Completes a restart command waiting for the ready banner. Returns None if no such command is in flight.
    pub(crate) fn on_ready(&mut self) -> Option<Completion<O>> {
        if self.in_flight.as_ref()?.command.expect != Expect::Ready {
            return None;
        }

        self.complete(Ok(()))
    }

    /// Checks the timeout of the command in flight
    pub(crate) fn poll_timeout<W: Write, T: Timer<TIMER_HZ>>(
        &mut self,
        transport: &mut W,
        timer: &mut T,
    ) -> Option<Completion<O>> {
        self.in_flight.as_ref()?;

        match timer.wait() {
            Ok(()) => {
                warn!("Command timed out");
                self.fail(CommandError::Timeout, transport, timer)
            }
            Err(nb::Error::WouldBlock) => None,
            Err(nb::Error::Other(_)) => {
                error!("Timer wait failed");
                self.complete(Err(CommandError::TimerError))
            }
        }
    }

    /// Removes all commands, including the one in flight. Returns the operations in issue order.
    pub(crate) fn flush(&mut self) -> alloc::vec::Vec<O> {
        let in_flight = self.in_flight.take().map(|in_flight| in_flight.command.operation);
        let queued = self.queue.drain(..).map(|command| command.operation);

        in_flight.into_iter().chain(queued).collect()
    }

    /// Retries the command in flight if attempts are left, completes it with the given error otherwise
    fn fail<W: Write, T: Timer<TIMER_HZ>>(
        &mut self,
        error: CommandError,
        transport: &mut W,
        timer: &mut T,
    ) -> Option<Completion<O>> {
        let in_flight = self.in_flight.as_mut()?;

        if in_flight.attempts_left <= 1 || in_flight.payload_sent {
            return self.complete(Err(error));
        }

        in_flight.attempts_left -= 1;
        in_flight.responses.clear();
        in_flight.received_bytes = None;
        in_flight.already_connected = false;
        warn!("Command failed ({:?}), {} attempts left", error, in_flight.attempts_left);

        self.write_in_flight(transport, timer)
    }

    fn complete(&mut self, result: Result<(), CommandError>) -> Option<Completion<O>> {
        let in_flight = self.in_flight.take()?;
        debug!("Command completed: {:?}", result);

        Some(Completion {
            operation: in_flight.command.operation,
            result: result.map(|_| in_flight.responses),
            already_connected: in_flight.already_connected,
        })
    }

    /// Writes the command text and (re)starts the timeout
    fn write_in_flight<W: Write, T: Timer<TIMER_HZ>>(
        &mut self,
        transport: &mut W,
        timer: &mut T,
    ) -> Option<Completion<O>> {
        let in_flight = self.in_flight.as_mut()?;
        debug!("Writing command: {}", printable(&in_flight.command.text));

        // A failed write is treated like a missing response and handled by the timeout
        if transport.write_all(&in_flight.command.text).is_err() || transport.flush().is_err() {
            error!("Writing command to transport failed");
        }

        if timer.start(TimerDurationU32::millis(in_flight.command.timeout_ms)).is_err() {
            error!("Starting command timer failed");
            return self.complete(Err(CommandError::TimerError));
        }

        None
    }
}

/// Command text for logging, borrowed from the encoded command
pub(crate) fn printable(text: &[u8]) -> &str {
    core::str::from_utf8(text).unwrap_or("<non UTF-8 command>").trim_end()
}
