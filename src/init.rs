//! # Initialization state machine
//!
//! Bring-up runs as a chain of commands: every successful step enqueues the next one at the
//! queue head, so the sequence is not interleaved by caller commands.
use crate::commands::{EchoOffCommand, RestartCommand, SetMultipleConnectionsCommand, WifiModeQuery};
use crate::dispatcher::Command;
use crate::wifi::Error;
use alloc::boxed::Box;

/// Callback invoked once on reaching a terminal state
pub type InitCallback = Box<dyn FnOnce(InitState)>;

/// Initialization state of the driver, values are stable
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum InitState {
    #[default]
    NotReady = 0,
    Initializing = 1,
    /// Terminal, all operations are available
    Ready = 2,
    /// Terminal, just init and soft reset are available
    Failed = 3,
}

impl InitState {
    /// True if the state is terminal until the next init
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// Single step of the bring-up sequence
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum InitStep {
    /// AT+RST, completed by the ready banner
    Reset,
    /// ATE0
    EchoOff,
    /// AT+CIPMUX=1, link ids are just supported in multiple connection mode
    MultipleConnections,
    /// AT+CWMODE?, stores the operating mode
    ModeProbe,
}

impl InitStep {
    pub(crate) const FIRST: Self = Self::Reset;

    /// Returns the following step, None if this is the last one
    pub(crate) fn next(self) -> Option<Self> {
        match self {
            Self::Reset => Some(Self::EchoOff),
            Self::EchoOff => Some(Self::MultipleConnections),
            Self::MultipleConnections => Some(Self::ModeProbe),
            Self::ModeProbe => None,
        }
    }

    /// Builds the command of this step
    pub(crate) fn command<O, const TX_SIZE: usize>(
        self,
        max_len: usize,
        operation: O,
    ) -> Result<Command<O, TX_SIZE>, Error> {
        match self {
            Self::Reset => Command::new(&RestartCommand, max_len, operation),
            Self::EchoOff => Command::new(&EchoOffCommand, max_len, operation),
            Self::MultipleConnections => Command::new(&SetMultipleConnectionsCommand::multiple(), max_len, operation),
            Self::ModeProbe => Command::new(&WifiModeQuery, max_len, operation),
        }
    }
}
