//! Mocks for doc examples
use alloc::collections::VecDeque;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;

/// Serial mock answering a fixed set of commands like ESP-AT would
#[derive(Default)]
pub struct ExampleSerial {
    /// Bytes returned by the next reads
    rx: VecDeque<u8>,

    /// True if the next write is the payload of AT+CIPSEND
    payload_expected: bool,
}

impl ExampleSerial {
    fn respond(&mut self, response: &[u8]) {
        self.rx.extend(response.iter());
    }
}

impl ErrorType for ExampleSerial {
    type Error = ErrorKind;
}

impl Read for ExampleSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut count = 0;

        while count < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => buf[count] = byte,
                None => break,
            }
            count += 1;
        }

        Ok(count)
    }
}

impl ReadReady for ExampleSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for ExampleSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.payload_expected {
            self.payload_expected = false;
            self.respond(b"\r\nRecv 6 bytes\r\n\r\nSEND OK\r\n");
            self.respond(b"\r\n+IPD,0,16:nice to see you!");
            return Ok(buf.len());
        }

        match buf {
            b"AT+RST\r\n" => self.respond(b"\r\nOK\r\n ets Jan  8 2013,rst cause:2\r\n\r\nready\r\n"),
            b"AT+CWMODE?\r\n" => self.respond(b"+CWMODE:1\r\n\r\nOK\r\n"),
            b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n" => {
                self.respond(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");
            }
            b"AT+CIPSTART=0,\"TCP\",\"10.0.0.1\",21\r\n" => self.respond(b"0,CONNECT\r\n\r\nOK\r\n"),
            b"AT+CIPSEND=0,6\r\n" => {
                self.payload_expected = true;
                self.respond(b"\r\nOK\r\n> ");
            }
            b"AT+CIPCLOSE=0\r\n" => self.respond(b"0,CLOSED\r\n\r\nOK\r\n"),
            b"AT+CIFSR\r\n" => {
                self.respond(b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n");
            }
            _ => self.respond(b"\r\nOK\r\n"),
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timer mock
#[derive(Default)]
pub struct ExampleTimer {}

impl Timer<1_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1_000> {
        TimerInstantU32::from_ticks(0)
    }

    fn start(&mut self, _duration: TimerDurationU32<1_000>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        nb::Result::Err(nb::Error::WouldBlock)
    }
}
