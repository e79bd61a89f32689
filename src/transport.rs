//! # Buffered transport
//!
//! Boundary between the UART receive interrupt and the task calling [pump](crate::adapter::Adapter::pump).
//! Received bytes are written by the interrupt to a [bbqueue] producer using [store_received]. The
//! [BufferedTransport] reads them from the matching consumer, while writes are passed directly to the UART.
//!
//! ````
//! use bbqueue::BBBuffer;
//! use esp8266_at_driver::transport::{store_received, BufferedTransport};
//! # use esp8266_at_driver::example::ExampleSerial;
//! # use embedded_io::{Read, ReadReady};
//!
//! static RX_BUFFER: BBBuffer<256> = BBBuffer::new();
//! let (mut producer, consumer) = RX_BUFFER.try_split().unwrap();
//!
//! let mut transport = BufferedTransport::new(consumer, ExampleSerial::default());
//!
//! // Called by the receive interrupt
//! store_received(&mut producer, b"OK\r\n");
//!
//! let mut buffer = [0x0; 16];
//! assert!(transport.read_ready().unwrap());
//! assert_eq!(4, transport.read(&mut buffer).unwrap());
//! ````
use bbqueue::{Consumer, Producer};
use embedded_io::{ErrorType, Read, ReadReady, Write};

/// Transport reading from a bbqueue consumer and writing to the given UART writer
pub struct BufferedTransport<'a, W: Write, const N: usize> {
    consumer: Consumer<'a, N>,
    writer: W,
}

impl<'a, W: Write, const N: usize> BufferedTransport<'a, W, N> {
    pub fn new(consumer: Consumer<'a, N>, writer: W) -> Self {
        Self { consumer, writer }
    }

    /// Releases the consumer and the UART writer
    pub fn release(self) -> (Consumer<'a, N>, W) {
        (self.consumer, self.writer)
    }
}

impl<W: Write, const N: usize> ErrorType for BufferedTransport<'_, W, N> {
    type Error = W::Error;
}

impl<W: Write, const N: usize> Read for BufferedTransport<'_, W, N> {
    /// Copies buffered bytes. Returns zero if no bytes are buffered, so [ReadReady] should be checked first.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let grant = match self.consumer.read() {
            Ok(grant) => grant,
            Err(_) => return Ok(0),
        };

        let length = grant.buf().len().min(buf.len());
        buf[..length].copy_from_slice(&grant.buf()[..length]);
        grant.release(length);

        Ok(length)
    }
}

impl<W: Write, const N: usize> ReadReady for BufferedTransport<'_, W, N> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        // Grant is dropped without releasing any bytes
        Ok(self.consumer.read().is_ok())
    }
}

impl<W: Write, const N: usize> Write for BufferedTransport<'_, W, N> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()
    }
}

/// Stores received bytes in the buffer. Returns the number of stored bytes, which is lower than the given
/// length if the buffer is full. Excess bytes are dropped.
pub fn store_received<const N: usize>(producer: &mut Producer<'_, N>, data: &[u8]) -> usize {
    let mut stored = 0;

    while stored < data.len() {
        let mut grant = match producer.grant_max_remaining(data.len() - stored) {
            Ok(grant) => grant,
            Err(_) => break,
        };

        let length = grant.buf().len();
        if length == 0 {
            break;
        }

        grant.buf().copy_from_slice(&data[stored..stored + length]);
        grant.commit(length);
        stored += length;
    }

    stored
}
