//! # ESP8266 AT driver
//!
//! Non-blocking driver for ESP8266 modules running the ESP-AT firmware, connected by a serial
//! transport implementing the [embedded-io](embedded_io) traits.
//!
//! All operations of the [Adapter](adapter::Adapter) return immediately. Commands are queued and
//! processed one after another by [pump](adapter::Adapter::pump), which needs to be called
//! periodically, e.g. by the connectivity task. Results are passed to callbacks, asynchronous events
//! (WIFI state, connections, received data) to the registered [EventHandler](wifi::EventHandler).
//!
//! Up to five TCP/UDP connections are multiplexed, addressed by their link id.
//!
//! ## Example
//!
//! ````
//! use esp8266_at_driver::adapter::Adapter;
//! use esp8266_at_driver::example::{ExampleSerial, ExampleTimer};
//! use esp8266_at_driver::init::InitState;
//! use esp8266_at_driver::stack::{Protocol, SocketAction};
//! use esp8266_at_driver::wifi::EventHandler;
//! use fugit::ExtU32;
//!
//! struct Hooks {}
//!
//! impl EventHandler for Hooks {
//!     fn socket_state_changed(&mut self, link_id: usize, _action: SocketAction) {
//!         assert_eq!(0, link_id);
//!     }
//!
//!     fn data_received(&mut self, _link_id: usize, data: &[u8]) {
//!         assert_eq!(b"nice to see you!", data);
//!     }
//! }
//!
//! let mut adapter: Adapter<_, _, 1_000, 1_024, 256> = Adapter::new(ExampleSerial::default(), ExampleTimer::default());
//! adapter.register_hooks(Hooks {});
//!
//! // Restarting and configuring the module
//! adapter.init(256, |state| assert_eq!(InitState::Ready, state)).unwrap();
//! adapter.pump(10.millis());
//! assert_eq!(InitState::Ready, adapter.init_state());
//!
//! // Joining an access point
//! adapter.join("test_wifi", "secret", |result| assert!(result.is_ok())).unwrap();
//! adapter.pump(10.millis());
//! assert!(adapter.join_status().ip_assigned);
//!
//! // Connecting to a TCP server
//! adapter.connect(0, Protocol::Tcp, "10.0.0.1", 21, |result| assert_eq!(Ok(0), result)).unwrap();
//! adapter.pump(10.millis());
//! assert!(adapter.is_connected(0));
//!
//! // Sending data, the response is passed to the data hook
//! adapter.send(0, b"hello!", |result| assert_eq!(Ok(6), result)).unwrap();
//! adapter.pump(10.millis());
//!
//! // Closing the connection
//! adapter.close(0, |result| assert!(result.is_ok())).unwrap();
//! adapter.pump(10.millis());
//! assert!(!adapter.is_connected(0));
//! ````
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

// Needs to be first, so the macros are available in all other modules
mod fmt;

pub(crate) mod commands;
pub(crate) mod responses;

pub mod adapter;
pub mod dispatcher;
pub mod ingress;
pub mod init;
pub mod stack;
pub mod transport;
pub mod urc;
pub mod wifi;

#[cfg(feature = "examples")]
pub mod example;

#[cfg(test)]
mod tests;
