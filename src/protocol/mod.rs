//! RESP Protocol
//!
//! The wire layer the core plugs into: [`RespValue`] is both the frame type
//! read from clients and the response-token lattice produced by command
//! handlers, and [`RespParser`] incrementally splits a byte stream into frames.
//!
//! ```
//! use emberkv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let (frame, consumed) = parse_message(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(consumed, 23);
//! assert!(frame.as_array().is_some());
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
