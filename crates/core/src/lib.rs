//! Byte buffers and APDU plumbing shared by the token processing crates
//!
//! [`Buffer`] carries card data, key material and payloads. [`Command`],
//! [`Response`] and [`StatusWord`] model short APDUs, and [`CardTransport`]
//! is the byte exchange everything above is written against.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub use bytes::{Bytes, BytesMut};

pub mod apdu;
pub mod buffer;
pub mod status;
pub mod transport;

mod error;

pub use apdu::{ApduCommand, Command, Response};
pub use buffer::Buffer;
pub use error::{Error, Result};
pub use status::{StatusClass, StatusWord};
pub use transport::{CardTransport, CardTransportExt, TransportError};
