//! Transport layer (upgraded desktop streams).
//!
//! Exposes the relay handlers that upgrade display/audio requests and splice
//! the metered stream to the desktop's upstream socket.

pub mod relay;
