//! Encoder module for the log sink.
//!
//! Turns correlated log documents into index actions.

mod index_request_encoder;

pub use index_request_encoder::IndexRequestEncoder;
