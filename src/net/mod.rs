//! Network layer helpers.

pub mod tls;
