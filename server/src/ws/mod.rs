//! Real-time side of the server: one WebSocket per identity, routed through a
//! shared [`registry::ConnectionRegistry`].

pub mod actor;
pub mod handler;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;

#[cfg(test)]
pub(crate) mod testing;
