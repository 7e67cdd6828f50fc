//! Tokio based transport. The port is owned by a background task which
//! decodes incoming bytes continuously and serves writes, reads and option
//! changes requested through a [`transport::Transport`] handle.
pub mod network;
pub mod port;
pub mod transport;
