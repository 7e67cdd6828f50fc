//! Blocking transport over any [`std::io::Read`] + [`std::io::Write`].
pub mod transport;
