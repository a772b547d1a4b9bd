//! Client core for loomchat: everything the shell and transport share,
//! kept free of I/O so it unit-tests directly.

pub mod auth;
pub mod page;
pub mod session;
pub mod stream;
pub mod transcript;
