pub mod layout;
pub mod error;
pub mod config;
pub mod clock;
pub mod bus;
pub mod fan;
pub mod cell;
pub mod grid;
pub mod mapper;
pub mod life;
pub mod patterns;
pub mod master;
pub mod node;
pub mod sim;
