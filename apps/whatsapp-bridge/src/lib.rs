pub mod config;
pub mod http;
pub mod lifecycle;
pub mod qr;
pub mod relay;
mod main_logic;

pub use main_logic::run;
