pub mod cache;
pub mod prices;
pub mod rate;
pub mod setup;
pub mod ui;
pub mod watch;
