pub mod api;
pub mod cloud;
pub mod config;
pub mod credentials;
pub mod events;
pub mod pairing;
pub mod readings;
pub mod sync;
