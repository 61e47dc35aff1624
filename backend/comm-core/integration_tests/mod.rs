mod client;
mod connection;
mod helpers;
mod registry;
mod server;
