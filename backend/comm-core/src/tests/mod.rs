mod accept;
mod command;
mod config;
mod handler;
