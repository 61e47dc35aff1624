mod client_binary;
#[cfg(unix)]
mod server_binary;
