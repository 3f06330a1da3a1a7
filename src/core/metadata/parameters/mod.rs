pub mod authorization_server;
pub mod issuer;
