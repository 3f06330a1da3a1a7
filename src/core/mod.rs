pub mod authorization_request;
pub mod credential;
pub mod credential_offer;
pub mod metadata;
pub mod object;
pub mod util;
pub mod version;
