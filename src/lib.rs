pub mod access_token;
pub mod client;
pub mod request;
pub mod sign;

pub use client::{IopClient, IopResponse, Protocol};
pub use sign::SignMethod;
pub use request::IopRequest;
