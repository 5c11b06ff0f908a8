pub mod logout;
pub mod nonce;
pub mod pages;
pub mod principal;
pub mod registration;
pub mod request;
pub mod resolver;
pub mod routes;

pub use nonce::NonceStore;
pub use principal::OidcPrincipal;
pub use routes::routes;
