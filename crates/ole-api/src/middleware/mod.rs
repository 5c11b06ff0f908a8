pub mod access;
pub mod cors;
pub mod csrf;
pub mod request_id;
pub mod security_headers;
