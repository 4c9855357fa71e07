pub mod connection;
pub mod dispatcher;
pub mod push;
pub mod router;
pub mod sanitize;
pub mod spam;
