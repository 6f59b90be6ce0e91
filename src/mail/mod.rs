pub mod compose;
pub mod decoders;
pub mod imap_client;
pub mod smtp_client;
