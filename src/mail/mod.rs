pub mod api;
pub mod decoders;
