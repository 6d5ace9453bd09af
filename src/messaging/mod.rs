pub mod envelope;
pub mod frame_reader;
pub mod peer_addr;
pub mod service_description;
