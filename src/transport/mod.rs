pub mod interfaces;
pub mod udp;
pub mod tcp;

pub use interfaces::*;
pub use udp::*;
pub use tcp::*;
