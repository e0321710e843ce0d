pub mod events;
pub mod frame;
pub mod session;

pub use events::{InboundEvent, OutboundEnvelope};
pub use frame::{ClientMessage, MimeType, ServerFrame};
pub use session::SessionId;
