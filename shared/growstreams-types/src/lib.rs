//! Wire-level types shared by the GrowStreams encoder and deployment tooling.

pub mod errors;
pub mod ids;
pub mod payload;

pub use errors::{DecodeError, EncodingError};
pub use ids::{ActorId, CodeId};
pub use payload::Payload;
