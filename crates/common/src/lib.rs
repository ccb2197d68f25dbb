//! Wire types, protocol definitions, and errors shared by the envelope
//! encryption service and the storage/API adapters that persist its output.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::EncryptedPayload;
