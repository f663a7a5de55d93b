//! Message and key bookkeeping around the core derivation

pub mod message;
pub mod prekeys;

pub use message::InitialMessage;
pub use prekeys::{PreKeyStore, ResolvedPreKeys, SignedPreKey};
