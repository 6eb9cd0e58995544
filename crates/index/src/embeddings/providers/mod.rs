//! Built-in embedding providers.

pub mod trigram;
