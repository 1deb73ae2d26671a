//! Configuration loading and validation.

mod settings;

pub use settings::{RpcSettings, Settings, StoreSettings, SyncSettings};
