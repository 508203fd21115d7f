pub mod creation;
pub mod entitlement;
pub mod kv;
pub mod lead;
pub mod session;
pub mod settings;
