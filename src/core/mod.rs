//! Provisioning logic: phases, generators, token lifecycle.

pub mod audit_log;
pub mod file_lock;
pub mod host;
pub mod paths;
pub mod phases;
pub mod pipeline;
pub mod probe;
pub mod proxy_gen;
pub mod renewal;
pub mod store;
pub mod token;
pub mod unit_gen;
