pub mod error;
pub mod lotl;
pub mod qualification;
pub mod trust_list_validator;
pub mod trusted_store;
