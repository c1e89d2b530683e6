pub mod certificate;
pub mod country_lotl;
pub mod criteria;
pub mod fetch_result;
pub mod qualification;
pub mod report;
pub mod service_context;
