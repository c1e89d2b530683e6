pub mod criteria;
pub mod lotl_cache;
pub mod lotl_fetcher;
pub mod trust_list_parser;
