pub mod clock;
pub mod resource_retriever;
pub mod xml_signature;
