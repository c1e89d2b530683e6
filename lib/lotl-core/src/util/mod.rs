pub mod x509;
pub(crate) mod xml;
