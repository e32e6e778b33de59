pub mod principal;

pub use principal::{AuthSource, Principal, PrincipalExtractor};
