pub mod accounts;
pub mod profiles;
pub mod roles;
