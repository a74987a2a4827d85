pub mod account_roles;
pub mod accounts;
pub mod profiles;
pub mod roles;
