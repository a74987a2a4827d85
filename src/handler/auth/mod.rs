pub mod google;
pub mod tokens;
