pub mod expiry;
pub mod pair;
pub mod run;
pub mod strike;
