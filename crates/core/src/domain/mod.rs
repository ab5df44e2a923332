pub mod account;
pub mod intent;
