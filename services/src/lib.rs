pub mod retry;
pub mod uuid;
