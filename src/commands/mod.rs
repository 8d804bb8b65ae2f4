pub mod ask;
pub mod load;
pub mod parse;
