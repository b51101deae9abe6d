pub mod follow;
pub mod matching;
pub mod sync;
