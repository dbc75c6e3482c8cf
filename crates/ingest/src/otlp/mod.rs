pub mod encode;
pub mod export;
