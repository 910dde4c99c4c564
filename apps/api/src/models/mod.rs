pub mod knowledge;
pub mod session;
