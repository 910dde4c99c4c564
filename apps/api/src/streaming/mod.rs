pub mod gateway;
pub mod parser;
pub mod upstream;
pub mod ws;
