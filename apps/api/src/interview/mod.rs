pub mod evaluator;
pub mod handlers;
pub mod selector;
pub mod store;
