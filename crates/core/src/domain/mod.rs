pub mod event;
pub mod recommendation;
