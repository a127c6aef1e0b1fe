pub mod rating;
pub mod recommendation;
