pub mod alpha;
pub mod blend;
pub mod compositor;
