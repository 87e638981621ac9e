pub mod allocation;
pub mod census;
pub mod images;
pub mod review;
