pub mod binary;
pub mod data;
pub mod project;
