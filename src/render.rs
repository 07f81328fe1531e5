pub mod canvas;
pub mod composite;
pub mod content;
pub mod manager;
pub mod surface;
pub mod usage;
