pub mod data;
pub mod keyframe;
pub mod parameter;
pub mod sequence;
pub mod value;
