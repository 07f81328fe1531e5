pub mod clip;
pub mod events;
pub mod props;
#[allow(clippy::module_inception)]
pub mod timeline;
pub mod track;
