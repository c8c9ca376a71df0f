pub mod competency;
pub mod essay;
