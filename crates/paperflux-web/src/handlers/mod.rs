pub mod papers;
pub mod process;
