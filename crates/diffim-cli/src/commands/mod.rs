pub mod basis;
pub mod config;
pub mod footprints;
pub mod subtract;

mod input;
