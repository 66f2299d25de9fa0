pub mod people;
pub mod presets;
pub mod sessions;
