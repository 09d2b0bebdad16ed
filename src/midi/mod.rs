pub mod events;
pub mod loader;
pub mod processor;
pub mod reader;
pub mod track_data;
