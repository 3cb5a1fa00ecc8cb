pub mod command;
pub mod console;
pub mod controls;
pub mod gateway;
pub mod models;
pub mod settings;
