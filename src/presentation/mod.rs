pub mod app;
pub mod components;
pub mod device_picker;
pub mod tabs;
pub mod theme;
