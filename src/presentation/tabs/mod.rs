pub mod diagnostics;
pub mod drive;
pub mod settings;
