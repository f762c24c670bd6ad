pub mod app;
pub mod backend;
pub mod keys;
pub mod view;

pub use app::App;
pub use backend::RatatuiBackend;
pub use keys::command_for;
