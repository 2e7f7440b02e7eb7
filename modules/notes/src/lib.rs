// === MODULE DEFINITION ===
pub mod module;
pub use module::NotesModule;

// === INTERNAL MODULES ===
// Exposed for tests and the host binary; not a stable surface.
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod state;
#[doc(hidden)]
pub mod views;
