// Application layer: user actions composed from the core modules.

pub mod display;
pub mod explorer;
