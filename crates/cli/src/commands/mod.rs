//! CLI command implementations

pub mod check;
pub mod run;

pub use check::CheckConfigCommand;
pub use run::RunCommand;
