//! Command implementations.

mod profiles;
mod run;
mod validate;

pub use profiles::run_profiles;
pub use run::run_session;
pub use validate::run_validate;
