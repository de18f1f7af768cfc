mod database;
mod email;
mod identity;
mod state_builder;

pub use database::connect_and_migrate;
pub use state_builder::build_app_state;
