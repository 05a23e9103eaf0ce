pub mod auth;
pub mod delivery;
pub mod dispatcher;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod sanitize;
pub mod transcoder;
pub mod url_guard;
pub mod workspace;
