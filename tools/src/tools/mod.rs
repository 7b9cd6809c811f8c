pub mod context;
pub(crate) mod handlers;
pub mod registry;
