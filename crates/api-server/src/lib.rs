#![warn(clippy::unwrap_used)]

pub mod error;
pub mod extract;
pub mod live_ws;
pub mod redirect_rest;
pub mod rest;
pub mod sdk_rest;
pub mod server;
pub mod state;
pub mod swagger;

pub use server::ApiServer;
pub use state::AppState;
pub use swagger::ApiDoc;
