pub mod config;
pub mod convert;
mod server;

pub use config::*;
pub use convert::*;
pub use server::{
    DynConversionProvider, DynGenerationProvider, ServerError, build_api_router, serve,
};
