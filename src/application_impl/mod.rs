mod refresh_id;
mod token_codec_jwt;
mod token_service_impl;

pub use refresh_id::*;
pub use token_codec_jwt::*;
pub use token_service_impl::*;
