pub(crate) mod config;
pub(crate) mod feed;
pub(crate) mod pipeline;
