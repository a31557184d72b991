pub(crate) mod cache;
pub(crate) mod definition;
pub(crate) mod schema;
pub(crate) mod value;
