pub(crate) mod notify;
pub(crate) mod store;
