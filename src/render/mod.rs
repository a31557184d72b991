pub(crate) mod backend;
pub(crate) mod blend;
pub(crate) mod buffer_pool;
pub(crate) mod compositor;
pub(crate) mod cpu;
pub(crate) mod depth;
pub(crate) mod stack;
