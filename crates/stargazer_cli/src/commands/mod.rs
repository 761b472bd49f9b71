pub(crate) mod collect;
pub(crate) mod limits;
pub(crate) mod meta;
