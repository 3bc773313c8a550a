pub(crate) mod spatial;
