pub(crate) mod stamp;
