//! Format-independent building blocks: XML cursor, ZIP access and the record codec of the
//! paged string store.

pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;
