mod common;
mod index_page;
mod meta_page;
mod table_page;

pub use common::CommonCodec;
pub use index_page::{InteriorPageCodec, LeafPageCodec};
pub use meta_page::IndexMetaPageCodec;
pub use table_page::TablePageCodec;

// decoded value + consumed byte count
pub type DecodedData<T> = (T, usize);
