pub mod index_page;
pub mod meta_page;
pub mod table_page;

pub use index_page::{interior_capacity, leaf_capacity, InteriorPage, LeafPage};
pub use meta_page::{IndexMetaPage, RELATION_NAME_SIZE};
pub use table_page::{RecordId, TablePage, TablePageHeader};
