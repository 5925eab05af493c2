pub mod chunker;
pub mod pages;

pub use chunker::build_page_chunks;
pub use pages::extract_pages;
