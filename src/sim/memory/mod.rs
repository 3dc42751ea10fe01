pub mod cache_set;
pub mod load_store;
pub mod replacement_policy;
pub mod tlb;

pub use load_store::LoadStoreUnit;
pub use tlb::Tlb;
