pub mod bloom;
pub mod seen;

pub use bloom::BloomFilter;
pub use seen::SeenRequests;
