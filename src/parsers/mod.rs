pub mod address;
pub mod price;
pub mod vocabulary;

pub use address::AddressExtractor;
pub use price::{PriceExtractor, PriceLimits};
pub use vocabulary::{Vocabulary, VocabularyOverrides};
