pub mod finding;
pub mod issue;
pub mod search;

pub use finding::*;
pub use issue::*;
pub use search::*;
