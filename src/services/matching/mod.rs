pub mod cache;
pub mod engine;
pub mod query;
pub mod resolver;
pub mod search;
pub mod similarity;

pub use cache::{MappingCache, RemapScope};
pub use engine::{ALGORITHM_VERSION, DecisionOrigin, MatchOptions, MatchOutcome, MatchingEngine};
pub use resolver::{ConsoleResolver, InteractiveResolver};
pub use search::CandidateSearch;
