pub mod engine;
pub mod naming;
pub mod plan;
pub mod report;

pub use engine::SyncEngine;
pub use naming::NamingRules;
pub use report::SyncReport;
