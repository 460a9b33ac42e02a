pub mod issue;
pub mod usage_record;

pub use issue::Issue;
pub use usage_record::UsageRecord;
