pub mod intent;
pub mod summary;
pub mod tariff;

pub use intent::{ClassifiedQuery, Intent};
pub use summary::{DatasetSummary, SupportedDomain};
pub use tariff::{percent_label, TariffRecord, Trend};
