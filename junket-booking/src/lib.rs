pub mod error;
pub mod expiry;
pub mod finance;
pub mod orchestrator;

pub use error::BookingError;
pub use finance::{FinanceLine, FinanceReport, FinanceTotals};
pub use orchestrator::{BookingOrchestrator, BookingSettings, SearchResult};
