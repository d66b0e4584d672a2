pub mod fetcher;
pub mod gap_finder;
pub mod reconciliation;
pub mod rsi;
