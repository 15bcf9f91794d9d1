pub mod audit;
pub mod ledger;
pub mod scheduling;
pub mod slot_store;
