// Entity Models
// Plain data carried between store, ledger, services and the outer surfaces.
//
// - Route:          reported voyage data, one optional baseline per year
// - ShipCompliance: cached compliance balance snapshot per ship/year
// - BankEntry:      append-only banking movement
// - BankRecord:     adjusted balance view returned by the ledger

pub mod route;
pub mod compliance;
pub mod banking;

pub use route::Route;
pub use compliance::{ShipCompliance, ShipReport};
pub use banking::{BankEntry, BankRecord, PoolStatus};
