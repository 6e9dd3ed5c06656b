//! Domain records of the supply ledger

mod account;
mod catalog;
mod fault;
mod proposal;
mod repair;
mod report;
mod stage;
mod unit;

pub use account::*;
pub use catalog::*;
pub use fault::*;
pub use proposal::*;
pub use repair::*;
pub use report::*;
pub use stage::*;
pub use unit::*;
